//! Path trie (C3), spec §3, §4.3.
//!
//! The teacher crate (`fast_ctc_decode`) keeps this as a `tree` module (not
//! present in the retrieved snapshot); this is a fresh implementation of the
//! same idea — an arena-indexed, parent-pointer tree of collapsed-prefix
//! beams — generalized per spec §4.3 with LM/lexicon/hot-word auxiliary
//! state attached to each node instead of the teacher's single CRF `state`
//! field.

use std::collections::HashMap;

use crate::hotword::HotwordState;
use crate::lexicon::LexState;
use crate::lm::LmState;
use crate::logprob::LOG_ZERO;

pub type NodeId = u32;

/// The trie always starts with a single root beam.
pub const ROOT: NodeId = 0;

/// A single collapsed-prefix beam. Fields map directly onto spec §3's
/// path-trie node description.
#[derive(Clone, Debug)]
pub struct Node {
    pub parent: NodeId,
    /// The label linking this node to its parent; `None` only for the root.
    pub label: Option<usize>,
    children: HashMap<usize, NodeId>,

    /// Log-probability the prefix ends with a blank at the current timestep.
    pub p_b: f32,
    /// Log-probability the prefix ends with a non-blank at the current timestep.
    pub p_nb: f32,
    pub p_b_prev: f32,
    pub p_nb_prev: f32,

    /// Timestep attributed to this node's own label: the step whose
    /// extension contributed the largest share of probability mass to this
    /// node's `p_nb`, tracked via `best_contrib` below. Updated every time a
    /// later timestep out-contributes the one currently on record, not just
    /// on first creation — a node can be touched at several timesteps (the
    /// label repeats with a blank run in between) and the alignment should
    /// report the step the label was actually most likely emitted at.
    pub timestep: Option<usize>,
    /// Log-probability of the single contribution that last set `timestep`.
    pub best_contrib: f32,
    /// Running log-probability used purely for pruning tie-breaks.
    pub approx_ctc: f32,

    pub lm_state: LmState,
    pub lex_state: LexState,
    /// Whether the lexicon considers the word accumulated so far (from this
    /// node's `word_start`, exclusive, to itself) a complete in-vocabulary
    /// word. Consulted at the *next* word boundary, not this node's own
    /// creation.
    pub lex_is_word_end: bool,
    pub hotword_state: HotwordState,
    /// Accumulated hot-word bonus along this node's path from the root.
    pub hotword_bonus: f32,
    /// Accumulated `alpha * lm_log_prob + beta` across every word completed
    /// on the path from the root to this node.
    pub lm_bonus: f32,

    /// Exclusive ancestor marking where the word currently being
    /// accumulated begins: the word's labels are those on the path strictly
    /// after `word_start` down to this node. Equals the parent when this
    /// node is itself the first content label of a new word (BPE/word-mode
    /// boundary); equals `self` when this node is a pure separator with
    /// nothing accumulated yet (character-mode space); inherited unchanged
    /// from the parent for any other extension. Root's `word_start` is
    /// itself (nothing precedes it).
    pub word_start: NodeId,

    /// Monotonic creation order, for deterministic tie-breaking (spec §4.3).
    pub insertion_order: u64,
}

impl Node {
    #[inline]
    pub fn score(&self) -> f32 {
        crate::logprob::total_score(self.p_b, self.p_nb) + self.lm_bonus + self.hotword_bonus
    }

    #[inline]
    pub fn score_prev(&self) -> f32 {
        crate::logprob::total_score(self.p_b_prev, self.p_nb_prev) + self.lm_bonus + self.hotword_bonus
    }

    fn root(lm_state: LmState, lex_state: LexState, hotword_state: HotwordState) -> Self {
        Self {
            parent: ROOT,
            label: None,
            children: HashMap::new(),
            p_b: LOG_ZERO,
            p_nb: LOG_ZERO,
            // Root beam's initial P_b_prev is log(1) = 0, not log(0) (spec §4.4 step 1).
            p_b_prev: 0.0,
            p_nb_prev: LOG_ZERO,
            timestep: None,
            best_contrib: LOG_ZERO,
            approx_ctc: 0.0,
            lm_state,
            lex_state,
            lex_is_word_end: false,
            hotword_state,
            hotword_bonus: 0.0,
            lm_bonus: 0.0,
            word_start: ROOT,
            insertion_order: 0,
        }
    }
}

/// Everything the caller (`search.rs`) has already derived about a new
/// child before asking the trie to materialize it — the trie itself only
/// owns arena/parent-pointer bookkeeping, never decides these values.
pub struct ChildSeed {
    pub lm_state: LmState,
    pub lex_state: LexState,
    pub lex_is_word_end: bool,
    pub hotword_state: HotwordState,
    pub hotword_bonus: f32,
    pub lm_bonus: f32,
    pub word_start: NodeId,
}

/// Arena owning every node created during one utterance's decode. Cleared
/// wholesale at end-of-utterance rather than garbage collected node-by-node
/// (spec §5, §9).
pub struct Trie {
    arena: Vec<Node>,
    active: Vec<NodeId>,
    next_insertion_order: u64,
}

impl Trie {
    pub fn new(lm_state: LmState, lex_state: LexState, hotword_state: HotwordState) -> Self {
        Self {
            arena: vec![Node::root(lm_state, lex_state, hotword_state)],
            active: vec![ROOT],
            next_insertion_order: 1,
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.arena[id as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id as usize]
    }

    pub fn child(&self, parent: NodeId, label: usize) -> Option<NodeId> {
        self.arena[parent as usize].children.get(&label).copied()
    }

    /// `get_or_create_child` (spec §4.3). The caller has already derived the
    /// LM/lexicon/hot-word state the new child should carry in `seed`, since
    /// only it knows whether this extension crosses a word boundary; the
    /// trie itself is just the structural arena. A no-op (returns the
    /// existing node, `seed` ignored) when the edge already exists.
    pub fn get_or_create_child(&mut self, parent: NodeId, label: usize, seed: ChildSeed) -> NodeId {
        if let Some(&existing) = self.arena[parent as usize].children.get(&label) {
            return existing;
        }
        let insertion_order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let node = Node {
            parent,
            label: Some(label),
            children: HashMap::new(),
            p_b: LOG_ZERO,
            p_nb: LOG_ZERO,
            p_b_prev: LOG_ZERO,
            p_nb_prev: LOG_ZERO,
            timestep: None,
            best_contrib: LOG_ZERO,
            approx_ctc: LOG_ZERO,
            lm_state: seed.lm_state,
            lex_state: seed.lex_state,
            lex_is_word_end: seed.lex_is_word_end,
            hotword_state: seed.hotword_state,
            hotword_bonus: seed.hotword_bonus,
            lm_bonus: seed.lm_bonus,
            word_start: seed.word_start,
            insertion_order,
        };
        let id = self.arena.len() as NodeId;
        self.arena.push(node);
        self.arena[parent as usize].children.insert(label, id);
        id
    }

    pub fn iter_active(&self) -> &[NodeId] {
        &self.active
    }

    pub fn set_active(&mut self, active: Vec<NodeId>) {
        self.active = active;
    }

    /// Roll the currently active beams' probabilities forward one timestep:
    /// `(P_b_prev, P_nb_prev) <- (P_b, P_nb)`, then reset the current pair to
    /// `-inf` (spec §4.3/§4.4 step 2c).
    pub fn roll_timestep(&mut self) {
        for &id in &self.active {
            let node = &mut self.arena[id as usize];
            node.p_b_prev = node.p_b;
            node.p_nb_prev = node.p_nb;
            node.p_b = LOG_ZERO;
            node.p_nb = LOG_ZERO;
        }
    }

    /// Collect the label sequence from the root down to `id`, in emission order.
    pub fn path_labels(&self, id: NodeId) -> Vec<usize> {
        let mut labels = Vec::new();
        let mut cur = id;
        while let Some(label) = self.arena[cur as usize].label {
            labels.push(label);
            cur = self.arena[cur as usize].parent;
        }
        labels.reverse();
        labels
    }

    /// Collect the emission timestep of each non-blank label on the path
    /// from the root down to `id`. Walking parent pointers only records a
    /// timestep for nodes that were actually extended (every non-root node),
    /// so this is always the same length as `path_labels`.
    pub fn path_timesteps(&self, id: NodeId) -> Vec<usize> {
        let mut steps = Vec::new();
        let mut cur = id;
        while self.arena[cur as usize].label.is_some() {
            steps.push(self.arena[cur as usize].timestep.unwrap_or(0));
            cur = self.arena[cur as usize].parent;
        }
        steps.reverse();
        steps
    }

    /// Free every node except a fresh root (spec §4.3 `clear`).
    pub fn clear(&mut self, lm_state: LmState, lex_state: LexState, hotword_state: HotwordState) {
        self.arena.clear();
        self.arena.push(Node::root(lm_state, lex_state, hotword_state));
        self.active = vec![ROOT];
        self.next_insertion_order = 1;
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Collect the label sequence spanning the word currently being
    /// accumulated at `id`: the path strictly after `node.word_start` down
    /// to and including `id`. Used by `search.rs` at a word boundary to hand
    /// the lexicon/LM the just-completed word without re-walking the whole
    /// path to the root.
    pub fn current_word_labels(&self, id: NodeId) -> Vec<usize> {
        let start = self.arena[id as usize].word_start;
        let mut labels = Vec::new();
        let mut cur = id;
        while cur != start {
            labels.push(self.arena[cur as usize].label.expect("non-root node"));
            cur = self.arena[cur as usize].parent;
        }
        labels.reverse();
        labels
    }
}

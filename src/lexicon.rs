//! Lexicon automaton (C4), spec §4.5.
//!
//! Out-of-scope per spec §1: an OpenFST binding. Both the "character trie"
//! and "FST" file formats named in spec §6 are served by the same in-memory
//! label-keyed trie here (see `DESIGN.md`, Open Question 3) — only the
//! serialized file's extension differs, not the runtime representation. A
//! future OpenFST-backed automaton can be dropped in behind the same
//! `advance`/`is_reachable` shape without touching `search.rs`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Handle into the lexicon automaton's own state space; opaque to callers.
/// `0` is always the root (the empty-prefix state).
pub type LexState = u32;

const ROOT: LexState = 0;

/// Sentinel recorded on a beam whose current word has already fallen out of
/// the lexicon mid-spelling (not just at a word boundary). Kept as an
/// ordinary, always-dead `LexState` rather than an `Option` so trie nodes
/// can store it unconditionally; `advance` short-circuits on it instead of
/// indexing the arena.
pub const DEAD: LexState = u32::MAX;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LexNode {
    children: HashMap<usize, LexState>,
    /// True if the path from the root to this node spells a complete
    /// in-vocabulary word.
    is_word_end: bool,
}

impl LexNode {
    fn empty() -> Self {
        Self {
            children: HashMap::new(),
            is_word_end: false,
        }
    }
}

/// Result of advancing the lexicon automaton by one label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Advance {
    /// The label extends a reachable prefix.
    Reachable { state: LexState, is_word_end: bool },
    /// No in-vocabulary word begins with this extension.
    Dead,
}

/// A lexicon automaton: either the trivial accept-all (no lexicon
/// configured) or a label-trie built from a word list / loaded from disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Lexicon {
    /// Accepts any sequence; `is_word_end` is always `false` here because,
    /// per spec §4.5, boundary detection without a lexicon falls back to the
    /// alphabet's own space/continuation rules (`Alphabet::is_word_boundary`),
    /// which `search.rs` consults directly in this case.
    Trivial,
    Trie(Vec<LexNode>),
}

impl Lexicon {
    pub fn trivial() -> Self {
        Lexicon::Trivial
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self, Lexicon::Trivial)
    }

    pub fn root_state(&self) -> LexState {
        ROOT
    }

    /// Build a lexicon from a set of in-vocabulary words, each given as its
    /// label-index spelling. Mirrors `original_source/ctcdecode/__init__.py`'s
    /// `generate_lm_dict`/`generate_dict` (trie construction from a word
    /// list), minus the KenLM-scored variant (that's `lm.rs`'s job, not
    /// C4's).
    pub fn from_words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<[usize]>,
    {
        let mut arena = vec![LexNode::empty()];
        for word in words {
            let mut node = ROOT;
            for &label in word.as_ref() {
                let next = *arena[node as usize]
                    .children
                    .entry(label)
                    .or_insert_with(|| {
                        arena.push(LexNode::empty());
                        (arena.len() - 1) as LexState
                    });
                node = next;
            }
            arena[node as usize].is_word_end = true;
        }
        Lexicon::Trie(arena)
    }

    /// Advance the automaton by one label from `state`. Once a beam has
    /// gone `DEAD` it stays `DEAD` for the rest of the current word — the
    /// caller only recovers a live state at the next word boundary, where
    /// `search.rs` resets to `root_state()` regardless of this return.
    pub fn advance(&self, state: LexState, label: usize) -> Advance {
        if state == DEAD {
            return Advance::Dead;
        }
        match self {
            Lexicon::Trivial => Advance::Reachable {
                state: ROOT,
                is_word_end: false,
            },
            Lexicon::Trie(arena) => match arena[state as usize].children.get(&label) {
                Some(&next) => Advance::Reachable {
                    state: next,
                    is_word_end: arena[next as usize].is_word_end,
                },
                None => Advance::Dead,
            },
        }
    }

    pub fn is_reachable(&self, advance: Advance) -> bool {
        !matches!(advance, Advance::Dead)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = bincode::serialize(self).map_err(crate::error::DecodeError::from)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let lex = bincode::deserialize(&bytes).map_err(crate::error::DecodeError::from)?;
        Ok(lex)
    }
}

//! Beam-search engine (C7), spec §4.4.
//!
//! The teacher crate (`fast_ctc_decode`) keeps a `search` module with the
//! same per-utterance shape — active beam set, one label loop per timestep,
//! top-K extraction at the end — but a single CRF transition weight where
//! this module has a lexicon/LM/hot-word collaborator triple (§4.5–§4.7)
//! feeding bonuses into each beam's score via the path trie (`trie.rs`).

use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use crate::alphabet::Alphabet;
use crate::config::{DecoderOptions, LmType};
use crate::error::{DecodeError, Result};
use crate::hotword::HotwordScorer;
use crate::lexicon::{Advance, Lexicon, DEAD};
use crate::lm::LmRescorer;
use crate::logprob::{logaddexp, safe_ln};
use crate::trie::{ChildSeed, NodeId, Trie};

/// One ranked output hypothesis (spec §6's `beams`/`lengths`/`scores`/
/// `timesteps` buffers, for a single batch row and a single `k`).
#[derive(Clone, Debug, PartialEq)]
pub struct Beam {
    pub labels: Vec<usize>,
    pub timesteps: Vec<usize>,
    pub score: f32,
}

/// Per-utterance prefix beam-search engine. Owns its own trie arena (spec
/// §5: "the trie arena is per-task and never shared"); the alphabet and
/// scorers are shared, read-only collaborators.
pub struct Engine {
    alphabet: Arc<Alphabet>,
    options: DecoderOptions,
    lexicon: Arc<Lexicon>,
    lm: Option<LmRescorer>,
    hotwords: Arc<HotwordScorer>,
    trie: Trie,
    t: usize,
}

impl Engine {
    pub fn new(
        alphabet: Arc<Alphabet>,
        options: DecoderOptions,
        lexicon: Arc<Lexicon>,
        lm: Option<LmRescorer>,
        hotwords: Arc<HotwordScorer>,
    ) -> Result<Self> {
        options.validate(alphabet.size())?;
        if let Some(lm) = &lm {
            let wants_character = matches!(options.lm_type, LmType::Character);
            if lm.is_character_based() != wants_character {
                warn!(
                    lm_type = ?options.lm_type,
                    lm_is_character_based = lm.is_character_based(),
                    "configured lm_type does not match the loaded LM's own granularity"
                );
            }
        }
        let lm_state = lm.as_ref().map(|r| r.null_state()).unwrap_or_default();
        let trie = Trie::new(lm_state, lexicon.root_state(), hotwords.root_state());
        Ok(Self {
            alphabet,
            options,
            lexicon,
            lm,
            hotwords,
            trie,
            t: 0,
        })
    }

    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    #[inline]
    pub fn top_paths(&self) -> usize {
        self.options.top_paths
    }

    /// Decode a whole `[seq_len, V]` row-major utterance in one call and
    /// return its top `top_paths` beams (spec §4.4 steps 1–3, end to end).
    pub fn decode(&mut self, probs: &[f32], seq_len: usize) -> Result<Vec<Beam>> {
        let _span = debug_span!("utterance", seq_len).entered();
        let v = self.alphabet.size();
        for t in 0..seq_len {
            self.step(&probs[t * v..(t + 1) * v])?;
        }
        Ok(self.finalize())
    }

    /// Advance through one additional timestep (spec §4.4 step 2, and the
    /// per-chunk inner loop of §4.9's `push`).
    pub fn step(&mut self, frame: &[f32]) -> Result<()> {
        let _span = debug_span!("timestep", t = self.t).entered();
        let v = self.alphabet.size();
        if frame.len() != v {
            return Err(DecodeError::InvalidArgument(format!(
                "frame has {} probabilities, alphabet has {v} labels",
                frame.len()
            )));
        }

        let logp: Vec<f32> = if self.options.log_probs_input {
            frame.to_vec()
        } else {
            frame
                .iter()
                .map(|&p| {
                    if !p.is_finite() {
                        warn!(p, "non-finite probability clamped to -inf");
                    }
                    safe_ln(p)
                })
                .collect()
        };

        let survivors = self.prune_labels(&logp);
        let active = self.trie.iter_active().to_vec();
        let mut touched = active.clone();
        for &pi in &active {
            for &label in &survivors {
                if let Some(child) = self.extend(pi, label, logp[label]) {
                    touched.push(child);
                }
            }
        }
        touched.sort_unstable();
        touched.dedup();
        self.trie.set_active(touched);
        self.trie.roll_timestep();
        self.prune_beams();
        self.t += 1;
        debug!(active = self.trie.iter_active().len(), "timestep complete");
        Ok(())
    }

    /// End-of-stream flush and ranked extraction (spec §4.4 step 3): the
    /// partial word pending on each active beam is scored through the
    /// lexicon/LM exactly once, per the lexicon-check -> LM-flush ->
    /// hotword-finalize -> score-commit order pinned in spec §9. Hot-word
    /// bonuses are already folded into `Node::score` continuously (see
    /// `derive_seed`), so "hotword-finalize" here is the no-op fold of that
    /// running total into the committed score.
    pub fn finalize(&mut self) -> Vec<Beam> {
        let active = self.trie.iter_active().to_vec();
        let mut scored: Vec<(NodeId, f32)> = active
            .into_iter()
            .filter_map(|id| self.finalize_score(id).map(|s| (id, s)))
            .collect();
        scored.sort_unstable_by(|&(a, sa), &(b, sb)| {
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    self.trie
                        .get(b)
                        .approx_ctc
                        .partial_cmp(&self.trie.get(a).approx_ctc)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| self.trie.get(a).insertion_order.cmp(&self.trie.get(b).insertion_order))
        });
        scored.truncate(self.options.top_paths);
        scored
            .into_iter()
            .map(|(id, score)| Beam {
                labels: self.trie.path_labels(id),
                timesteps: self.trie.path_timesteps(id),
                score,
            })
            .collect()
    }

    /// Ranked snapshot of the current beam set without committing the final
    /// word flush — used by the online session's non-final `push` (spec
    /// §4.9: "otherwise returns the *current* top-K").
    pub fn current_top_k(&self, k: usize) -> Vec<Beam> {
        let mut active = self.trie.iter_active().to_vec();
        active.sort_unstable_by(|&a, &b| self.beam_cmp(b, a));
        active.truncate(k);
        active
            .into_iter()
            .map(|id| Beam {
                labels: self.trie.path_labels(id),
                timesteps: self.trie.path_timesteps(id),
                score: self.trie.get(id).score_prev(),
            })
            .collect()
    }

    fn finalize_score(&self, id: NodeId) -> Option<f32> {
        let node = self.trie.get(id);
        let pending = self.trie.current_word_labels(id);
        let mut bonus = 0.0;
        if !pending.is_empty() {
            if self.options.strict_lexicon {
                let mut state = self.lexicon.root_state();
                let mut is_end = false;
                for &label in &pending {
                    match self.lexicon.advance(state, label) {
                        Advance::Reachable {
                            state: s,
                            is_word_end,
                        } => {
                            state = s;
                            is_end = is_word_end;
                        }
                        Advance::Dead => return None,
                    }
                }
                if !is_end {
                    return None;
                }
            }
            if matches!(self.options.lm_type, LmType::Word) {
                if let Some(lm) = &self.lm {
                    let word = self.spell(&pending);
                    let (_, word_bonus) = lm.score_word(node.lm_state, &word);
                    bonus += word_bonus;
                }
            }
        }
        Some(node.score_prev() + bonus)
    }

    /// Label pruning for one timestep (spec §4.4 step 2a, plus the
    /// `label_margin` union rule from §11).
    fn prune_labels(&self, logp: &[f32]) -> Vec<usize> {
        let v = logp.len();
        let mut order: Vec<usize> = (0..v).collect();
        order.sort_unstable_by(|&a, &b| {
            logp[b].partial_cmp(&logp[a]).unwrap_or(std::cmp::Ordering::Equal)
        });

        let top_n = self.options.cutoff_top_n.min(v);
        let mut survivors: Vec<usize> = order[..top_n].to_vec();

        if self.options.cutoff_prob < 1.0 {
            let mut cum = 0.0f32;
            let mut keep = survivors.len();
            for (i, &label) in survivors.iter().enumerate() {
                cum += logp[label].exp();
                if cum >= self.options.cutoff_prob {
                    keep = i + 1;
                    break;
                }
            }
            survivors.truncate(keep);
        }

        if let Some(margin) = self.options.label_margin {
            let best = logp[order[0]];
            for &label in &order[top_n..] {
                if best - logp[label] <= margin {
                    survivors.push(label);
                } else {
                    break; // order is sorted descending: nothing further qualifies
                }
            }
        }

        let blank = self.alphabet.blank_id();
        if !survivors.contains(&blank) {
            survivors.push(blank);
        }
        survivors
    }

    /// Apply one label `c` at probability `lp` to beam `pi` (spec §4.4 step
    /// 2b). Returns the child touched this step, if any (blank updates `pi`
    /// in place and touches nothing new).
    fn extend(&mut self, pi: NodeId, label: usize, lp: f32) -> Option<NodeId> {
        if self.alphabet.is_blank(label) {
            let (p_b_prev, p_nb_prev) = {
                let n = self.trie.get(pi);
                (n.p_b_prev, n.p_nb_prev)
            };
            let combined = logaddexp(p_b_prev, p_nb_prev);
            let n = self.trie.get_mut(pi);
            n.p_b = logaddexp(n.p_b, lp + combined);
            return None;
        }

        let last = self.trie.get(pi).label;
        let child = if last == Some(label) {
            // Same label as π's last: stay on π (no blank in between)...
            let p_nb_prev = self.trie.get(pi).p_nb_prev;
            let n = self.trie.get_mut(pi);
            n.p_nb = logaddexp(n.p_nb, lp + p_nb_prev);
            // ...and separately expand to π+c (separated by an implicit blank).
            let p_b_prev = self.trie.get(pi).p_b_prev;
            let child = self.get_or_build_child(pi, label)?;
            let contribution = lp + p_b_prev;
            self.bump_timestep(child, contribution);
            let n = self.trie.get_mut(child);
            n.p_nb = logaddexp(n.p_nb, contribution);
            child
        } else {
            let (p_b_prev, p_nb_prev) = {
                let n = self.trie.get(pi);
                (n.p_b_prev, n.p_nb_prev)
            };
            let combined = logaddexp(p_b_prev, p_nb_prev);
            let child = self.get_or_build_child(pi, label)?;
            let contribution = lp + combined;
            self.bump_timestep(child, contribution);
            let n = self.trie.get_mut(child);
            n.p_nb = logaddexp(n.p_nb, contribution);
            child
        };

        Some(child)
    }

    /// Attribute `child`'s alignment timestep to whichever single extension
    /// step contributed the most probability mass, not whichever touched it
    /// first — a node can be reached at several timesteps (its label repeats
    /// across a run of blanks) and the reported alignment should be the step
    /// the label was actually most likely emitted at (spec §3 alignment
    /// semantics, matching `original_source`'s per-label timestep output).
    fn bump_timestep(&mut self, child: NodeId, contribution: f32) {
        let n = self.trie.get_mut(child);
        if contribution > n.best_contrib {
            n.best_contrib = contribution;
            n.timestep = Some(self.t);
        }
    }

    /// Fetch `parent`'s existing child for `label`, or derive its seed state
    /// and create it. Returns `None` only when a strict lexicon rejects a
    /// brand-new word-boundary child outright (spec §4.4: "reject the
    /// child").
    fn get_or_build_child(&mut self, parent: NodeId, label: usize) -> Option<NodeId> {
        if let Some(id) = self.trie.child(parent, label) {
            return Some(id);
        }
        let (seed, self_patch) = self.derive_seed(parent, label)?;
        let id = self.trie.get_or_create_child(parent, label, seed);
        if self_patch {
            self.trie.get_mut(id).word_start = id;
        }
        Some(id)
    }

    /// Derive the LM/lexicon/hot-word state a brand-new child of `parent`
    /// should carry, and whether it is a pure word-boundary separator whose
    /// own id must become its `word_start` (patched in by the caller once
    /// the node exists). `None` means a strict lexicon rejected the
    /// just-completed word.
    fn derive_seed(&self, parent: NodeId, label: usize) -> Option<(ChildSeed, bool)> {
        let node = self.trie.get(parent);
        let is_boundary = self.alphabet.is_word_boundary(label);
        let starts_word = self.alphabet.boundary_starts_word(label);

        let mut lm_state = node.lm_state;
        let mut lm_bonus = node.lm_bonus;

        if is_boundary {
            let pending = self.trie.current_word_labels(parent);
            if !pending.is_empty() {
                if self.options.strict_lexicon && !node.lex_is_word_end {
                    return None;
                }
                if matches!(self.options.lm_type, LmType::Word) {
                    if let Some(lm) = &self.lm {
                        let word = self.spell(&pending);
                        let (new_state, bonus) = lm.score_word(lm_state, &word);
                        lm_state = new_state;
                        lm_bonus += bonus;
                    }
                }
            }
        }

        // Character/BPE-level LMs (spec §4.6) are queried per token as each
        // one is appended, independent of word-boundary status — gating them
        // to boundaries the way the word-level LM is gated would mean a
        // character LM in character mode (boundary = space only) or a BPE LM
        // over continuation pieces never gets consulted at all.
        if !matches!(self.options.lm_type, LmType::Word) {
            if let Some(lm) = &self.lm {
                let token = self.alphabet.emit(label);
                let (new_state, bonus) = lm.score_word(lm_state, token);
                lm_state = new_state;
                lm_bonus += bonus;
            }
        }

        let is_separator = is_boundary && !starts_word;
        let (lex_state, lex_is_word_end) = if is_separator {
            (self.lexicon.root_state(), false)
        } else {
            let base = if is_boundary {
                self.lexicon.root_state()
            } else {
                node.lex_state
            };
            match self.lexicon.advance(base, label) {
                Advance::Reachable { state, is_word_end } => (state, is_word_end),
                Advance::Dead => (DEAD, false),
            }
        };

        let (hotword_state, hw_delta) = self.hotwords.advance(node.hotword_state, label);
        let hotword_bonus = node.hotword_bonus + hw_delta;

        // Separator's word_start is patched to its own id by the caller
        // once the node exists; `parent` here is just a harmless placeholder.
        let word_start = if is_boundary { parent } else { node.word_start };

        Some((
            ChildSeed {
                lm_state,
                lex_state,
                lex_is_word_end,
                hotword_state,
                hotword_bonus,
                lm_bonus,
                word_start,
            },
            is_separator,
        ))
    }

    fn prune_beams(&mut self) {
        let mut ranked = self.trie.iter_active().to_vec();
        for &id in &ranked {
            let acoustic = {
                let n = self.trie.get(id);
                crate::logprob::total_score(n.p_b_prev, n.p_nb_prev)
            };
            self.trie.get_mut(id).approx_ctc = acoustic;
        }
        ranked.sort_unstable_by(|&a, &b| self.beam_cmp(b, a));
        ranked.truncate(self.options.beam_width);
        self.trie.set_active(ranked);
    }

    /// Deterministic descending order: score, then `approx_ctc`, then
    /// insertion order (spec §4.3 pruning tie-breaks).
    fn beam_cmp(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        let na = self.trie.get(a);
        let nb = self.trie.get(b);
        na.score_prev()
            .partial_cmp(&nb.score_prev())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| na.approx_ctc.partial_cmp(&nb.approx_ctc).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| na.insertion_order.cmp(&nb.insertion_order))
    }

    fn spell(&self, labels: &[usize]) -> String {
        labels.iter().map(|&l| self.alphabet.emit(l)).collect::<Vec<_>>().concat()
    }
}

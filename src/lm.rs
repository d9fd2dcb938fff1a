//! LM scorer (C5), spec §4.6.
//!
//! KenLM's own implementation is explicitly out of scope (spec §1); this
//! module implements the *interface* spec §4.6 describes plus a small
//! in-process n-gram model that reads the ARPA text format KenLM itself
//! accepts (spec §6), so the crate is useful standalone and the interface is
//! exercised by real data in tests.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::config::LmType;
use crate::error::{DecodeError, Result};

/// Longest context this crate's `LmState` can hold: a 5-gram model needs 4
/// prior words of context. Matches KenLM's common max order in practice;
/// models requesting a higher order are rejected at load time rather than
/// silently truncating context (§7: no silent data loss).
pub const MAX_ORDER: usize = 6;

/// Per-beam LM state: the most recent `order - 1` word/token ids, a small
/// plain `Copy` value owned by the trie node (spec §3, §4.6 design notes —
/// "per-beam state is a small plain value derived from it and copyable").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LmState {
    ctx: [i32; MAX_ORDER - 1],
    len: u8,
}

impl Default for LmState {
    fn default() -> Self {
        Self::empty()
    }
}

impl LmState {
    fn empty() -> Self {
        Self {
            ctx: [-1; MAX_ORDER - 1],
            len: 0,
        }
    }

    fn pushed(&self, word_id: i32, order: usize) -> Self {
        let keep = (order - 1).min(MAX_ORDER - 1);
        if keep == 0 {
            return Self::empty();
        }
        let mut ctx = [-1i32; MAX_ORDER - 1];
        let old_len = self.len as usize;
        let take = old_len.min(keep - 1);
        // Shift existing context left by one, drop the oldest, append word_id.
        for i in 0..take {
            ctx[i] = self.ctx[old_len - take + i];
        }
        ctx[take] = word_id;
        Self {
            ctx,
            len: (take + 1) as u8,
        }
    }

    fn as_slice(&self) -> &[i32] {
        &self.ctx[..self.len as usize]
    }
}

/// A loaded n-gram table entry: log-probability (natural log) and optional
/// backoff weight, ARPA-style.
#[derive(Clone, Copy, Debug)]
struct Entry {
    log_prob: f32,
    backoff: f32,
}

/// Read-only after construction; safe to share across worker threads inside
/// an `Arc` without locking (spec §4.6, §5).
pub struct NgramLm {
    lm_type: LmType,
    order: usize,
    vocab: HashMap<String, i32>,
    /// Keyed by the word-id sequence, most-recent word last.
    table: HashMap<Vec<i32>, Entry>,
    unk_score: f32,
}

impl NgramLm {
    /// Parse the ARPA text format (the format KenLM's own CLI tools emit).
    /// Probabilities in ARPA files are log10; converted to natural log here
    /// so every score in this crate lives in the same base (spec §4.1).
    pub fn from_arpa_reader(mut r: impl BufRead, lm_type: LmType, unk_score: f32) -> Result<Self> {
        let mut vocab: HashMap<String, i32> = HashMap::new();
        let mut table: HashMap<Vec<i32>, Entry> = HashMap::new();
        let mut order = 0usize;
        let mut current_order = 0usize;
        let mut line = String::new();
        let ln10 = std::f32::consts::LN_10;

        let mut next_id = |vocab: &mut HashMap<String, i32>, w: &str| -> i32 {
            let next = vocab.len() as i32;
            *vocab.entry(w.to_string()).or_insert(next)
        };

        loop {
            line.clear();
            let n = r.read_line(&mut line).map_err(DecodeError::from)?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed == "\\data\\" {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("ngram ") {
                if let Some((ord, _count)) = rest.split_once('=') {
                    if let Ok(ord) = ord.trim().parse::<usize>() {
                        order = order.max(ord);
                    }
                }
                continue;
            }
            if trimmed.starts_with('\\') && trimmed.ends_with("-grams:") {
                let ord_str = &trimmed[1..trimmed.len() - "-grams:".len()];
                current_order = ord_str.parse().unwrap_or(0);
                continue;
            }
            if trimmed == "\\end\\" {
                break;
            }
            if current_order == 0 {
                continue;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() < 1 + current_order {
                continue;
            }
            let log10_prob: f32 = fields[0].parse().map_err(|_| {
                DecodeError::CorruptInput(format!("malformed ARPA probability: {trimmed}"))
            })?;
            let words = &fields[1..1 + current_order];
            let backoff: f32 = fields
                .get(1 + current_order)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            let ids: Vec<i32> = words.iter().map(|w| next_id(&mut vocab, w)).collect();
            table.insert(
                ids,
                Entry {
                    log_prob: log10_prob * ln10,
                    backoff: backoff * ln10,
                },
            );
        }

        if order == 0 || order > MAX_ORDER {
            return Err(DecodeError::CorruptInput(format!(
                "unsupported n-gram order {order} (max {MAX_ORDER})"
            )));
        }

        Ok(Self {
            lm_type,
            order,
            vocab,
            table,
            unk_score,
        })
    }

    pub fn from_arpa_file(path: impl AsRef<Path>, lm_type: LmType, unk_score: f32) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path).map_err(|e| {
            DecodeError::ResourceUnavailable(format!("opening LM file {}: {e}", path.display()))
        })?;
        Self::from_arpa_reader(std::io::BufReader::new(f), lm_type, unk_score)
    }

    /// Build directly from unigram counts/probabilities, for tests and for
    /// callers that already have a small in-memory model (no ARPA file).
    pub fn from_unigrams(lm_type: LmType, entries: Vec<(&str, f32)>, unk_score: f32) -> Self {
        let mut vocab = HashMap::new();
        let mut table = HashMap::new();
        for (w, lp) in entries {
            let id = vocab.len() as i32;
            let id = *vocab.entry(w.to_string()).or_insert(id);
            table.insert(
                vec![id],
                Entry {
                    log_prob: lp,
                    backoff: 0.0,
                },
            );
        }
        Self {
            lm_type,
            order: 1,
            vocab,
            table,
            unk_score,
        }
    }

    pub fn null_state(&self) -> LmState {
        LmState::empty()
    }

    pub fn is_character_based(&self) -> bool {
        matches!(self.lm_type, LmType::Character)
    }

    pub fn max_order(&self) -> usize {
        self.order
    }

    pub fn dict_size(&self) -> usize {
        self.vocab.len()
    }

    /// Conditional log-probability of `word` given `state`'s context, with
    /// ARPA-style backoff when the full n-gram is absent. Unknown words get
    /// `unk_score`. Returns the successor state.
    pub fn score(&self, state: LmState, word: &str) -> (LmState, f32) {
        let word_id = match self.vocab.get(word) {
            Some(&id) => id,
            None => return (state.pushed(-1, self.order), self.unk_score),
        };
        let ctx = state.as_slice();
        let (_, log_prob) = self.score_from(ctx, word_id);
        (state.pushed(word_id, self.order), log_prob)
    }

    fn score_from(&self, ctx: &[i32], word_id: i32) -> (Vec<i32>, f32) {
        let mut key = ctx.to_vec();
        key.push(word_id);
        if let Some(entry) = self.table.get(&key) {
            return (key, entry.log_prob);
        }
        if ctx.is_empty() {
            return (key, self.unk_score);
        }
        let backoff = self.table.get(ctx).map(|e| e.backoff).unwrap_or(0.0);
        let (_, lower) = self.score_from(&ctx[1..], word_id);
        (key, lower + backoff)
    }
}

/// Pairs a shared, immutable `NgramLm` with the per-decoder mixing weights
/// from spec §4.6/§6 (`alpha`, `beta`, `unk_score` floor). The heavy n-gram
/// table is shared via `Arc` across worker threads without a lock; `alpha`/
/// `beta` live in this thin wrapper, which each task owns by value (cheap —
/// one `Arc` clone), so `reset` never needs to touch shared state.
#[derive(Clone)]
pub struct LmRescorer {
    lm: Arc<NgramLm>,
    pub alpha: f32,
    pub beta: f32,
    pub min_unigram_weight: f32,
}

impl LmRescorer {
    pub fn new(lm: Arc<NgramLm>, alpha: f32, beta: f32) -> Self {
        Self {
            lm,
            alpha,
            beta,
            min_unigram_weight: f32::NEG_INFINITY,
        }
    }

    /// Change mixing weights without reloading the LM (spec §4.6 `reset`).
    pub fn reset(&mut self, alpha: f32, beta: f32) {
        self.alpha = alpha;
        self.beta = beta;
    }

    pub fn null_state(&self) -> LmState {
        self.lm.null_state()
    }

    /// `alpha * log_prob + beta` — the per-word contribution to a beam's
    /// score (spec §4.6; the `beta` word-count delta is always 1 per call,
    /// since this is invoked exactly once per completed word).
    pub fn score_word(&self, state: LmState, word: &str) -> (LmState, f32) {
        let (next, mut log_prob) = self.lm.score(state, word);
        if log_prob < self.min_unigram_weight {
            log_prob = self.min_unigram_weight;
        }
        (next, self.alpha * log_prob + self.beta)
    }

    pub fn is_character_based(&self) -> bool {
        self.lm.is_character_based()
    }

    pub fn max_order(&self) -> usize {
        self.lm.max_order()
    }

    pub fn dict_size(&self) -> usize {
        self.lm.dict_size()
    }
}

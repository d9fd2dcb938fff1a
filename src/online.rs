//! Online (streaming) session (C9), spec §4.9.

use std::sync::Arc;

use ndarray::ArrayView2;
use tracing::debug_span;

use crate::alphabet::Alphabet;
use crate::config::DecoderOptions;
use crate::error::{DecodeError, Result};
use crate::hotword::HotwordScorer;
use crate::lexicon::Lexicon;
use crate::lm::LmRescorer;
use crate::search::{Beam, Engine};

/// Wraps a single in-flight [`Engine`] so its trie arena, active beams, and
/// timestep counter persist across successive `push` calls (spec §3:
/// "utterance state ... destroyed only when the online session is
/// released"). One `OnlineSession` decodes exactly one utterance; start a
/// new session per utterance.
pub struct OnlineSession {
    engine: Option<Engine>,
}

impl OnlineSession {
    pub fn new(
        alphabet: Arc<Alphabet>,
        options: DecoderOptions,
        lexicon: Arc<Lexicon>,
        lm: Option<LmRescorer>,
        hotwords: Arc<HotwordScorer>,
    ) -> Result<Self> {
        let engine = Engine::new(alphabet, options, lexicon, lm, hotwords)?;
        Ok(Self {
            engine: Some(engine),
        })
    }

    /// Advance through `chunk_probs`'s rows (`[T_chunk, V]`) additional
    /// timesteps. On `is_last`, flushes any pending word (LM/lexicon) and
    /// returns the completed top-K; otherwise returns the current top-K
    /// without committing a final-word flush (spec §4.9).
    pub fn push(&mut self, chunk_probs: ArrayView2<f32>, is_last: bool) -> Result<Vec<Beam>> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| DecodeError::InvalidArgument("push on a released session".into()))?;

        let v = chunk_probs.ncols();
        if v != engine.alphabet_size() {
            return Err(DecodeError::InvalidArgument(format!(
                "chunk vocab dim {} does not match alphabet size {}",
                v,
                engine.alphabet_size()
            )));
        }

        let _span = debug_span!("online_push", chunk_len = chunk_probs.nrows(), is_last).entered();
        for frame in chunk_probs.outer_iter() {
            let frame: Vec<f32> = frame.iter().copied().collect();
            engine.step(&frame)?;
        }

        if is_last {
            Ok(engine.finalize())
        } else {
            Ok(engine.current_top_k(engine.top_paths()))
        }
    }

    /// Deterministic, idempotent destruction: frees the trie arena by
    /// dropping the engine. Calling `push` after `release` is an error;
    /// calling `release` again is a no-op (spec §4.9).
    pub fn release(&mut self) {
        self.engine = None;
    }

    pub fn is_released(&self) -> bool {
        self.engine.is_none()
    }
}

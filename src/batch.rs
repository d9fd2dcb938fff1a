//! Batch executor (C8), spec §4.8/§5.

use std::sync::Arc;

use ndarray::{s, ArrayView3};
use rayon::prelude::*;
use tracing::{debug_span, warn};

use crate::alphabet::Alphabet;
use crate::config::DecoderOptions;
use crate::error::{DecodeError, Result};
use crate::hotword::HotwordScorer;
use crate::lexicon::Lexicon;
use crate::lm::LmRescorer;
use crate::search::{Beam, Engine};

/// Dispatches one [`Engine`] per batch row across a worker pool and gathers
/// results back in batch-index order regardless of completion order (spec
/// §5: "top-K written back to caller-provided output buffers" — row order is
/// part of that contract, not an artifact of whichever row finishes first).
///
/// The LM, lexicon and hot-word scorer are loaded once and shared read-only
/// across every row (spec §9: "the LM object is immutable after load ...
/// do not protect the LM with a lock") — each row only clones the cheap
/// `Arc`/`Copy` handles into its own `Engine`, which owns a private trie
/// arena for the duration of that row.
pub struct BatchDecoder {
    alphabet: Arc<Alphabet>,
    options: DecoderOptions,
    lexicon: Arc<Lexicon>,
    lm: Option<LmRescorer>,
    hotwords: Arc<HotwordScorer>,
    pool: Option<rayon::ThreadPool>,
}

impl BatchDecoder {
    pub fn new(
        alphabet: Arc<Alphabet>,
        options: DecoderOptions,
        lexicon: Arc<Lexicon>,
        lm: Option<LmRescorer>,
        hotwords: Arc<HotwordScorer>,
    ) -> Result<Self> {
        options.validate(alphabet.size())?;
        // `num_processes == 0` lets rayon's global pool pick (spec §6).
        let pool = if options.num_processes > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(options.num_processes)
                    .build()
                    .map_err(|e| DecodeError::InternalInvariantViolation(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            alphabet,
            options,
            lexicon,
            lm,
            hotwords,
            pool,
        })
    }

    /// Decode every row of `probs` (`[B, T, V]`) up to its `seq_lens[b]`
    /// valid timesteps. Spec §7: "partial batches are either fully completed
    /// or fully rejected" — any row's error aborts the whole call before any
    /// row's beams are handed back.
    pub fn decode_batch(
        &self,
        probs: ArrayView3<f32>,
        seq_lens: &[usize],
    ) -> Result<Vec<Vec<Beam>>> {
        let (b, t, v) = probs.dim();
        if seq_lens.len() != b {
            return Err(DecodeError::InvalidArgument(format!(
                "seq_lens has {} rows, probs has {}",
                seq_lens.len(),
                b
            )));
        }
        if v != self.alphabet.size() {
            return Err(DecodeError::InvalidArgument(format!(
                "probs vocab dim {} does not match alphabet size {}",
                v,
                self.alphabet.size()
            )));
        }

        let _span = debug_span!("batch_decode", batch_size = b, seq_len = t).entered();
        let run = || -> Result<Vec<Vec<Beam>>> {
            (0..b)
                .into_par_iter()
                .map(|row| self.decode_row(probs, row, t, seq_lens[row]))
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn decode_row(
        &self,
        probs: ArrayView3<f32>,
        row: usize,
        t: usize,
        seq_len: usize,
    ) -> Result<Vec<Beam>> {
        if seq_len > t {
            return Err(DecodeError::InvalidArgument(format!(
                "row {row}: seq_len {seq_len} exceeds tensor length {t}"
            )));
        }
        let flat: Vec<f32> = probs.slice(s![row, ..seq_len, ..]).iter().copied().collect();
        if flat.iter().any(|p| !p.is_finite()) {
            warn!(row, "non-finite probability in batch row");
            return Err(DecodeError::CorruptInput(format!(
                "row {row} contains a non-finite probability"
            )));
        }
        let mut engine = Engine::new(
            self.alphabet.clone(),
            self.options.clone(),
            self.lexicon.clone(),
            self.lm.clone(),
            self.hotwords.clone(),
        )?;
        engine.decode(&flat, seq_len)
    }
}

//! Decoder configuration (C12), spec §6 + §11 supplemented options.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

/// Granularity at which the LM scorer is queried, spec §4.6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LmType {
    Character,
    Bpe,
    Word,
}

/// All tunables from spec §6, plus the `top_paths`/`label_margin`/
/// `min_unigram_weight` knobs recovered from `original_source/` (§11).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecoderOptions {
    /// Max beams retained after each timestep (search-time width).
    pub beam_width: usize,
    /// Number of top hypotheses returned; `1 <= top_paths <= beam_width`.
    pub top_paths: usize,
    /// Max labels retained per timestep before the cumulative-probability cutoff.
    pub cutoff_top_n: usize,
    /// Cumulative probability threshold for label pruning; `1.0` disables it.
    pub cutoff_prob: f32,
    /// Worker-pool size for the batch executor (C8). `0` lets rayon pick.
    pub num_processes: usize,
    /// Index of the CTC blank symbol in the alphabet.
    pub blank_id: usize,
    /// Treat `probs` as already being in log-space.
    pub log_probs_input: bool,
    /// Enable BPE continuation-token merging on emission.
    pub is_bpe_based: bool,
    /// BPE continuation-token prefix, e.g. `"##"`.
    pub token_separator: String,
    /// LM scoring granularity.
    pub lm_type: LmType,
    /// LM weight in the rescoring mix.
    pub alpha: f32,
    /// Per-word bonus in the rescoring mix.
    pub beta: f32,
    /// Log-prob assigned to an out-of-vocabulary word.
    pub unk_score: f32,
    /// Reject (rather than merely down-score) words absent from the lexicon.
    pub strict_lexicon: bool,
    /// Extra pruning margin (log-prob units) relative to the best label that
    /// timestep; a label survives if within this margin of the best,
    /// independent of `cutoff_top_n`/`cutoff_prob` (§11, `label_selection_parameters`).
    pub label_margin: Option<f32>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            beam_width: 100,
            top_paths: 1,
            cutoff_top_n: 40,
            cutoff_prob: 1.0,
            num_processes: 4,
            blank_id: 0,
            log_probs_input: false,
            is_bpe_based: false,
            token_separator: "##".to_string(),
            lm_type: LmType::Word,
            alpha: 0.0,
            beta: 0.0,
            unk_score: f32::NEG_INFINITY,
            strict_lexicon: false,
            label_margin: None,
        }
    }
}

impl DecoderOptions {
    /// Validate invariants once, at construction time — never per-timestep.
    pub fn validate(&self, alphabet_size: usize) -> Result<()> {
        if self.beam_width < 1 {
            return Err(DecodeError::InvalidArgument(
                "beam_width must be >= 1".into(),
            ));
        }
        if self.top_paths < 1 || self.top_paths > self.beam_width {
            return Err(DecodeError::InvalidArgument(
                "top_paths must be >= 1 and <= beam_width".into(),
            ));
        }
        if self.blank_id >= alphabet_size {
            return Err(DecodeError::InvalidArgument(format!(
                "blank_id {} out of range for alphabet of size {}",
                self.blank_id, alphabet_size
            )));
        }
        if self.cutoff_top_n < 1 {
            return Err(DecodeError::InvalidArgument(
                "cutoff_top_n must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cutoff_prob) {
            return Err(DecodeError::InvalidArgument(
                "cutoff_prob must be within [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

//! CTC prefix beam-search decoder with optional n-gram LM rescoring,
//! lexicon-constrained emission, and hot-word boosting.
//!
//! A path trie (`trie`) holds the active beams for one utterance; each node
//! is a distinct collapsed label prefix carrying its own blank/non-blank
//! log-probabilities (`logprob`) plus, when configured, an LM state
//! (`lm`), a lexicon-automaton state (`lexicon`) and a hot-word-trie state
//! (`hotword`). `search::Engine` drives one utterance through these
//! collaborators timestep by timestep; `batch::BatchDecoder` fans that out
//! across a worker pool for `[B, T, V]` input, and `online::OnlineSession`
//! keeps one `Engine` alive across chunked, streamed input instead.
//!
//! All public entry points return [`Result`]; construction-time
//! configuration is validated once via [`config::DecoderOptions::validate`]
//! rather than re-checked per timestep.

pub mod alphabet;
pub mod batch;
pub mod config;
pub mod error;
pub mod hotword;
pub mod lexicon;
pub mod lm;
pub mod logprob;
pub mod online;
pub mod search;
pub mod trie;

pub mod prelude {
    pub use crate::alphabet::Alphabet;
    pub use crate::batch::BatchDecoder;
    pub use crate::config::{DecoderOptions, LmType};
    pub use crate::error::{DecodeError, Result};
    pub use crate::hotword::HotwordScorer;
    pub use crate::lexicon::Lexicon;
    pub use crate::lm::{LmRescorer, NgramLm};
    pub use crate::online::OnlineSession;
    pub use crate::search::{Beam, Engine};
}

pub use error::{DecodeError, Result};

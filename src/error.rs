//! Error kinds for the decoder, per spec §7.

use thiserror::Error;

/// Errors returned synchronously from decoder construction or a decode call.
///
/// `InternalInvariantViolation` should be unreachable in a correct build; it
/// only ever surfaces from a `debug_assert!`-guarded path and indicates a bug
/// in this crate rather than bad caller input.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("corrupt input: {0}")]
    CorruptInput(String),

    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("failed to deserialize LM/lexicon file")]
    Deserialize(#[from] Box<bincode::ErrorKind>),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

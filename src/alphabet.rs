//! Label alphabet (C2), spec §4.2.

use crate::error::{DecodeError, Result};

/// Ordered list of output tokens, with a designated blank index, an optional
/// space token for word-boundary tracking, and the BPE continuation-prefix
/// convention.
#[derive(Clone, Debug)]
pub struct Alphabet {
    tokens: Vec<String>,
    blank_id: usize,
    space_id: Option<usize>,
    is_bpe: bool,
    token_separator: String,
}

impl Alphabet {
    pub fn new(
        tokens: Vec<String>,
        blank_id: usize,
        space_id: Option<usize>,
        is_bpe: bool,
        token_separator: impl Into<String>,
    ) -> Result<Self> {
        if tokens.is_empty() {
            return Err(DecodeError::InvalidArgument(
                "alphabet must contain at least one token".into(),
            ));
        }
        if blank_id >= tokens.len() {
            return Err(DecodeError::InvalidArgument(format!(
                "blank_id {} out of range for {} tokens",
                blank_id,
                tokens.len()
            )));
        }
        if let Some(s) = space_id {
            if s >= tokens.len() {
                return Err(DecodeError::InvalidArgument(format!(
                    "space_id {} out of range for {} tokens",
                    s,
                    tokens.len()
                )));
            }
        }
        Ok(Self {
            tokens,
            blank_id,
            space_id,
            is_bpe,
            token_separator: token_separator.into(),
        })
    }

    /// Construct without BPE/space handling — the common case for character
    /// alphabets (spec S1–S4 scenarios).
    pub fn simple(tokens: Vec<String>, blank_id: usize) -> Result<Self> {
        Self::new(tokens, blank_id, None, false, "##")
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    #[inline]
    pub fn space_id(&self) -> Option<usize> {
        self.space_id
    }

    #[inline]
    pub fn is_bpe(&self) -> bool {
        self.is_bpe
    }

    #[inline]
    pub fn token(&self, i: usize) -> &str {
        &self.tokens[i]
    }

    #[inline]
    pub fn is_blank(&self, i: usize) -> bool {
        i == self.blank_id
    }

    #[inline]
    pub fn is_space(&self, i: usize) -> bool {
        self.space_id == Some(i)
    }

    /// True if token `i` carries the BPE continuation prefix (glues onto the
    /// preceding token on emission rather than starting a new one).
    #[inline]
    pub fn is_continuation(&self, i: usize) -> bool {
        self.is_bpe && self.tokens[i].starts_with(self.token_separator.as_str())
    }

    /// True if emitting label `i` crosses a word boundary: a space token in
    /// character mode, any non-continuation token in BPE mode, or any token
    /// at all in plain word mode (spec §4.4 step 2b).
    #[inline]
    pub fn is_word_boundary(&self, i: usize) -> bool {
        if self.is_bpe {
            !self.is_continuation(i)
        } else if self.space_id.is_some() {
            self.is_space(i)
        } else {
            // Plain word mode: every token is its own word.
            true
        }
    }

    /// True if the boundary-crossing label itself is part of the word it
    /// starts, rather than a pure separator consumed between two words. In
    /// character mode the space token is a separator (`false`); in BPE mode
    /// a non-continuation token is the first piece of the next word
    /// (`true`); in plain word mode every token is its own whole word
    /// (`true`). Only meaningful when `is_word_boundary(i)` is already true.
    #[inline]
    pub fn boundary_starts_word(&self, i: usize) -> bool {
        !self.is_space(i)
    }

    /// The text this token contributes to the emitted sequence: the BPE
    /// prefix stripped in BPE mode, the raw token text otherwise.
    pub fn emit(&self, i: usize) -> &str {
        let tok = &self.tokens[i];
        if self.is_bpe {
            tok.strip_prefix(self.token_separator.as_str()).unwrap_or(tok)
        } else {
            tok
        }
    }
}

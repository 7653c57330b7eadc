//! Error types

use std::io;

/// Result type with [`Error`] as the default error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while building a tagger, loading a model or tagging
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ill-formed feature templates, tagset or configuration knobs.
    ///
    /// Detected at build time, no partial tagger is produced.
    #[error("{0}")]
    Config(String),

    /// A token could not be prepared for feature extraction.
    #[error("token {token}: {reason}")]
    Decode { token: usize, reason: String },

    /// The weight table or model file does not have the expected shape.
    #[error("invalid model: {0}")]
    ModelLoad(String),

    /// Malformed lexicon or tagset data.
    #[error("invalid format: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn decode<S: Into<String>>(token: usize, reason: S) -> Self {
        Self::Decode {
            token,
            reason: reason.into(),
        }
    }

    pub(crate) fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub(crate) fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }
}

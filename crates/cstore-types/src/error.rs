use thiserror::Error;

/// Errors produced by content URL validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("content URL must start with one of {expected:?}: {url}")]
    UnknownProtocol {
        url: String,
        expected: &'static [&'static str],
    },

    #[error("content URL path too short ({len} < {min} chars): {url}")]
    TooShort { url: String, len: usize, min: usize },
}

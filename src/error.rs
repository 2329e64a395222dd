use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a platform specifier was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformReason {
    TooFewSegments,
    TooManySegments,
}

impl fmt::Display for PlatformReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformReason::TooFewSegments => f.write_str("too few segments"),
            PlatformReason::TooManySegments => f.write_str("too many segments"),
        }
    }
}

/// Fatal errors. Any of these aborts the run before a report is printed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse platform '{spec}': {reason} (expected os/arch[/variant])")]
    MalformedPlatform { spec: String, reason: PlatformReason },

    #[error("failed to parse timestamp '{value}' as RFC 3339: {source}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error(
        "image history has {expected} data layers but the platform manifest lists {actual} layers"
    )]
    LayerCountMismatch { expected: usize, actual: usize },

    #[error("invalid image reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("no manifest for platform {wanted} (available: {available})")]
    PlatformNotFound { wanted: String, available: String },

    #[error("digest mismatch: expected {expected}, registry returned content hashing to {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("registry returned {status} for {url}: {message}")]
    Registry {
        status: u16,
        url: String,
        message: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected manifest: {0}")]
    Manifest(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A history command that looked like a shell invocation but did not parse.
///
/// Non-fatal: the entry keeps its original text and carries this alongside.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct ShellFormatError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

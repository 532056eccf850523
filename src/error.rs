//! Error types for BPE training.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a training run.
///
/// Malformed UTF-8 in the corpus is not represented here: it is dropped
/// during pre-tokenization. Likewise a target vocabulary that leaves no room
/// for merges, or a pair table that runs dry early, both end training
/// normally.
#[derive(Error, Debug)]
pub enum TrainError {
    /// The corpus file could not be opened or inspected.
    #[error("I/O error for {path}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Seeking or reading an already opened corpus failed.
    #[error("corpus read failed: {0}")]
    Read(#[from] std::io::Error),

    /// The pre-tokenization pattern or special-token splitter failed to
    /// compile, or a match failed at runtime.
    #[error("pattern error: {0}")]
    Pattern(#[from] fancy_regex::Error),

    /// The pre-tokenization worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Configuration rejected before any work started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

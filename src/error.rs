//! Error types for Reel

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Reel operations
pub type Result<T> = std::result::Result<T, ReelError>;

/// Errors that can occur in Reel
#[derive(Debug, Error)]
pub enum ReelError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unparsable or legacy-unmigrated cassette file
    #[error("Invalid cassette format: {0}")]
    Format(String),

    /// Request has no matching interaction and the record mode forbids
    /// adding new interactions to the cassette
    #[error(
        "Cannot overwrite existing cassette {path}: no interaction matches \
         {method} {uri} and record mode '{mode}' forbids recording"
    )]
    CannotOverwrite {
        /// HTTP method of the offending request
        method: String,
        /// URI of the offending request
        uri: String,
        /// Path of the cassette that refused the request
        path: PathBuf,
        /// Active record mode
        mode: String,
    },

    /// Internal precondition violated: playback requested without a prior
    /// successful `can_play_response_for`
    #[error("Playback misuse: {0}")]
    Playback(String),

    /// A stored body the serializer cannot reconstruct
    #[error("Unsupported body: {0}")]
    UnsupportedBody(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

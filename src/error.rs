//! Centralized error types for mboxbook.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the mboxbook library.
///
/// `UnreadableArchive` and `EmptyArchive` abort a run. `MalformedMessage` is
/// only ever logged by the loader; the entry is skipped and the run goes on.
#[derive(Error, Debug)]
pub enum BookError {
    /// The archive could not be opened or read.
    #[error("Unreadable archive '{path}': {source}")]
    UnreadableArchive {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The archive holds no usable message.
    #[error("Archive contains no usable messages: {0}")]
    EmptyArchive(PathBuf),

    /// One archive entry could not be parsed and was skipped.
    #[error("Malformed message at offset {offset}: {reason}")]
    MalformedMessage { offset: u64, reason: String },

    /// A user-supplied quote trigger pattern is not a valid regex.
    #[error("Invalid quote pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Writing the output document or its assets failed.
    #[error("Cannot write output '{path}': {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, BookError>`.
pub type Result<T> = std::result::Result<T, BookError>;

impl BookError {
    /// Create an `UnreadableArchive` variant from a path and an `io::Error`.
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::UnreadableArchive {
            path: path.into(),
            source,
        }
    }

    /// Create an `Output` variant from a path and an `io::Error`.
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }
}

/// A recoverable problem with one message.
///
/// Issues stay attached to the [`MessageRecord`](crate::model::message::MessageRecord)
/// they were found on and are tallied in the run report. They never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageIssue {
    /// The body could not be decoded cleanly.
    /// `lossy` is false when the body had to be dropped entirely.
    #[error("Cannot decode body with charset '{charset}'")]
    EncodingFailure { charset: String, lossy: bool },

    /// The body references an inline image that is not part of the message.
    #[error("Inline image '{content_id}' not found in message")]
    UnresolvedInlineImage { content_id: String },

    /// The `Date:` header was missing or unparsable; the envelope date was used.
    #[error("Unparsable date '{header}', using envelope date")]
    DateFallback { header: String },
}

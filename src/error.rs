// Error module
// Non-fatal failures of board operations, each reported and abandoned in isolation

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading, persisting or negotiating images for the board.
///
/// None of these abort the event loop; fatal initialization failures travel as
/// `anyhow::Error` out of `main` instead.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The image store already holds its maximum number of images
    #[error("{}: cannot open image, too many open (limit {limit})", .path.display())]
    CapacityExceeded { path: PathBuf, limit: usize },

    /// Decoded pixel data that cannot be turned into a texture
    #[error("{}: image rejected: {reason}", .path.display())]
    DecodeRejected { path: PathBuf, reason: String },

    /// Unreadable, corrupt or unknown-format image file
    #[error("{}: failed to load image: {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    /// Session file open/read/write failure
    #[error("{}: {source}", .path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A session line with an unparseable numeric field
    #[error("line {line}: malformed `{token}`: {reason}")]
    MalformedDirective {
        line: usize,
        token: String,
        reason: String,
    },

    /// Drag source speaks an older negotiation version than supported
    #[error("unsupported drag-and-drop version {found} (supported: {supported})")]
    UnsupportedProtocolVersion { found: u32, supported: u32 },
}

impl BoardError {
    /// Whether this is an I/O failure caused by a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, BoardError::IoFailure { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

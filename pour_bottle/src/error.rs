use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the application shell.
///
/// Asset and audio failures are reported through these but are never fatal:
/// callers log them and fall back to the placeholder model or the synthesized
/// tone.
#[derive(Error, Debug)]
pub enum PourError {
    #[error("motion sensor access denied")]
    PermissionDenied,

    #[error("window error: {0}")]
    Window(String),

    #[error("model asset {}: {}", .path.display(), .reason)]
    Asset { path: PathBuf, reason: String },

    #[error("audio error: {0}")]
    Audio(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PourResult<T> = Result<T, PourError>;

impl PourError {
    pub fn asset(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PourError::Asset { path: path.into(), reason: reason.to_string() }
    }
}

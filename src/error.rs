//! # Error Types
//!
//! Every way a wallpaper change can fail. The orchestrator logs these with the
//! stage they came from and reduces them to a plain success/failure result;
//! none of them is fatal to the process.

use thiserror::Error;

/// A failure somewhere in the wallpaper pipeline.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// No API key stored, none in the environment, and the key provider gave none
    #[error("a TMDB API key is required to fetch wallpapers")]
    MissingApiKey,

    /// The favorites list has no titles to pick from
    #[error("no titles found in the favorites list")]
    EmptyFavorites,

    /// No search match for the title, or no backdrop passed the filter
    #[error("{0}")]
    NotFound(String),

    /// Connection error, timeout or non-2xx response
    #[error("network error: {0}")]
    Network(String),

    /// Download or disk write failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The host OS has no wallpaper mechanism we know of
    #[error("unsupported OS: {0}")]
    UnsupportedPlatform(String),

    /// The OS-level wallpaper call itself failed
    #[error("failed to set the wallpaper: {0}")]
    PlatformApply(String),

    /// The favorites database could not be read or written
    #[error("favorites database error: {0}")]
    Store(String),

    /// Another change is still running; this trigger was dropped
    #[error("a wallpaper change is already in progress")]
    Busy,
}

impl ChangeError {
    /// Name of the pipeline stage this error belongs to, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "api-key",
            Self::EmptyFavorites | Self::Store(_) => "favorites",
            Self::NotFound(_) | Self::Network(_) => "resolve",
            Self::Io(_) => "fetch",
            Self::UnsupportedPlatform(_) | Self::PlatformApply(_) => "apply",
            Self::Busy => "guard",
        }
    }
}

impl From<reqwest::Error> for ChangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("request timed out - check your internet connection".to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for ChangeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<rusqlite::Error> for ChangeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

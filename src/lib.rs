use std::fmt::Display;

pub mod api;
pub mod callback;
pub mod config;
pub mod poll;
pub mod ui;

pub use api::auth::{FileTokenStore, MemoryTokenStore, StoreKey, TokenStore};
pub use api::pkce::{CodeChallenge, TokenManager};
pub use api::response::CurrentlyPlaying;
pub use config::Credentials;
pub use poll::{NowPlayingPoller, Scheduler, TokioScheduler};

/// Errors produced by the token flow and the now-playing client.
#[derive(Debug)]
pub enum Error {
    /// Non-success response from the token endpoint, carrying the
    /// `error`/`error_description` pair Spotify reports.
    Auth {
        code: u16,
        error: String,
        message: String,
    },
    /// Non-success response from an API endpoint.
    Request { code: u16, message: String },
    /// A refresh was attempted with nothing stored. Distinct from a failed
    /// HTTP exchange.
    NoRefreshToken,
    /// No access token available, even after a refresh attempt.
    Unauthenticated,
    /// The configured redirect URI could not be bound locally.
    InvalidRedirect(String),
    Custom(String),
}

impl Error {
    pub fn custom<D: Display>(message: D) -> Self {
        Self::Custom(message.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth {
                code,
                error,
                message,
            } => write!(f, "[{code}] {error}: {message}"),
            Self::Request { code, message } => write!(f, "[{code}] {message}"),
            Self::NoRefreshToken => write!(f, "no refresh token available"),
            Self::Unauthenticated => write!(f, "not authenticated with spotify"),
            Self::InvalidRedirect(uri) => write!(f, "invalid redirect uri: {uri}"),
            Self::Custom(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::custom(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::custom(value)
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for Error {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Self::custom(value)
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(value: serde_urlencoded::ser::Error) -> Self {
        Self::custom(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::custom(value)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(value: std::string::FromUtf8Error) -> Self {
        Self::custom(value)
    }
}

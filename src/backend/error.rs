use std::fmt;

/// Errors that can occur while connecting to or reading from a chat platform
#[derive(Debug)]
pub enum ChatError {
    /// Transport/TLS failure or unexpected close
    Connection(String),

    /// Missing or invalid token / API key
    Auth(String),

    /// No matching channel or live video found
    Resolution(String),

    /// A YouTube API key was needed and none was supplied
    NoApiKey,

    /// Badge/emote fetch or decode failure (degrades rendering only)
    Asset(String),

    /// HTTP request error
    Http(String),

    /// JSON parsing error
    Json(String),

    /// Configuration file error
    Config(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ChatError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ChatError::Resolution(msg) => write!(f, "Resolution error: {}", msg),
            ChatError::NoApiKey => write!(f, "No YouTube API key available"),
            ChatError::Asset(msg) => write!(f, "Asset error: {}", msg),
            ChatError::Http(msg) => write!(f, "HTTP error: {}", msg),
            ChatError::Json(msg) => write!(f, "JSON error: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Http(err.to_string())
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Connection(err.to_string())
    }
}

impl From<native_tls::Error> for ChatError {
    fn from(err: native_tls::Error) -> Self {
        ChatError::Connection(format!("TLS: {}", err))
    }
}

impl From<image::ImageError> for ChatError {
    fn from(err: image::ImageError) -> Self {
        ChatError::Asset(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

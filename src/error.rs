/// Error types for the group chat client.
/// Every fallible client operation returns `Result<T>`; the app layer decides
/// which failures are surfaced and which are only logged.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server communication error: {0}")]
    ServerError(String),

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::HttpError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocketError(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::ConfigError(format!("Invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_variants_display_their_category() {
        let errors = [
            ClientError::StorageError("x".to_string()),
            ClientError::ServerError("x".to_string()),
            ClientError::InvalidGroup("x".to_string()),
            ClientError::ConfigError("x".to_string()),
            ClientError::HttpError("x".to_string()),
            ClientError::WebSocketError("x".to_string()),
            ClientError::StateError("x".to_string()),
            ClientError::NotFound("x".to_string()),
        ];

        for err in errors {
            let prefix = match &err {
                ClientError::StorageError(_) => "Storage error",
                ClientError::ServerError(_) => "Server communication error",
                ClientError::InvalidGroup(_) => "Invalid group",
                ClientError::ConfigError(_) => "Configuration error",
                ClientError::HttpError(_) => "HTTP error",
                ClientError::WebSocketError(_) => "WebSocket error",
                ClientError::StateError(_) => "State error",
                ClientError::NotFound(_) => "Not found",
                ClientError::IoError(_) | ClientError::DbError(_) | ClientError::JsonError(_) => {
                    unreachable!()
                }
            };
            assert_eq!(err.to_string(), format!("{}: x", prefix));
        }
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::StorageError("database locked".to_string());
        assert!(err.to_string().contains("Storage error"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let client_err: ClientError = io_err.into();
        assert!(client_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_url() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let client_err: ClientError = parse_err.into();
        assert!(matches!(client_err, ClientError::ConfigError(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let client_err: ClientError = json_err.into();
        assert!(client_err.to_string().starts_with("JSON error"));
    }
}

/// Configuration management for the group chat client.
/// Handles command-line argument parsing and config structure.
use crate::error::{ClientError, Result};
use crate::sync::DEFAULT_HISTORY_LIMIT;
use clap::Parser;
use std::path::PathBuf;

pub const SESSION_DB_FILE: &str = "session.db";

#[derive(Parser, Debug, Clone)]
#[command(name = "chat-client")]
#[command(about = "Community group chat client", long_about = None)]
pub struct Config {
    /// Hosted backend base URL
    #[arg(long, env = "CHAT_BACKEND_URL", default_value = "http://localhost:54321")]
    pub backend_url: String,

    /// Public API key sent with every request
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub api_key: String,

    /// Directory for the session database (default: ~/.groupchat)
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Messages loaded when a room is opened
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Run against an in-process demo backend
    #[arg(long)]
    pub offline: bool,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(ClientError::ConfigError(
                "history limit must be at least 1".to_string(),
            ));
        }
        if !self.offline {
            if self.backend_url.trim().is_empty() {
                return Err(ClientError::ConfigError("backend URL is required".to_string()));
            }
            if self.api_key.trim().is_empty() {
                return Err(ClientError::ConfigError(
                    "API key is required (set --api-key or CHAT_API_KEY)".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Session directory, defaulting to ~/.groupchat
    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.session_dir {
            return Ok(dir.clone());
        }
        let base_dirs = directories::BaseDirs::new().ok_or_else(|| {
            ClientError::ConfigError("Failed to get home directory".to_string())
        })?;
        Ok(base_dirs.home_dir().join(".groupchat"))
    }

    /// Path of the session database; the directory is created if missing
    pub fn session_db_path(&self) -> Result<PathBuf> {
        let dir = self.session_dir()?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(SESSION_DB_FILE))
    }
}

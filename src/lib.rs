/// Group Chat Client Library
/// Community chat rooms over a hosted backend, with admin-approved membership

pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod ids;
pub mod membership;
pub mod models;
pub mod session;
pub mod sync;

pub use app::{App, AppEvent, Screen};
pub use backend::{Backend, MemoryBackend, RestBackend};
pub use config::Config;
pub use error::{ClientError, Result};
pub use session::SessionStore;

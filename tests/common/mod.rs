//! Common test utilities and helpers for integration tests
//! Provides app setup over the in-process backend and event pumping helpers

#![allow(dead_code)]

use group_chat_client::error::Result;
use group_chat_client::{App, MemoryBackend, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const HISTORY_LIMIT: usize = 100;

/// Shared backend plus a temporary directory for session databases
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub temp_dir: TempDir,
}

impl TestContext {
    /// Backend seeded with the community group and its short history
    pub fn with_demo_data() -> Self {
        Self::with_backend(MemoryBackend::with_demo_data())
    }

    /// Backend with no groups at all
    pub fn empty() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    fn with_backend(backend: MemoryBackend) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        TestContext {
            backend: Arc::new(backend),
            temp_dir,
        }
    }

    pub fn session_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(format!("{}.db", name))
    }

    /// Open (or reopen) the session database called `name`
    pub fn session(&self, name: &str) -> Result<SessionStore> {
        SessionStore::new(self.session_path(name))
    }

    /// A started app for the device whose session is called `name`
    pub async fn app(&self, name: &str) -> Result<App<MemoryBackend>> {
        let mut app = App::new(Arc::clone(&self.backend), self.session(name)?, HISTORY_LIMIT)?;
        app.start().await;
        Ok(app)
    }

    /// A started app signed in as the administrator
    pub async fn admin_app(&self, name: &str) -> Result<App<MemoryBackend>> {
        let mut app = self.app(name).await?;
        app.login_as_admin().await;
        Ok(app)
    }
}

/// Feed background events to the app until none arrives for `quiet`.
/// Returns how many events were handled.
pub async fn drain_events(app: &mut App<MemoryBackend>, quiet: Duration) -> usize {
    let mut handled = 0;
    while let Ok(Some(event)) = tokio::time::timeout(quiet, app.next_event()).await {
        app.handle_event(event).await;
        handled += 1;
    }
    handled
}

/// Drain with a short quiet period suited to the in-process backend
pub async fn settle(app: &mut App<MemoryBackend>) -> usize {
    drain_events(app, Duration::from_millis(200)).await
}

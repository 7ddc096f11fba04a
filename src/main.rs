/// Group Chat Client - Main entry point
///
/// A command-line client for community group chat rooms
use anyhow::Context;
use group_chat_client::{cli, App, Backend, Config, MemoryBackend, RestBackend, SessionStore};
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Initialize logger with appropriate level based on verbose flag
    let log_level = if config.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    config.validate().context("Invalid configuration")?;

    info!("Starting group chat client");

    let db_path = config.session_db_path()?;
    info!("Session database: {}", db_path.display());
    let session = SessionStore::new(&db_path)
        .with_context(|| format!("Failed to open session at {}", db_path.display()))?;

    if config.offline {
        info!("Offline mode: using the in-process demo backend");
        run(Arc::new(MemoryBackend::with_demo_data()), session, &config).await
    } else {
        info!("Backend: {}", config.backend_url);
        let backend = RestBackend::new(&config.backend_url, &config.api_key)
            .context("Failed to set up the backend client")?;
        run(Arc::new(backend), session, &config).await
    }
}

async fn run<B: Backend>(backend: Arc<B>, session: SessionStore, config: &Config) -> anyhow::Result<()> {
    let mut app = App::new(backend, session, config.history_limit)
        .context("Failed to restore the session")?;

    app.start().await;

    // Run the client control loop
    cli::run_client_loop(&mut app).await?;

    Ok(())
}

use anyhow::{Context, Result};
use pinweather_core::{
    CityStore, Config, SeedOutcome, SeedSource, WeatherSession, client_from_config,
    ensure_seeded,
};
use std::sync::OnceLock;

/// Everything a command needs, built from config.
///
/// The store is opened up front; the weather client and session are only
/// built for commands that talk to the weather service.
pub struct App {
    pub config: Config,
    pub store: CityStore,
    session: OnceLock<WeatherSession>,
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        let db_path = config.database_file_path()?;
        let path = db_path.clone();
        let store = tokio::task::spawn_blocking(move || CityStore::open(&path))
            .await
            .context("City database task failed")?
            .with_context(|| format!("Failed to open city database: {}", db_path.display()))?;
        tracing::debug!(path = %db_path.display(), "opened city database");

        Ok(Self { config, store, session: OnceLock::new() })
    }

    /// The weather session, built on first use. Fails without an API key.
    pub fn session(&self) -> Result<&WeatherSession> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }
        let client = client_from_config(&self.config)?;
        Ok(self.session.get_or_init(|| WeatherSession::new(self.store.clone(), client)))
    }

    /// Seed an empty store from the configured list. Never fails startup.
    pub async fn seed(&self) -> SeedOutcome {
        match SeedSource::from_config(&self.config) {
            Ok(source) => ensure_seeded(&self.store, &source).await,
            Err(err) => {
                tracing::error!(error = %err, "could not build seed client");
                SeedOutcome::Failed
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Some(session) = self.session.get() {
            session.shutdown().await;
        }
    }
}

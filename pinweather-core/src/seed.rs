//! One-time population of an empty city store from a remote list.

use reqwest::Client;
use std::{collections::HashSet, time::Duration};

use crate::{
    config::Config,
    error::FetchError,
    model::{CitySeed, NewCity},
    store::CityStore,
};

const ENDPOINT: &str = "seed";

#[derive(Debug, Clone)]
pub struct SeedSource {
    url: Option<String>,
    http: Client,
}

/// What [`ensure_seeded`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The store already held cities.
    AlreadyPopulated,
    /// No seed URL configured.
    Disabled,
    /// Rows inserted.
    Seeded(usize),
    /// Fetching or storing failed; logged and otherwise ignored.
    Failed,
}

impl SeedSource {
    pub fn new(url: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build().map_err(FetchError::Client)?;
        let url = url.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string);
        Ok(Self { url, http })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(config.seed_url(), config.request_timeout())
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub async fn fetch(&self) -> Result<Option<CitySeed>, FetchError> {
        let Some(url) = &self.url else {
            return Ok(None);
        };

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint: ENDPOINT, source })?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: ENDPOINT,
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { endpoint: ENDPOINT, source })?;

        if body.trim().is_empty() {
            return Err(FetchError::Body { endpoint: ENDPOINT, message: "empty body".to_string() });
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| FetchError::Body { endpoint: ENDPOINT, message: e.to_string() })
    }
}

/// Seed cities from `source` if the store is empty. Never fails.
pub async fn ensure_seeded(store: &CityStore, source: &SeedSource) -> SeedOutcome {
    match store.blocking(|s| s.count()).await {
        Ok(0) => {}
        Ok(_) => return SeedOutcome::AlreadyPopulated,
        Err(err) => {
            tracing::error!(error = %err, "could not count cities, skipping seed");
            return SeedOutcome::Failed;
        }
    }

    if !source.is_enabled() {
        tracing::warn!("no seed URL configured, skipping seed");
        return SeedOutcome::Disabled;
    }

    let seed = match source.fetch().await {
        Ok(Some(seed)) => seed,
        Ok(None) => return SeedOutcome::Disabled,
        Err(err) => {
            tracing::error!(error = %err, "seeding failed");
            return SeedOutcome::Failed;
        }
    };

    let cities = seed_rows(&seed);
    match store.blocking(move |s| s.insert_all(&cities)).await {
        Ok(inserted) => {
            tracing::info!(version = seed.version, inserted, "seeded cities");
            SeedOutcome::Seeded(inserted)
        }
        Err(err) => {
            tracing::error!(error = %err, "storing seed cities failed");
            SeedOutcome::Failed
        }
    }
}

/// Trimmed, non-blank, case-insensitively unique rows. Pinned entries get
/// consecutive sort orders in list order.
fn seed_rows(seed: &CitySeed) -> Vec<NewCity> {
    let mut seen = HashSet::new();
    let mut next_order = 0;

    seed.cities
        .iter()
        .filter_map(|item| {
            let name = item.name.trim();
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                return None;
            }
            let pinned = item.pinned.unwrap_or(false);
            let sort_order = if pinned {
                next_order += 1;
                next_order - 1
            } else {
                0
            };
            Some(NewCity { pinned, sort_order, ..NewCity::named(name) })
        })
        .collect()
}

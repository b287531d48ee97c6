//! Bounded-concurrency weather preload for a list of displayed cities.
//!
//! Results accumulate in a per-batch buffer and are merged into the published
//! [`PreloadSnapshot`] in one step once every fetch in the batch has finished.

use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{
    sync::{Semaphore, watch},
    task::JoinSet,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{model::WeatherSnapshot, naming, provider::WeatherClient};

/// Maximum number of lookups in flight at once.
pub const PRELOAD_CONCURRENCY: usize = 4;

/// Published caches keyed by the trimmed query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadSnapshot {
    pub display_names: HashMap<String, String>,
    pub weather: HashMap<String, WeatherSnapshot>,
}

impl PreloadSnapshot {
    /// A name is cached only when both maps hold it.
    pub fn is_cached(&self, name: &str) -> bool {
        self.display_names.contains_key(name) && self.weather.contains_key(name)
    }

    fn merge(&mut self, batch: Batch) {
        for (name, (label, weather)) in batch.fetched {
            self.display_names.insert(name.clone(), label);
            self.weather.insert(name, weather);
        }
        for name in batch.failed {
            self.display_names.entry(name.clone()).or_insert(name);
        }
    }
}

/// Counts for one `preload` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub requested: usize,
    pub fetched: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Batch {
    fetched: HashMap<String, (String, WeatherSnapshot)>,
    failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Preloader {
    client: Arc<dyn WeatherClient>,
    published: Arc<watch::Sender<PreloadSnapshot>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Preloader {
    pub fn new(client: Arc<dyn WeatherClient>) -> Self {
        let (published, _) = watch::channel(PreloadSnapshot::default());
        Self {
            client,
            published: Arc::new(published),
            permits: Arc::new(Semaphore::new(PRELOAD_CONCURRENCY)),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PreloadSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> PreloadSnapshot {
        self.published.borrow().clone()
    }

    /// Fetch weather for every name not yet cached, then publish the merged
    /// caches. At most [`PRELOAD_CONCURRENCY`] lookups run at once across all
    /// batches sharing this preloader.
    pub async fn preload<I, S>(&self, names: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = {
            let current = self.published.borrow();
            pending_names(names, &current)
        };

        if targets.is_empty() {
            return PreloadReport::default();
        }

        let mut report = PreloadReport { requested: targets.len(), ..PreloadReport::default() };
        tracing::debug!(count = targets.len(), "preloading weather");

        let batch = Arc::new(Mutex::new(Batch::default()));
        let mut tasks = JoinSet::new();

        for name in targets {
            let client = Arc::clone(&self.client);
            let permits = Arc::clone(&self.permits);
            let batch = Arc::clone(&batch);
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = client.fetch_current(&name) => result,
                };

                match result {
                    Ok(current) => {
                        let label = naming::display_label(&current);
                        batch.lock().fetched.insert(name, (label, current.weather));
                    }
                    Err(err) => {
                        tracing::debug!(city = %name, error = %err, "preload failed");
                        batch.lock().failed.push(name);
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    report.cancelled = true;
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Err(err)) if err.is_panic() => {
                        tracing::error!(error = %err, "preload task panicked");
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        if report.cancelled || self.cancel.is_cancelled() {
            report.cancelled = true;
            tracing::debug!("preload cancelled, nothing published");
            return report;
        }

        let batch = std::mem::take(&mut *batch.lock());
        report.fetched = batch.fetched.len();
        report.failed = batch.failed.len();

        self.published.send_modify(|snapshot| snapshot.merge(batch));
        tracing::debug!(fetched = report.fetched, failed = report.failed, "preload published");

        report
    }

    /// Run [`Preloader::preload`] in the background.
    pub fn spawn(&self, names: Vec<String>) {
        let this = self.clone();
        self.tracker.spawn(async move {
            this.preload(names).await;
        });
    }

    /// Cancel all outstanding preload work and wait for it to stop. The
    /// preloader publishes nothing afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Trimmed, non-empty, de-duplicated names (first occurrence wins) that are
/// missing from either cache.
fn pending_names<I, S>(names: I, current: &PreloadSnapshot) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter_map(|n| {
            let trimmed = n.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .filter(|n| seen.insert(n.clone()))
        .filter(|n| !current.is_cached(n))
        .collect()
}

//! State container for a front-end.
//!
//! Observable values are exposed as `watch` channels: the query text, the
//! current search result, the error message, and the pinned-city list. The
//! preloader's caches are published the same way.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};

use crate::{
    error::StoreResult,
    model::{City, CurrentWeather},
    preload::{PreloadReport, PreloadSnapshot, Preloader},
    provider::WeatherClient,
    reconcile::{CityReconciler, PinOutcome},
    store::CityStore,
};

#[derive(Debug, Clone)]
pub struct WeatherSession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    client: Arc<dyn WeatherClient>,
    reconciler: CityReconciler,
    preloader: Preloader,
    query: watch::Sender<String>,
    current: watch::Sender<Option<Arc<CurrentWeather>>>,
    error: watch::Sender<Option<String>>,
    pinned: watch::Sender<Vec<City>>,
    search_task: Mutex<Option<AbortHandle>>,
    search_generation: AtomicU64,
}

impl WeatherSession {
    pub fn new(store: CityStore, client: Arc<dyn WeatherClient>) -> Self {
        Self {
            inner: Arc::new(Inner {
                reconciler: CityReconciler::new(store, Arc::clone(&client)),
                preloader: Preloader::new(Arc::clone(&client)),
                client,
                query: watch::channel(String::new()).0,
                current: watch::channel(None).0,
                error: watch::channel(None).0,
                pinned: watch::channel(Vec::new()).0,
                search_task: Mutex::new(None),
                search_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn reconciler(&self) -> &CityReconciler {
        &self.inner.reconciler
    }

    pub fn preloader(&self) -> &Preloader {
        &self.inner.preloader
    }

    pub fn subscribe_query(&self) -> watch::Receiver<String> {
        self.inner.query.subscribe()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<Arc<CurrentWeather>>> {
        self.inner.current.subscribe()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.error.subscribe()
    }

    pub fn subscribe_pinned(&self) -> watch::Receiver<Vec<City>> {
        self.inner.pinned.subscribe()
    }

    pub fn subscribe_preload(&self) -> watch::Receiver<PreloadSnapshot> {
        self.inner.preloader.subscribe()
    }

    pub fn query(&self) -> String {
        self.inner.query.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<CurrentWeather>> {
        self.inner.current.borrow().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.error.borrow().clone()
    }

    pub fn pinned(&self) -> Vec<City> {
        self.inner.pinned.borrow().clone()
    }

    /// Set the query text. A blank query clears the result and the error.
    pub fn update_query(&self, query: &str) {
        self.inner.query.send_replace(query.to_string());
        if query.trim().is_empty() {
            self.inner.current.send_replace(None);
            self.inner.error.send_replace(None);
        }
    }

    /// Look up the current query in the background, replacing any search
    /// still in flight.
    ///
    /// On failure the error is only published when no earlier result is on
    /// display; a stale result is preferred over an error.
    pub fn search(&self) -> Option<JoinHandle<()>> {
        let query = self.inner.query.borrow().trim().to_string();
        if query.is_empty() {
            return None;
        }

        let generation = self.inner.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);

        let mut slot = self.inner.search_task.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let handle = tokio::spawn(async move {
            inner.error.send_replace(None);
            let result = inner.client.fetch_current(&query).await;

            if inner.search_generation.load(Ordering::SeqCst) != generation {
                return;
            }

            match result {
                Ok(current) => {
                    tracing::debug!(
                        query = %query,
                        name = %current.weather.name,
                        "search succeeded"
                    );
                    inner.current.send_replace(Some(Arc::new(current)));
                    inner.error.send_replace(None);
                }
                Err(err) => {
                    tracing::warn!(query = %query, error = %err, "search failed");
                    let message = inner
                        .current
                        .borrow()
                        .is_none()
                        .then(|| err.user_message());
                    inner.error.send_replace(message);
                }
            }
        });

        *slot = Some(handle.abort_handle());
        Some(handle)
    }

    /// Reload the pinned list from the store and publish it.
    pub async fn refresh_pinned(&self) -> StoreResult<Vec<City>> {
        let pinned = self.inner.reconciler.store().blocking(|store| store.list_pinned()).await?;
        self.inner.pinned.send_replace(pinned.clone());
        Ok(pinned)
    }

    pub async fn toggle_pin_by_name(&self, input: &str) -> StoreResult<PinOutcome> {
        let outcome = self.inner.reconciler.toggle_pin_by_name(input).await?;
        if !matches!(outcome, PinOutcome::Ignored | PinOutcome::Unresolved) {
            self.refresh_pinned().await?;
        }
        Ok(outcome)
    }

    pub async fn toggle_pin(&self, city: &City) -> StoreResult<()> {
        self.inner.reconciler.toggle_pin(city).await?;
        self.refresh_pinned().await?;
        Ok(())
    }

    /// Commit the order of a reordered pinned list.
    pub async fn persist_pinned_order(&self, ordered: &[City]) -> StoreResult<()> {
        self.inner.reconciler.persist_order(ordered).await?;
        self.refresh_pinned().await?;
        Ok(())
    }

    /// Preload weather for the currently published pinned cities.
    pub async fn preload_pinned(&self) -> PreloadReport {
        let names: Vec<String> = self.pinned().into_iter().map(|c| c.name).collect();
        self.inner.preloader.preload(names).await
    }

    /// Preload weather for the given cities without waiting for it.
    pub fn spawn_preload(&self, cities: &[City]) {
        self.inner.preloader.spawn(cities.iter().map(|c| c.name.clone()).collect());
    }

    /// Abort the in-flight search and cancel all preload work.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.search_task.lock().take() {
            task.abort();
        }
        self.inner.preloader.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClient, geo};
    use std::time::Duration;

    fn session(client: FakeClient) -> (WeatherSession, Arc<FakeClient>) {
        let client = Arc::new(client);
        let store = CityStore::in_memory().unwrap();
        (WeatherSession::new(store, client.clone()), client)
    }

    #[tokio::test]
    async fn blank_query_does_not_search() {
        let (session, client) = session(FakeClient::new());
        session.update_query("   ");

        assert!(session.search().is_none());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn search_publishes_result() {
        let (session, _client) = session(
            FakeClient::new().city("Seoul", "Seoul", Some(geo("Seoul", Some("서울"), Some("KR")))),
        );

        session.update_query(" Seoul ");
        session.search().unwrap().await.unwrap();

        let current = session.current().unwrap();
        assert_eq!(current.weather.name, "Seoul");
        assert_eq!(current.geo.as_ref().unwrap().country.as_deref(), Some("KR"));
        assert_eq!(session.error(), None);
    }

    #[tokio::test]
    async fn error_shown_only_without_previous_result() {
        let (session, _client) = session(FakeClient::new().city("Seoul", "Seoul", None));

        session.update_query("Atlantis");
        session.search().unwrap().await.unwrap();
        assert_eq!(session.error().as_deref(), Some("City not found."));

        session.update_query("Seoul");
        session.search().unwrap().await.unwrap();
        assert_eq!(session.error(), None);

        session.update_query("Atlantis");
        session.search().unwrap().await.unwrap();
        assert_eq!(session.error(), None);
        assert_eq!(session.current().unwrap().weather.name, "Seoul");
    }

    #[tokio::test]
    async fn clearing_query_clears_result() {
        let (session, _client) = session(FakeClient::new().city("Seoul", "Seoul", None));
        session.update_query("Seoul");
        session.search().unwrap().await.unwrap();

        let mut errors = session.subscribe_error();
        session.update_query("");

        assert_eq!(*session.subscribe_query().borrow(), "");
        assert!(errors.has_changed().unwrap());
        assert!(errors.borrow_and_update().is_none());
        assert!(session.current().is_none());
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn newer_search_wins() {
        let (session, _client) = session(
            FakeClient::with_delay(Duration::from_millis(20))
                .city("Seoul", "Seoul", None)
                .city("Tokyo", "Tokyo", None),
        );

        session.update_query("Seoul");
        let first = session.search().unwrap();
        session.update_query("Tokyo");
        let second = session.search().unwrap();

        second.await.unwrap();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(session.current().unwrap().weather.name, "Tokyo");
    }

    #[tokio::test]
    async fn pin_toggle_refreshes_pinned_list() {
        let (session, _client) = session(
            FakeClient::new().city("서울", "Seoul", Some(geo("Seoul", Some("서울"), Some("KR")))),
        );
        let mut rx = session.subscribe_pinned();

        session.toggle_pin_by_name("서울").await.unwrap();

        assert!(rx.has_changed().unwrap());
        let pinned = rx.borrow_and_update().clone();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].label(), "서울");

        session.toggle_pin(&pinned[0]).await.unwrap();
        assert!(session.pinned().is_empty());
    }

    #[tokio::test]
    async fn preload_pinned_uses_published_list() {
        let (session, client) = session(
            FakeClient::new()
                .city("Seoul", "Seoul", Some(geo("Seoul", Some("서울"), Some("KR"))))
                .city("Busan", "Busan", Some(geo("Busan", Some("부산"), Some("KR")))),
        );
        session.toggle_pin_by_name("Seoul").await.unwrap();
        session.toggle_pin_by_name("Busan").await.unwrap();

        let mut reversed = session.pinned();
        reversed.reverse();
        session.persist_pinned_order(&reversed).await.unwrap();
        let names: Vec<_> = session.pinned().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Busan", "Seoul"]);

        let report = session.preload_pinned().await;
        assert_eq!(report.fetched, 2);
        assert_eq!(client.call_count(), 4);

        let snap = session.subscribe_preload().borrow().clone();
        assert_eq!(snap.display_names["Busan"], "부산, 대한민국");
    }

    #[tokio::test]
    async fn spawned_preload_publishes() {
        let (session, _client) = session(FakeClient::new().city("Seoul", "Seoul", None));
        session.toggle_pin_by_name("Seoul").await.unwrap();
        let mut rx = session.subscribe_preload();

        session.spawn_preload(&session.pinned());
        rx.changed().await.unwrap();

        assert!(rx.borrow().is_cached("Seoul"));
        session.shutdown().await;
    }
}

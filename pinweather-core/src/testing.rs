//! In-process fakes for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use crate::{
    error::FetchError,
    model::{CurrentWeather, GeoResult, WeatherSnapshot},
    provider::WeatherClient,
};

pub fn snapshot(name: &str, temp: f64) -> WeatherSnapshot {
    WeatherSnapshot {
        name: name.to_string(),
        temperature_c: temp,
        condition: "맑음".to_string(),
        icon: Some("01d".to_string()),
        country: None,
        observed_at: Utc::now(),
    }
}

pub fn geo(name: &str, ko: Option<&str>, country: Option<&str>) -> GeoResult {
    GeoResult {
        name: name.to_string(),
        lat: 37.5665,
        lon: 126.978,
        country: country.map(str::to_string),
        state: None,
        local_names: ko.map(|k| HashMap::from([("ko".to_string(), k.to_string())])),
    }
}

/// Scripted weather client. Unknown names fail with a 404.
#[derive(Debug, Default)]
pub struct FakeClient {
    responses: Mutex<HashMap<String, CurrentWeather>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn respond(self, query: &str, current: CurrentWeather) -> Self {
        self.responses.lock().insert(query.to_string(), current);
        self
    }

    /// Succeed for `query` with a canonical name and optional geo match.
    pub fn city(self, query: &str, canonical: &str, geo: Option<GeoResult>) -> Self {
        self.respond(query, CurrentWeather { weather: snapshot(canonical, 12.5), geo })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherClient for FakeClient {
    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, FetchError> {
        self.calls.lock().push(city.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.responses.lock().get(city).cloned().ok_or(FetchError::Status {
            endpoint: "weather",
            status: 404,
            body: r#"{"cod":"404","message":"city not found"}"#.to_string(),
        });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    config::{DEFAULT_BASE_URL, DEFAULT_LANGUAGE, DEFAULT_TIMEOUT_SECS, DEFAULT_UNITS},
    error::FetchError,
    model::{CurrentWeather, GeoResult, WeatherSnapshot},
};

use super::WeatherClient;

const GEOCODE_PATH: &str = "geo/1.0/direct";
const WEATHER_PATH: &str = "data/2.5/weather";

/// OpenWeather client: direct geocoding followed by current weather by coordinates.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    language: String,
    units: String,
    http: Client,
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClientBuilder {
    api_key: String,
    base_url: String,
    language: String,
    units: String,
    timeout: Duration,
}

impl OpenWeatherClientBuilder {
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenWeatherClient, FetchError> {
        let http = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(OpenWeatherClient {
            api_key: self.api_key,
            base_url: self.base_url,
            language: self.language,
            units: self.units,
            http,
        })
    }
}

impl OpenWeatherClient {
    pub fn builder(api_key: impl Into<String>) -> OpenWeatherClientBuilder {
        OpenWeatherClientBuilder {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            units: DEFAULT_UNITS.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Direct geocoding, at most `limit` matches.
    pub async fn geocode(&self, city: &str, limit: u8) -> Result<Vec<GeoResult>, FetchError> {
        self.get_json(
            "geocode",
            GEOCODE_PATH,
            &[
                ("q", city.to_string()),
                ("limit", limit.to_string()),
                ("appid", self.api_key.clone()),
            ],
        )
        .await
    }

    pub async fn current_by_coord(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<WeatherSnapshot, FetchError> {
        let parsed: OwCurrentResponse = self
            .get_json(
                "weather",
                WEATHER_PATH,
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("appid", self.api_key.clone()),
                    ("units", self.units.clone()),
                    ("lang", self.language.clone()),
                ],
            )
            .await?;

        Ok(parsed.into_snapshot())
    }

    pub async fn current_by_name(&self, city: &str) -> Result<WeatherSnapshot, FetchError> {
        let parsed: OwCurrentResponse = self
            .get_json(
                "weather",
                WEATHER_PATH,
                &[
                    ("q", city.to_string()),
                    ("appid", self.api_key.clone()),
                    ("units", self.units.clone()),
                    ("lang", self.language.clone()),
                ],
            )
            .await?;

        Ok(parsed.into_snapshot())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);

        let res = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        if body.trim().is_empty() {
            return Err(FetchError::Body { endpoint, message: "empty body".to_string() });
        }

        serde_json::from_str(&body)
            .map_err(|e| FetchError::Body { endpoint, message: e.to_string() })
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, FetchError> {
        let geo = self.geocode(city, 1).await?.into_iter().next();

        let weather = match &geo {
            Some(g) => self.current_by_coord(g.lat, g.lon).await?,
            None => {
                tracing::debug!(city, "no geocoding match, falling back to name lookup");
                self.current_by_name(city).await?
            }
        };

        Ok(CurrentWeather { weather, geo })
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    #[serde(default)]
    dt: Option<i64>,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    #[serde(default)]
    sys: Option<OwSys>,
}

impl OwCurrentResponse {
    fn into_snapshot(self) -> WeatherSnapshot {
        let observed_at = self.dt.and_then(unix_to_utc).unwrap_or_else(Utc::now);

        let (condition, icon) = match self.weather.into_iter().next() {
            Some(w) => (w.description, w.icon),
            None => ("Unknown".to_string(), None),
        };

        WeatherSnapshot {
            name: self.name,
            temperature_c: self.main.temp,
            condition,
            icon,
            country: self.sys.and_then(|s| s.country),
            observed_at,
        }
    }
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_weather_body() {
        let parsed: OwCurrentResponse =
            serde_json::from_str(r#"{"name":"Seoul","main":{"temp":21.5},"weather":[]}"#)
                .expect("valid json");
        let snap = parsed.into_snapshot();

        assert_eq!(snap.name, "Seoul");
        assert_eq!(snap.condition, "Unknown");
        assert_eq!(snap.country, None);
    }

    #[test]
    fn parses_full_weather_body() {
        let body = r#"{
            "name": "Seoul",
            "dt": 1700000000,
            "main": {"temp": 3.2, "humidity": 40},
            "weather": [{"description": "맑음", "icon": "01d"}],
            "sys": {"country": "KR"}
        }"#;
        let snap =
            serde_json::from_str::<OwCurrentResponse>(body).expect("valid json").into_snapshot();

        assert_eq!(snap.condition, "맑음");
        assert_eq!(snap.icon.as_deref(), Some("01d"));
        assert_eq!(snap.country.as_deref(), Some("KR"));
        assert_eq!(snap.observed_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "날".repeat(300);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}

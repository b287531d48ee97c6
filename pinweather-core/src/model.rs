use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A persisted city record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    /// Canonical name as returned by the weather provider. Unique, case-insensitive.
    pub name: String,
    pub pinned: bool,
    /// Display order among pinned cities.
    pub sort_order: i64,
    pub localized_name: Option<String>,
    /// ISO 3166 country code, e.g. "KR".
    pub country: Option<String>,
}

impl City {
    /// Name to show the user: the localized name when known.
    pub fn label(&self) -> &str {
        self.localized_name.as_deref().unwrap_or(&self.name)
    }
}

/// Payload for inserting a city; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCity {
    pub name: String,
    pub pinned: bool,
    pub sort_order: i64,
    pub localized_name: Option<String>,
    pub country: Option<String>,
}

impl NewCity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pinned: false,
            sort_order: 0,
            localized_name: None,
            country: None,
        }
    }
}

/// Current conditions for one place. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub name: String,
    pub temperature_c: f64,
    pub condition: String,
    pub icon: Option<String>,
    pub country: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// A direct-geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResult {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub local_names: Option<HashMap<String, String>>,
}

impl GeoResult {
    pub fn local_name(&self, lang: &str) -> Option<&str> {
        self.local_names.as_ref()?.get(lang).map(String::as_str)
    }
}

/// Result of a weather lookup: the weather plus the geocoding match, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub weather: WeatherSnapshot,
    pub geo: Option<GeoResult>,
}

/// Remote city list used to populate an empty store on first launch.
#[derive(Debug, Clone, Deserialize)]
pub struct CitySeed {
    pub version: i64,
    pub cities: Vec<CitySeedItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitySeedItem {
    pub name: String,
    #[serde(default)]
    pub pinned: Option<bool>,
}

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{Config, error::FetchError, model::CurrentWeather};

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// Looks up current weather for a free-text city name.
///
/// A missing geocoding match is not an error: implementations fall back to a
/// name lookup and return `geo: None`.
#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, FetchError>;
}

/// Construct the OpenWeather client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherClient>> {
    let api_key = config.require_api_key()?;
    let client = OpenWeatherClient::builder(api_key)
        .base_url(&config.base_url)
        .language(&config.language)
        .units(&config.units)
        .timeout(config.request_timeout())
        .build()?;

    Ok(Arc::new(client))
}

//! Core library for the `pinweather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The weather client contract and its OpenWeather implementation
//! - The SQLite city store and pin reconciliation
//! - Bounded-concurrency weather preload
//! - A session state container for front-ends
//!
//! It is used by `pinweather-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod model;
pub mod naming;
pub mod preload;
pub mod provider;
pub mod reconcile;
pub mod seed;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{FetchError, StoreError};
pub use model::{City, CurrentWeather, GeoResult, NewCity, WeatherSnapshot};
pub use preload::{PRELOAD_CONCURRENCY, PreloadReport, PreloadSnapshot, Preloader};
pub use provider::{OpenWeatherClient, WeatherClient, client_from_config};
pub use reconcile::{CityReconciler, PinOutcome};
pub use seed::{SeedOutcome, SeedSource, ensure_seeded};
pub use session::WeatherSession;
pub use store::{CityStore, InsertOutcome};

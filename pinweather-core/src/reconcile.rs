//! Pin toggling by free-text city name.
//!
//! A name typed by the user may be a canonical name, a localized name, or
//! something the provider resolves to a canonical name we already hold. The
//! reconciler finds or creates the matching record and flips its pin.

use std::sync::Arc;

use crate::{
    error::StoreResult,
    model::{City, CurrentWeather, NewCity},
    naming,
    provider::WeatherClient,
    store::{CityStore, InsertOutcome},
};

/// What a pin toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Blank input.
    Ignored,
    /// A local record matched the input directly and its pin was flipped.
    Toggled { id: i64, pinned: bool },
    /// The provider resolved the input to an existing record, which is now pinned.
    Adopted { id: i64 },
    /// A new pinned record was created.
    Created { id: i64 },
    /// The lookup failed; nothing was written.
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct CityReconciler {
    store: CityStore,
    client: Arc<dyn WeatherClient>,
}

impl CityReconciler {
    pub fn new(store: CityStore, client: Arc<dyn WeatherClient>) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &CityStore {
        &self.store
    }

    /// Toggle the pin of the city named `input`, creating it if unknown.
    ///
    /// Lookup failures are logged and reported as [`PinOutcome::Unresolved`];
    /// only local storage failures are returned as errors.
    pub async fn toggle_pin_by_name(&self, input: &str) -> StoreResult<PinOutcome> {
        let key = input.trim().to_string();
        if key.is_empty() {
            return Ok(PinOutcome::Ignored);
        }

        let local_key = key.clone();
        let toggled = self.store.blocking(move |store| toggle_local(store, &local_key)).await?;
        if let Some(outcome) = toggled {
            return Ok(outcome);
        }

        let current = match self.client.fetch_current(&key).await {
            Ok(current) => current,
            Err(err) => {
                tracing::warn!(
                    query = %key,
                    error = %err,
                    "could not resolve city, pin not changed"
                );
                return Ok(PinOutcome::Unresolved);
            }
        };

        let canonical = current.weather.name.trim().to_string();
        if canonical.is_empty() {
            tracing::warn!(query = %key, "weather response had no city name");
            return Ok(PinOutcome::Unresolved);
        }

        let metadata = Metadata::from_lookup(&current);
        self.store.blocking(move |store| pin_resolved(store, &canonical, &metadata)).await
    }

    /// Flip the pin of a record the caller already holds.
    pub async fn toggle_pin(&self, city: &City) -> StoreResult<()> {
        let (id, pinned) = (city.id, !city.pinned);
        self.store.blocking(move |store| store.set_pinned(id, pinned)).await
    }

    /// Commit a manual reorder: `ordered[i]` gets sort order `i`.
    pub async fn persist_order(&self, ordered: &[City]) -> StoreResult<()> {
        let ids: Vec<i64> = ordered.iter().map(|c| c.id).collect();
        self.store.blocking(move |store| store.reorder(&ids)).await
    }
}

/// Flip the pin of a record whose canonical or localized name is `key`.
fn toggle_local(store: &CityStore, key: &str) -> StoreResult<Option<PinOutcome>> {
    let Some(existing) = store.find_by_any_name(key)? else {
        return Ok(None);
    };
    let pinned = !existing.pinned;
    store.set_pinned(existing.id, pinned)?;
    tracing::debug!(id = existing.id, name = %existing.name, pinned, "toggled pin");
    Ok(Some(PinOutcome::Toggled { id: existing.id, pinned }))
}

/// Pin the record for a provider-resolved canonical name, creating it if absent.
fn pin_resolved(
    store: &CityStore,
    canonical: &str,
    metadata: &Metadata,
) -> StoreResult<PinOutcome> {
    if let Some(existing) = store.find_by_name(canonical)? {
        return adopt(store, &existing, metadata);
    }

    let new_city = NewCity {
        name: canonical.to_string(),
        pinned: true,
        sort_order: store.max_sort_order()? + 1,
        localized_name: Some(metadata.localized_name.clone()),
        country: metadata.country.clone(),
    };
    insert_or_adopt(store, &new_city, metadata)
}

/// Insert `new_city`; if a record with its name appeared since the lookup,
/// pin that one instead.
fn insert_or_adopt(
    store: &CityStore,
    new_city: &NewCity,
    metadata: &Metadata,
) -> StoreResult<PinOutcome> {
    match store.insert(new_city)? {
        InsertOutcome::Inserted(id) => {
            tracing::info!(id, name = %new_city.name, "pinned new city");
            Ok(PinOutcome::Created { id })
        }
        InsertOutcome::Duplicate => match store.find_by_name(&new_city.name)? {
            Some(existing) => adopt(store, &existing, metadata),
            None => {
                tracing::warn!(name = %new_city.name, "insert conflicted but no record found");
                Ok(PinOutcome::Unresolved)
            }
        },
    }
}

fn adopt(store: &CityStore, existing: &City, metadata: &Metadata) -> StoreResult<PinOutcome> {
    if !existing.pinned {
        store.set_pinned(existing.id, true)?;
    }
    if existing.localized_name.is_none() || existing.country.is_none() {
        store.backfill_metadata(
            existing.id,
            Some(&metadata.localized_name),
            metadata.country.as_deref(),
        )?;
    }
    tracing::debug!(id = existing.id, name = %existing.name, "pinned existing city");
    Ok(PinOutcome::Adopted { id: existing.id })
}

struct Metadata {
    localized_name: String,
    country: Option<String>,
}

impl Metadata {
    fn from_lookup(current: &CurrentWeather) -> Self {
        Self {
            localized_name: naming::localized_name(current),
            country: naming::country_code(current),
        }
    }
}

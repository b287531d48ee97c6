use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use pinweather_core::{City, Config, PinOutcome, SeedOutcome, error::StoreResult};

use crate::{app::App, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "pinweather", version, about = "Weather lookup with pinned cities")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and optional seed list URL.
    Configure {
        /// Skip the prompt and use this key.
        #[arg(long)]
        api_key: Option<String>,

        /// City list fetched once into an empty database.
        #[arg(long)]
        seed_url: Option<String>,
    },

    /// Show current weather for a city.
    Show {
        /// City name, in any language the provider understands.
        city: String,
    },

    /// Pin a city, or unpin it if already pinned.
    Pin {
        city: String,
    },

    /// List pinned cities with current weather.
    List,

    /// Reorder pinned cities. Unlisted pinned cities keep their relative order after these.
    Reorder {
        #[arg(required = true)]
        cities: Vec<String>,
    },

    /// Search the local city database.
    Cities {
        /// Partial name, canonical or localized.
        filter: Option<String>,
    },

    /// Populate an empty database from the configured seed URL.
    Seed,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { api_key, seed_url } => configure(api_key, seed_url),
            command => execute(Config::load()?.with_env_overrides(), command).await,
        }
    }
}

/// Open the app, seed an empty store, then run `command`.
async fn execute(config: Config, command: Command) -> Result<()> {
    let app = App::open(config).await?;
    let seeded = app.seed().await;
    tracing::debug!(?seeded, "startup seed finished");

    let result = run_command(&app, command, seeded).await;
    app.shutdown().await;
    result
}

async fn run_command(app: &App, command: Command, seeded: SeedOutcome) -> Result<()> {
    match command {
        Command::Configure { api_key, seed_url } => configure(api_key, seed_url),
        Command::Show { city } => show(app, &city).await,
        Command::Pin { city } => pin(app, &city).await,
        Command::List => list(app).await,
        Command::Reorder { cities } => reorder(app, cities).await,
        Command::Cities { filter } => cities(app, filter).await,
        Command::Seed => {
            match seeded {
                SeedOutcome::AlreadyPopulated => {
                    println!("Database already has cities; nothing to seed.")
                }
                SeedOutcome::Disabled => println!("No seed URL configured."),
                SeedOutcome::Seeded(n) => println!("Seeded {n} cities."),
                SeedOutcome::Failed => println!("Seeding failed; see log output."),
            }
            Ok(())
        }
    }
}

fn configure(api_key: Option<String>, seed_url: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    let api_key = match api_key {
        Some(key) => key,
        None => Password::new("OpenWeather API key:")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?,
    };
    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }
    config.set_api_key(api_key);

    let seed_url = match seed_url {
        Some(url) => url,
        None => Text::new("Seed list URL (optional):")
            .with_default(config.seed_url().unwrap_or_default())
            .prompt()
            .context("Failed to read seed URL")?,
    };
    config.seed_url = Some(seed_url).filter(|u| !u.trim().is_empty());

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(app: &App, city: &str) -> Result<()> {
    let session = app.session()?;
    session.update_query(city);
    let handle = session.search().ok_or_else(|| anyhow!("City name must not be empty"))?;
    handle.await.context("Search task failed")?;

    match (session.current(), session.error()) {
        (Some(current), _) => println!("{}", render::current(&current)),
        (None, Some(message)) => bail!(message),
        (None, None) => bail!("No result for '{city}'"),
    }
    Ok(())
}

async fn pin(app: &App, city: &str) -> Result<()> {
    match app.session()?.toggle_pin_by_name(city).await? {
        PinOutcome::Ignored => bail!("City name must not be empty"),
        PinOutcome::Toggled { pinned: true, .. } => println!("Pinned {}.", city.trim()),
        PinOutcome::Toggled { pinned: false, .. } => println!("Unpinned {}.", city.trim()),
        PinOutcome::Adopted { id } | PinOutcome::Created { id } => {
            let name = app
                .store
                .blocking(move |store| store.get(id))
                .await?
                .map(|c| c.label().to_string())
                .unwrap_or_else(|| city.trim().to_string());
            println!("Pinned {name}.");
        }
        PinOutcome::Unresolved => bail!("Could not find a city named '{}'", city.trim()),
    }
    Ok(())
}

async fn list(app: &App) -> Result<()> {
    let session = app.session()?;
    let pinned = session.refresh_pinned().await?;
    let report = session.preload_pinned().await;
    tracing::debug!(?report, "preloaded pinned cities");

    let snapshot = session.preloader().snapshot();
    println!("{}", render::pinned_list(&pinned, &snapshot));
    Ok(())
}

async fn reorder(app: &App, names: Vec<String>) -> Result<()> {
    let store = app.store.clone();
    let rows = tokio::task::spawn_blocking(move || -> Result<Vec<City>> {
        let pinned = store.list_pinned()?;
        let ordered = order_pinned(&pinned, &names, |name| store.find_by_any_name(name.trim()))?;
        let ids: Vec<i64> = ordered.iter().map(|c| c.id).collect();
        store.reorder(&ids)?;
        Ok(store.list_pinned()?)
    })
    .await
    .context("Reorder task failed")??;

    println!("{}", render::city_rows(&rows));
    Ok(())
}

/// Put the named cities first, then every other pinned city in its current order.
fn order_pinned(
    pinned: &[City],
    names: &[String],
    lookup: impl Fn(&str) -> StoreResult<Option<City>>,
) -> Result<Vec<City>> {
    let mut ordered: Vec<City> = Vec::with_capacity(pinned.len());

    for name in names {
        let city = lookup(name)?.ok_or_else(|| anyhow!("Unknown city '{name}'"))?;
        if !city.pinned {
            bail!("'{name}' is not pinned");
        }
        if !ordered.iter().any(|c| c.id == city.id) {
            ordered.push(city);
        }
    }

    for city in pinned {
        if !ordered.iter().any(|c| c.id == city.id) {
            ordered.push(city.clone());
        }
    }

    Ok(ordered)
}

async fn cities(app: &App, filter: Option<String>) -> Result<()> {
    let fragment = filter.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
    let rows = app
        .store
        .blocking(move |store| match fragment {
            Some(fragment) => store.search(&fragment),
            None => store.list_all(),
        })
        .await?;
    println!("{}", render::city_rows(&rows));
    Ok(())
}

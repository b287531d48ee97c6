//! Human-friendly output formatting.

use chrono::Local;
use pinweather_core::{City, CurrentWeather, PreloadSnapshot, WeatherSnapshot, naming};

pub fn current(current: &CurrentWeather) -> String {
    let label = naming::display_label(current);
    let mut out = format!("{label}\n{}", weather_line(&current.weather));

    if let Some(geo) = &current.geo {
        out.push_str(&format!("\n  ({:.4}, {:.4})", geo.lat, geo.lon));
    }

    let observed = current.weather.observed_at.with_timezone(&Local);
    out.push_str(&format!("\n  observed {}", observed.format("%Y-%m-%d %H:%M")));
    out
}

fn weather_line(weather: &WeatherSnapshot) -> String {
    format!("  {:.1}°C, {}", weather.temperature_c, weather.condition)
}

pub fn pinned_list(cities: &[City], snapshot: &PreloadSnapshot) -> String {
    if cities.is_empty() {
        return "No pinned cities. Pin one with `pinweather pin <city>`.".to_string();
    }

    cities
        .iter()
        .enumerate()
        .map(|(index, city)| {
            let label = snapshot
                .display_names
                .get(&city.name)
                .cloned()
                .unwrap_or_else(|| city.label().to_string());
            let weather = snapshot
                .weather
                .get(&city.name)
                .map(weather_line)
                .unwrap_or_else(|| "  (weather unavailable)".to_string());
            format!("{:>2}. {label}\n{weather}", index + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn city_rows(cities: &[City]) -> String {
    if cities.is_empty() {
        return "No matching cities.".to_string();
    }

    cities
        .iter()
        .map(|city| {
            let marker = if city.pinned { "*" } else { " " };
            let country = city.country.as_deref().unwrap_or("--");
            match &city.localized_name {
                Some(local) if local != &city.name => {
                    format!("{marker} {} ({local}) [{country}]", city.name)
                }
                _ => format!("{marker} {} [{country}]", city.name),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

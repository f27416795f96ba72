use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{Coordinate, CurrentConditions, DateKey, TemperaturePoint};

use super::{FetchError, WeatherSource, fetch_json};

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com";

/// Open-Meteo forecast and archive endpoints. No API key required.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    forecast_base_url: String,
    archive_base_url: String,
    http: Client,
}

impl Default for OpenMeteoSource {
    fn default() -> Self {
        Self::with_base_urls(DEFAULT_FORECAST_URL, DEFAULT_ARCHIVE_URL)
    }
}

impl OpenMeteoSource {
    pub fn with_base_urls(forecast: impl Into<String>, archive: impl Into<String>) -> Self {
        Self {
            forecast_base_url: trim_base(forecast.into()),
            archive_base_url: trim_base(archive.into()),
            http: Client::new(),
        }
    }

    fn forecast_url(&self) -> String {
        format!("{}/v1/forecast", self.forecast_base_url)
    }

    fn archive_url(&self) -> String {
        format!("{}/v1/archive", self.archive_base_url)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn coordinate_query(at: Coordinate) -> [(&'static str, String); 2] {
    [("latitude", at.latitude.to_string()), ("longitude", at.longitude.to_string())]
}

#[derive(Debug, Deserialize)]
struct OmCurrentWeather {
    temperature: f64,
    windspeed: f64,
    winddirection: f64,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    current_weather: OmCurrentWeather,
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    #[allow(dead_code)]
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OmArchiveResponse {
    hourly: OmHourly,
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn current_conditions(&self, at: Coordinate) -> Result<CurrentConditions, FetchError> {
        let mut query = coordinate_query(at).to_vec();
        query.push(("current_weather", "true".to_string()));

        tracing::debug!(%at, "fetching current conditions");
        let parsed: OmForecastResponse = fetch_json(&self.http, &self.forecast_url(), &query).await?;

        let cw = parsed.current_weather;
        Ok(CurrentConditions {
            temperature_celsius: cw.temperature,
            wind_speed_kph: cw.windspeed,
            wind_direction_deg: cw.winddirection,
        })
    }

    async fn historical_temperature(
        &self,
        at: Coordinate,
        date: DateKey,
    ) -> Result<TemperaturePoint, FetchError> {
        let day = date.to_string();
        let mut query = coordinate_query(at).to_vec();
        query.extend([
            ("start_date", day.clone()),
            ("end_date", day),
            ("hourly", "temperature_2m".to_string()),
        ]);

        tracing::debug!(%at, %date, "fetching historical temperature");
        let parsed: OmArchiveResponse = fetch_json(&self.http, &self.archive_url(), &query).await?;

        // Only the first hourly sample of the day is used.
        let celsius = parsed
            .hourly
            .temperature_2m
            .first()
            .copied()
            .flatten()
            .ok_or(FetchError::MissingSample { date })?;

        Ok(TemperaturePoint { date, celsius })
    }
}

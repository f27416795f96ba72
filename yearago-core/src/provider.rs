use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    Config,
    model::{Coordinate, CurrentConditions, DateKey, TemperaturePoint},
    provider::openmeteo::OpenMeteoSource,
};

pub mod openmeteo;

/// Why a single remote fetch produced nothing.
///
/// Callers above the job level only ever see absence; the variants exist for
/// logging and tests.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no temperature sample for {date}")]
    MissingSample { date: DateKey },
    #[error("no response within {0:?}")]
    TimedOut(Duration),
}

/// Remote source of current and historical temperatures.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn current_conditions(&self, at: Coordinate) -> Result<CurrentConditions, FetchError>;

    /// First hourly temperature sample recorded on `date`.
    async fn historical_temperature(
        &self,
        at: Coordinate,
        date: DateKey,
    ) -> Result<TemperaturePoint, FetchError>;
}

/// One GET, decoded as `T`.
///
/// No retry and no timeout beyond the client's own. Transport failures,
/// non-success statuses and undecodable bodies are all reported as
/// [`FetchError`].
pub async fn fetch_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, FetchError> {
    let res = http.get(url).query(query).send().await?;

    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        return Err(FetchError::Status { status, body: truncate_body(&body) });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Construct the configured weather source.
pub fn source_from_config(config: &Config) -> Box<dyn WeatherSource> {
    Box::new(OpenMeteoSource::with_base_urls(
        config.forecast_base_url.clone(),
        config.archive_base_url.clone(),
    ))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

//! Core library for `yearago`: today's weather next to the same day last year.
//!
//! This crate defines:
//! - Shared domain models (coordinates, date keys, comparison records)
//! - Abstraction over the remote weather source, with an Open-Meteo implementation
//! - Calendar pairing of a day with the same day one year earlier
//! - Fetch jobs and the aggregator that joins them into ordered results
//! - Configuration handling
//!
//! It is used by `yearago-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod calendar;
pub mod config;
pub mod job;
pub mod model;
pub mod provider;

#[cfg(test)]
mod test_support;

pub use aggregator::{AggregationRun, Aggregator, AggregatorSettings, JobBoard, RunAbandoned};
pub use calendar::{resolve_last_year, trailing_days};
pub use config::Config;
pub use job::{Discard, FetchJob, JobState};
pub use model::{
    ComparisonRecord, ComparisonSet, Coordinate, CurrentConditions, DateKey, TemperaturePoint,
    TodaySnapshot, Trend,
};
pub use provider::{FetchError, WeatherSource, openmeteo::OpenMeteoSource, source_from_config};

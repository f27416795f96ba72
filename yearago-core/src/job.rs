//! One day's paired fetch: the day itself and the same day a year earlier.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::{
    calendar::resolve_last_year,
    model::{ComparisonRecord, Coordinate, DateKey, TemperaturePoint},
    provider::{FetchError, WeatherSource},
};

/// Where a job stands.
///
/// Only `Materialized` jobs contribute to the weekly result; the other
/// states stay internal so a hung job can be told apart from a failed one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobState {
    Pending,
    Materialized(ComparisonRecord),
    Discarded(Discard),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }

    pub fn record(&self) -> Option<&ComparisonRecord> {
        match self {
            JobState::Materialized(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    CurrentFailed,
    LastYearFailed,
    BothFailed,
    /// At least one side hit the configured fetch deadline.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchJob {
    id: DateKey,
    last_year: DateKey,
}

impl FetchJob {
    pub fn new(id: DateKey) -> Self {
        Self { id, last_year: resolve_last_year(id) }
    }

    pub fn id(&self) -> DateKey {
        self.id
    }

    pub fn last_year(&self) -> DateKey {
        self.last_year
    }

    /// Fetch both days concurrently and wait for both to finish.
    ///
    /// The result is a record only if both fetches succeeded.
    #[tracing::instrument(level = "debug", skip(self, source), fields(date = %self.id))]
    pub async fn resolve(
        &self,
        source: &dyn WeatherSource,
        at: Coordinate,
        deadline: Option<Duration>,
    ) -> JobState {
        let (current, last_year) = tokio::join!(
            bounded(deadline, source.historical_temperature(at, self.id)),
            bounded(deadline, source.historical_temperature(at, self.last_year)),
        );

        self.settle(current, last_year)
    }

    fn settle(
        &self,
        current: Result<TemperaturePoint, FetchError>,
        last_year: Result<TemperaturePoint, FetchError>,
    ) -> JobState {
        match (current, last_year) {
            (Ok(current), Ok(last_year)) => JobState::Materialized(ComparisonRecord {
                date: self.id,
                current_temp: current.celsius,
                last_year_temp: last_year.celsius,
            }),
            (current, last_year) => {
                let timed_out = [&current, &last_year]
                    .into_iter()
                    .any(|r| matches!(r, Err(FetchError::TimedOut(_))));

                if let Err(err) = &current {
                    warn!(date = %self.id, %err, "current-year fetch failed");
                }
                if let Err(err) = &last_year {
                    warn!(date = %self.last_year, %err, "last-year fetch failed");
                }

                let reason = match (current.is_err(), last_year.is_err()) {
                    _ if timed_out => Discard::TimedOut,
                    (true, true) => Discard::BothFailed,
                    (true, false) => Discard::CurrentFailed,
                    _ => Discard::LastYearFailed,
                };
                JobState::Discarded(reason)
            }
        }
    }
}

/// Apply an optional deadline to a single fetch.
pub(crate) async fn bounded<T>(
    deadline: Option<Duration>,
    fetch: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match deadline {
        None => fetch.await,
        Some(limit) => tokio::time::timeout(limit, fetch)
            .await
            .unwrap_or_else(|_| Err(FetchError::TimedOut(limit))),
    }
}

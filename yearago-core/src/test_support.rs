//! In-memory weather source for unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    calendar::{WEEK_LEN, resolve_last_year, trailing_days},
    model::{Coordinate, CurrentConditions, DateKey, TemperaturePoint},
    provider::{FetchError, WeatherSource},
};

pub fn day(s: &str) -> DateKey {
    s.parse().expect("valid date")
}

pub fn here() -> Coordinate {
    Coordinate::new(51.5, -0.12)
}

/// Answers from a fixed table. Dates without an entry fail, hung dates never
/// answer, gated dates answer once their `Notify` fires.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    current: Option<CurrentConditions>,
    current_gate: Option<Arc<Notify>>,
    temps: HashMap<DateKey, f64>,
    hung: HashSet<DateKey>,
    gates: HashMap<DateKey, Arc<Notify>>,
    historical_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current(mut self, temperature_celsius: f64) -> Self {
        self.current = Some(CurrentConditions {
            temperature_celsius,
            wind_speed_kph: 12.0,
            wind_direction_deg: 240.0,
        });
        self
    }

    pub fn with_temp(mut self, date: &str, celsius: f64) -> Self {
        self.temps.insert(day(date), celsius);
        self
    }

    /// Every trailing day before `today` and its last-year partner.
    pub fn with_full_week(mut self, today: &str) -> Self {
        for date in trailing_days(day(today), WEEK_LEN) {
            let base = f64::from(date.day());
            self.temps.insert(date, base + 10.0);
            self.temps.insert(resolve_last_year(date), base);
        }
        self
    }

    pub fn without_temp(mut self, date: &str) -> Self {
        self.temps.remove(&day(date));
        self
    }

    pub fn hang(mut self, date: &str) -> Self {
        self.hung.insert(day(date));
        self
    }

    pub fn gate(&mut self, date: &str) -> Arc<Notify> {
        Arc::clone(self.gates.entry(day(date)).or_default())
    }

    pub fn gate_current(&mut self) -> Arc<Notify> {
        Arc::clone(self.current_gate.get_or_insert_with(Default::default))
    }

    pub fn historical_calls(&self) -> usize {
        self.historical_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for ScriptedSource {
    async fn current_conditions(&self, _at: Coordinate) -> Result<CurrentConditions, FetchError> {
        if let Some(gate) = &self.current_gate {
            gate.notified().await;
        }
        self.current.ok_or(FetchError::MissingSample { date: day("1970-01-01") })
    }

    async fn historical_temperature(
        &self,
        _at: Coordinate,
        date: DateKey,
    ) -> Result<TemperaturePoint, FetchError> {
        self.historical_calls.fetch_add(1, Ordering::SeqCst);

        if self.hung.contains(&date) {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = self.gates.get(&date) {
            gate.notified().await;
        }

        self.temps
            .get(&date)
            .map(|&celsius| TemperaturePoint { date, celsius })
            .ok_or(FetchError::MissingSample { date })
    }
}

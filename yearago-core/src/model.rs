use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Geographic coordinate supplied once per aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Calendar date without a time component, rendered as `YYYY-MM-DD`.
///
/// Ordering is chronological, which makes it the natural sort key for
/// comparison records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns `None` for dates that do not exist in the Gregorian calendar.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, Self::FORMAT).map(Self)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// First hourly temperature sample of one historical day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePoint {
    pub date: DateKey,
    pub celsius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_celsius: f64,
    pub wind_speed_kph: f64,
    pub wind_direction_deg: f64,
}

/// How last year's temperature relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Current is warmer, so last year was colder.
    ColderThan,
    WarmerThan,
    SameAs,
}

impl Trend {
    /// Classify `current - last_year`.
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Trend::ColderThan
        } else if delta < 0.0 {
            Trend::WarmerThan
        } else {
            Trend::SameAs
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::ColderThan => "colder than",
            Trend::WarmerThan => "warmer than",
            Trend::SameAs => "the same as",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One day's current temperature next to the same calendar day last year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub date: DateKey,
    pub current_temp: f64,
    pub last_year_temp: f64,
}

impl ComparisonRecord {
    pub fn delta(&self) -> f64 {
        self.current_temp - self.last_year_temp
    }

    pub fn trend(&self) -> Trend {
        Trend::from_delta(self.delta())
    }
}

/// Single-pair view for today. Fields fill in independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TodaySnapshot {
    pub current_temp: Option<f64>,
    pub last_year_temp: Option<f64>,
    pub current_conditions: Option<CurrentConditions>,
}

impl TodaySnapshot {
    /// Delta and trend, once both temperatures have arrived.
    pub fn summary(&self) -> Option<(f64, Trend)> {
        let delta = self.current_temp? - self.last_year_temp?;
        Some((delta, Trend::from_delta(delta)))
    }

    pub fn is_complete(&self) -> bool {
        self.current_temp.is_some() && self.last_year_temp.is_some()
    }
}

/// Weekly result handed to the presentation layer.
///
/// Always sorted by date, most recent first, with no two records sharing a
/// date. The only way to build one is [`ComparisonSet::from_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ComparisonSet(Vec<ComparisonRecord>);

impl ComparisonSet {
    pub fn from_records(records: impl IntoIterator<Item = ComparisonRecord>) -> Self {
        let mut records: Vec<_> = records.into_iter().collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records.dedup_by_key(|r| r.date);
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComparisonRecord> {
        self.0.iter()
    }

    pub fn records(&self) -> &[ComparisonRecord] {
        &self.0
    }

    pub fn get(&self, date: DateKey) -> Option<&ComparisonRecord> {
        self.0.iter().find(|r| r.date == date)
    }

    pub fn dates(&self) -> Vec<DateKey> {
        self.0.iter().map(|r| r.date).collect()
    }
}

impl<'a> IntoIterator for &'a ComparisonSet {
    type Item = &'a ComparisonRecord;
    type IntoIter = std::slice::Iter<'a, ComparisonRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

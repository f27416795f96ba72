use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{CustomType, CustomUserError, validator::Validation};
use yearago_core::{
    Aggregator, ComparisonSet, Config, Coordinate, DateKey, TodaySnapshot, source_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "yearago", version, about = "Today's weather next to the same day last year")]
pub struct Cli {
    /// Log fetch and job details to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the default location and fetch timeout.
    Configure,

    /// Compare today and the past week with the same days last year.
    Compare {
        /// Latitude in decimal degrees; falls back to the configured default.
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude in decimal degrees; falls back to the configured default.
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Day to treat as "today" (YYYY-MM-DD); defaults to the local date.
        #[arg(long)]
        date: Option<DateKey>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Compare { lat, lon, date, json } => {
                let explicit = lat.zip(lon).map(|(lat, lon)| Coordinate::new(lat, lon));
                let today = date.unwrap_or_else(|| DateKey::new(Local::now().date_naive()));
                compare(explicit, today, json).await
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    let current = cfg.default_location;

    let latitude = CustomType::<f64>::new("Default latitude:")
        .with_validator(valid_latitude)
        .with_default(current.map_or(0.0, |c| c.latitude))
        .prompt()?;

    let longitude = CustomType::<f64>::new("Default longitude:")
        .with_validator(valid_longitude)
        .with_default(current.map_or(0.0, |c| c.longitude))
        .prompt()?;

    let timeout = CustomType::<u64>::new("Per-fetch timeout in seconds (Esc for none):")
        .with_help_message("Without a timeout a stalled request holds back the weekly result")
        .prompt_skippable()?;

    cfg.default_location = Some(Coordinate::new(latitude, longitude));
    cfg.fetch_timeout_secs = timeout;
    cfg.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn valid_latitude(v: &f64) -> Result<Validation, CustomUserError> {
    Ok(if (-90.0..=90.0).contains(v) {
        Validation::Valid
    } else {
        Validation::Invalid("must be between -90 and 90".into())
    })
}

fn valid_longitude(v: &f64) -> Result<Validation, CustomUserError> {
    Ok(if (-180.0..=180.0).contains(v) {
        Validation::Valid
    } else {
        Validation::Invalid("must be between -180 and 180".into())
    })
}

async fn compare(explicit: Option<Coordinate>, today: DateKey, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    tracing::debug!(?cfg, "loaded configuration");
    let at = cfg.location_or(explicit)?;

    let aggregator = Aggregator::new(Arc::from(source_from_config(&cfg)), cfg.aggregator_settings());
    let run = aggregator.start(at, today);

    let snapshot = run.today.settled().await;
    let week = run
        .weekly
        .comparison_set()
        .await
        .context("Weekly comparison did not complete")?;

    if json {
        let out = serde_json::json!({
            "location": at,
            "date": today,
            "today": snapshot,
            "week": week,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_today(at, today, &snapshot);
        print_week(&week);
    }

    Ok(())
}

fn print_today(at: Coordinate, today: DateKey, snapshot: &TodaySnapshot) {
    println!("{today} at {at}");

    match snapshot.current_temp {
        Some(t) => println!("  now:       {t:.1}°C"),
        None => println!("  now:       unavailable"),
    }
    match snapshot.last_year_temp {
        Some(t) => println!("  last year: {t:.1}°C"),
        None => println!("  last year: unavailable"),
    }
    if let Some(c) = snapshot.current_conditions {
        println!("  wind:      {:.1} km/h from {:.0}°", c.wind_speed_kph, c.wind_direction_deg);
    }
    if let Some((delta, trend)) = snapshot.summary() {
        println!("  last year was {trend} today ({delta:+.1}°C)");
    }
}

fn print_week(week: &ComparisonSet) {
    println!();
    if week.is_empty() {
        println!("No comparisons available for the past week.");
        return;
    }

    println!("{:<12} {:>8} {:>10} {:>7}", "date", "temp", "last year", "delta");
    for record in week {
        println!(
            "{:<12} {:>7.1}° {:>9.1}° {:>+7.1}",
            record.date.to_string(),
            record.current_temp,
            record.last_year_temp,
            record.delta(),
        );
    }
}

//! Fan-out of paired fetches and fan-in into the results the caller sees.
//!
//! Two views are produced per coordinate:
//! - a today snapshot whose current and last-year values arrive
//!   independently, each the moment its own fetch resolves;
//! - a weekly [`ComparisonSet`] for the seven days before today, delivered
//!   once, sorted, after every job has reached a terminal state.
//!
//! Without a fetch deadline a sub-fetch that never resolves holds back the
//! weekly delivery indefinitely. The job board exposes which jobs are still
//! pending in that case.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    calendar::{WEEK_LEN, resolve_last_year, trailing_days},
    job::{FetchJob, JobState, bounded},
    model::{ComparisonSet, Coordinate, DateKey, TodaySnapshot},
    provider::WeatherSource,
};

/// Per-date state of the weekly jobs.
pub type JobBoard = BTreeMap<DateKey, JobState>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Deadline applied to every individual fetch. `None` waits forever.
    pub fetch_timeout: Option<Duration>,
}

/// The weekly result can no longer arrive.
#[derive(Debug, thiserror::Error)]
#[error("weekly comparison was abandoned before every job resolved")]
pub struct RunAbandoned;

#[derive(Debug, Clone)]
pub struct Aggregator {
    source: Arc<dyn WeatherSource>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(source: Arc<dyn WeatherSource>, settings: AggregatorSettings) -> Self {
        Self { source, settings }
    }

    /// Start both views for `today` at `at`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, at: Coordinate, today: DateKey) -> AggregationRun {
        info!(%at, %today, "starting comparison run");
        AggregationRun { today: self.start_today(at, today), weekly: self.start_weekly(at, today) }
    }

    /// Current conditions and last year's temperature for `today`, published
    /// separately as each arrives.
    pub fn start_today(&self, at: Coordinate, today: DateKey) -> TodayHandle {
        let (tx, rx) = watch::channel(TodaySnapshot::default());
        let tx = Arc::new(tx);
        let deadline = self.settings.fetch_timeout;

        let current = {
            let source = Arc::clone(&self.source);
            let tx = Arc::clone(&tx);
            tokio::spawn(async move {
                match bounded(deadline, source.current_conditions(at)).await {
                    Ok(conditions) => tx.send_modify(|s| {
                        s.current_temp = Some(conditions.temperature_celsius);
                        s.current_conditions = Some(conditions);
                    }),
                    Err(err) => warn!(%err, "current conditions unavailable"),
                }
            })
        };

        let last_year = resolve_last_year(today);
        let historical = {
            let source = Arc::clone(&self.source);
            tokio::spawn(async move {
                match bounded(deadline, source.historical_temperature(at, last_year)).await {
                    Ok(point) => tx.send_modify(|s| s.last_year_temp = Some(point.celsius)),
                    Err(err) => warn!(date = %last_year, %err, "last-year temperature unavailable"),
                }
            })
        };

        TodayHandle { snapshot: rx, tasks: vec![current, historical] }
    }

    /// Seven paired jobs for the days before `today`, collected into one
    /// [`ComparisonSet`].
    pub fn start_weekly(&self, at: Coordinate, today: DateKey) -> WeeklyHandle {
        let jobs: Vec<FetchJob> =
            trailing_days(today, WEEK_LEN).into_iter().map(FetchJob::new).collect();
        let expected = jobs.len();

        let board: JobBoard = jobs.iter().map(|job| (job.id(), JobState::Pending)).collect();
        let (board_tx, board_rx) = watch::channel(board);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = oneshot::channel();

        for job in jobs {
            let source = Arc::clone(&self.source);
            let done_tx = done_tx.clone();
            let deadline = self.settings.fetch_timeout;
            tokio::spawn(async move {
                let state = job.resolve(&*source, at, deadline).await;
                // Fails only if the collector has already given up.
                let _ = done_tx.send((job.id(), state));
            });
        }
        drop(done_tx);

        tokio::spawn(collect(expected, done_rx, board_tx, deliver_tx));

        WeeklyHandle { jobs: board_rx, delivery: deliver_rx }
    }
}

/// Sole owner of the accumulator. Counts jobs down and delivers once.
async fn collect(
    expected: usize,
    mut done: mpsc::UnboundedReceiver<(DateKey, JobState)>,
    board: watch::Sender<JobBoard>,
    deliver: oneshot::Sender<ComparisonSet>,
) {
    let mut remaining = expected;
    let mut records = Vec::with_capacity(expected);

    while remaining > 0 {
        let Some((date, state)) = done.recv().await else {
            error!(remaining, "job tasks ended without reporting, weekly comparison abandoned");
            return;
        };

        match &state {
            JobState::Materialized(record) => records.push(*record),
            JobState::Discarded(reason) => debug!(%date, ?reason, "job discarded"),
            JobState::Pending => {}
        }
        board.send_modify(|b| {
            b.insert(date, state);
        });
        remaining -= 1;
    }

    let set = ComparisonSet::from_records(records);
    info!(records = set.len(), jobs = expected, "weekly comparison ready");

    if deliver.send(set).is_err() {
        debug!("weekly comparison receiver dropped before delivery");
    }
}

/// Both views of one run.
#[derive(Debug)]
pub struct AggregationRun {
    pub today: TodayHandle,
    pub weekly: WeeklyHandle,
}

#[derive(Debug)]
pub struct TodayHandle {
    snapshot: watch::Receiver<TodaySnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl TodayHandle {
    /// Whatever has arrived so far.
    pub fn snapshot(&self) -> TodaySnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver notified on every individual update.
    pub fn subscribe(&self) -> watch::Receiver<TodaySnapshot> {
        self.snapshot.clone()
    }

    /// Wait until both fetches have succeeded or failed.
    pub async fn settled(self) -> TodaySnapshot {
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(%err, "today fetch task did not finish");
            }
        }
        *self.snapshot.borrow()
    }
}

#[derive(Debug)]
pub struct WeeklyHandle {
    jobs: watch::Receiver<JobBoard>,
    delivery: oneshot::Receiver<ComparisonSet>,
}

impl WeeklyHandle {
    /// Live view of every job's state.
    pub fn jobs(&self) -> watch::Receiver<JobBoard> {
        self.jobs.clone()
    }

    /// Wait for the single delivery of the weekly set.
    pub async fn comparison_set(self) -> Result<ComparisonSet, RunAbandoned> {
        self.delivery.await.map_err(|_| RunAbandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::Discard,
        model::ComparisonRecord,
        test_support::{ScriptedSource, day, here},
    };
    use tokio::sync::oneshot::error::TryRecvError;

    const TODAY: &str = "2024-06-10";

    fn aggregator(source: ScriptedSource) -> Aggregator {
        Aggregator::new(Arc::new(source), AggregatorSettings::default())
    }

    async fn terminal_count(jobs: &mut watch::Receiver<JobBoard>, n: usize) {
        jobs.wait_for(|b| b.values().filter(|s| s.is_terminal()).count() == n)
            .await
            .expect("board sender alive");
    }

    #[tokio::test]
    async fn today_scenario_pairs_current_with_last_year() {
        let source = ScriptedSource::new().with_current(18.3).with_temp("2023-06-10", 15.0);

        let snapshot = aggregator(source).start_today(here(), day(TODAY)).settled().await;

        assert_eq!(snapshot.current_temp, Some(18.3));
        assert_eq!(snapshot.last_year_temp, Some(15.0));
        assert_eq!(snapshot.current_conditions.map(|c| c.wind_direction_deg), Some(240.0));

        let (delta, trend) = snapshot.summary().expect("both values present");
        assert!((delta - 3.3).abs() < 1e-9);
        assert_eq!(trend.label(), "colder than");
    }

    #[tokio::test]
    async fn today_values_arrive_independently() {
        let mut source = ScriptedSource::new().with_current(18.3).with_temp("2023-06-10", 15.0);
        let gate = source.gate("2023-06-10");

        let handle = aggregator(source).start_today(here(), day(TODAY));
        let mut rx = handle.subscribe();

        let partial = *rx.wait_for(|s| s.current_temp.is_some()).await.expect("sender alive");
        assert_eq!(partial.last_year_temp, None);

        gate.notify_one();
        let full = handle.settled().await;
        assert_eq!(full.last_year_temp, Some(15.0));
    }

    #[tokio::test]
    async fn last_year_may_arrive_first() {
        let mut source = ScriptedSource::new().with_current(18.3).with_temp("2023-06-10", 15.0);
        let gate = source.gate_current();

        let handle = aggregator(source).start_today(here(), day(TODAY));
        let mut rx = handle.subscribe();

        let partial = *rx.wait_for(|s| s.last_year_temp.is_some()).await.expect("sender alive");
        assert_eq!(partial.current_temp, None);
        assert_eq!(handle.snapshot().current_conditions, None);

        gate.notify_one();
        assert!(handle.settled().await.is_complete());
    }

    #[tokio::test]
    async fn today_failure_leaves_value_absent() {
        let source = ScriptedSource::new().with_temp("2023-06-10", 15.0);

        let snapshot = aggregator(source).start_today(here(), day(TODAY)).settled().await;

        assert_eq!(snapshot.current_temp, None);
        assert_eq!(snapshot.current_conditions, None);
        assert_eq!(snapshot.last_year_temp, Some(15.0));
        assert_eq!(snapshot.summary(), None);
    }

    #[tokio::test]
    async fn full_week_yields_seven_descending_records() {
        let source = Arc::new(ScriptedSource::new().with_full_week(TODAY));
        let agg = Aggregator::new(source.clone(), AggregatorSettings::default());

        let set = agg.start_weekly(here(), day(TODAY)).comparison_set().await.expect("delivered");

        assert_eq!(set.len(), 7);
        assert!(set.records().windows(2).all(|w| w[0].date > w[1].date));
        assert_eq!(set.records()[0].date, day("2024-06-09"));
        assert_eq!(set.records()[6].date, day("2024-06-03"));
        assert_eq!(
            set.get(day("2024-06-05")),
            Some(&ComparisonRecord { date: day("2024-06-05"), current_temp: 15.0, last_year_temp: 5.0 })
        );
        assert_eq!(source.historical_calls(), 14);
    }

    #[tokio::test]
    async fn failed_last_year_fetch_drops_only_that_day() {
        let source = ScriptedSource::new().with_full_week(TODAY).without_temp("2023-06-05");

        let handle = aggregator(source).start_weekly(here(), day(TODAY));
        let jobs = handle.jobs();
        let set = handle.comparison_set().await.expect("delivered");

        assert_eq!(set.len(), 6);
        assert!(set.get(day("2024-06-05")).is_none());
        assert_eq!(
            jobs.borrow().get(&day("2024-06-05")),
            Some(&JobState::Discarded(Discard::LastYearFailed))
        );
    }

    #[tokio::test]
    async fn all_failures_deliver_empty_set() {
        let set = aggregator(ScriptedSource::new())
            .start_weekly(here(), day(TODAY))
            .comparison_set()
            .await
            .expect("delivered");

        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn reruns_are_identical() {
        let agg = aggregator(ScriptedSource::new().with_full_week(TODAY).without_temp("2024-06-07"));

        let first = agg.start_weekly(here(), day(TODAY)).comparison_set().await.expect("first");
        let second = agg.start_weekly(here(), day(TODAY)).comparison_set().await.expect("second");

        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[tokio::test]
    async fn delivery_waits_for_the_last_job() {
        let mut source = ScriptedSource::new().with_full_week(TODAY);
        let gate = source.gate("2024-06-09");

        let mut handle = aggregator(source).start_weekly(here(), day(TODAY));
        let mut jobs = handle.jobs();

        terminal_count(&mut jobs, 6).await;
        assert_eq!(jobs.borrow().get(&day("2024-06-09")), Some(&JobState::Pending));
        assert!(matches!(handle.delivery.try_recv(), Err(TryRecvError::Empty)));

        gate.notify_one();
        let set = handle.comparison_set().await.expect("delivered");
        assert_eq!(set.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_without_deadline_never_delivers() {
        let source = ScriptedSource::new().with_full_week(TODAY).hang("2023-06-05");

        let handle = aggregator(source).start_weekly(here(), day(TODAY));
        let mut jobs = handle.jobs();

        terminal_count(&mut jobs, 6).await;
        assert_eq!(jobs.borrow().get(&day("2024-06-05")), Some(&JobState::Pending));

        let waited =
            tokio::time::timeout(Duration::from_secs(24 * 3600), handle.comparison_set()).await;
        assert!(waited.is_err(), "weekly set must not be delivered while a job is pending");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_hang_into_discard() {
        let source = ScriptedSource::new().with_full_week(TODAY).hang("2023-06-05");
        let settings = AggregatorSettings { fetch_timeout: Some(Duration::from_secs(30)) };

        let handle = Aggregator::new(Arc::new(source), settings).start_weekly(here(), day(TODAY));
        let jobs = handle.jobs();
        let set = handle.comparison_set().await.expect("delivered");

        assert_eq!(set.len(), 6);
        assert_eq!(
            jobs.borrow().get(&day("2024-06-05")),
            Some(&JobState::Discarded(Discard::TimedOut))
        );
    }

    #[tokio::test]
    async fn start_runs_both_views() {
        let source = ScriptedSource::new().with_current(18.3).with_temp("2023-06-10", 15.0).with_full_week(TODAY);

        let run = aggregator(source).start(here(), day(TODAY));
        let today = run.today.settled().await;
        let week = run.weekly.comparison_set().await.expect("delivered");

        assert!(today.is_complete());
        assert_eq!(week.len(), 7);
    }
}

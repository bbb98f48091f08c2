use std::{
    fmt,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use futures::{Stream, StreamExt, TryStreamExt};
use recorder_client::domain::{StatisticsSeries, UsageRecord};
use time::{Duration, OffsetDateTime};

use crate::{
    accumulator,
    config::AppConfig,
    cost::RateSchedule,
    transform::reconstruct_periods,
};

/// A payload tagged with its 1-based row number in the input.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub row: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum BackfillError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },
    #[error("malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },
    #[error("no usage rows found in {origin}")]
    EmptyInput { origin: String },
    #[error("unknown statistics series '{0}'; ensure_series must run first")]
    UnknownSeries(String),
    #[error("store write failed for series '{series_id}': {source}")]
    StoreWrite {
        series_id: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to open statistics store {}: {source}", path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("source error: {0}")]
    Source(String),
    #[error("first period ending {end} cannot start {nominal_days} days earlier")]
    PeriodOutOfRange { end: OffsetDateTime, nominal_days: i64 },
}

/// Fail with `InputNotFound` for the first path that does not exist.
pub fn require_inputs<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<(), BackfillError> {
    match paths.into_iter().find(|path| !path.exists()) {
        Some(missing) => Err(BackfillError::InputNotFound {
            path: missing.to_path_buf(),
        }),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    /// Human-readable origin used in diagnostics (usually a path).
    fn describe(&self) -> String;

    async fn stream(&self)
        -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, BackfillError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, BackfillError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence contract for cumulative statistics.
#[async_trait::async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Register series metadata if absent. Returns `true` when a row was created.
    async fn ensure_series(&self, series: &StatisticsSeries) -> Result<bool, BackfillError>;

    /// Write `value` at the UTC hour containing `ts`, replacing any value already there.
    async fn upsert_point(
        &self,
        series_id: &str,
        ts: OffsetDateTime,
        value: f64,
    ) -> Result<UpsertOutcome, BackfillError>;
}

/// What a run writes: the two target series and how cost and periods are derived.
#[derive(Debug, Clone)]
pub struct BackfillPlan {
    pub energy: StatisticsSeries,
    pub cost: StatisticsSeries,
    pub rates: RateSchedule,
    pub nominal_period: Duration,
}

impl BackfillPlan {
    pub fn from_config(cfg: &AppConfig, energy_id: &str, cost_id: &str) -> Self {
        let series = &cfg.series;
        Self {
            energy: StatisticsSeries::cumulative(energy_id, &series.energy_unit, &series.energy_name)
                .with_source(&series.source),
            cost: StatisticsSeries::cumulative(cost_id, &series.cost_unit, &series.cost_name)
                .with_source(&series.source),
            rates: cfg.rates,
            nominal_period: Duration::days(cfg.periods.nominal_days),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    pub rows: usize,
    pub estimated_rows: usize,
    pub series_registered: usize,
    pub points_inserted: usize,
    pub points_updated: usize,
    pub total_kwh: f64,
    pub total_cost: f64,
    pub first_period_start: Option<OffsetDateTime>,
    pub last_period_end: Option<OffsetDateTime>,
}

impl BackfillReport {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.points_inserted += 1,
            UpsertOutcome::Updated => self.points_updated += 1,
        }
    }
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backfill complete. Rows upserted: {}", self.rows)?;
        if let (Some(start), Some(end)) = (self.first_period_start, self.last_period_end) {
            writeln!(f, "  periods:         {} .. {}", start.date(), end.date())?;
        }
        writeln!(f, "  estimated rows:  {}", self.estimated_rows)?;
        writeln!(f, "  series created:  {}", self.series_registered)?;
        writeln!(
            f,
            "  points:          {} inserted, {} updated",
            self.points_inserted, self.points_updated
        )?;
        writeln!(f, "  total energy:    {:.3}", self.total_kwh)?;
        write!(f, "  total cost:      {:.2}", self.total_cost)
    }
}

pub struct Pipeline<S, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<UsageRecord, UsageRecord> + Send + Sync>>,
    pub sink: K,
    pub plan: BackfillPlan,
}

impl<S, K> Pipeline<S, K>
where
    S: Source<UsageRecord> + Send + Sync + 'static,
    K: StatisticsSink + Send + Sync + 'static,
{
    /// Read every record, then write. Nothing reaches the sink unless the whole
    /// input parsed and validated.
    pub async fn run(&self) -> Result<BackfillReport, BackfillError> {
        let records = self.collect_records().await?;
        if records.is_empty() {
            return Err(BackfillError::EmptyInput {
                origin: self.source.describe(),
            });
        }

        let periods = reconstruct_periods(&records, self.plan.nominal_period)?;
        if let Some(first) = periods.first() {
            tracing::info!(
                start = %first.start,
                end = %first.end,
                "first period start inferred from nominal period length"
            );
        }
        let snapshots = accumulator::accumulate(&periods, &self.plan.rates);

        let mut report = BackfillReport {
            rows: periods.len(),
            estimated_rows: periods.iter().filter(|p| p.estimated).count(),
            first_period_start: periods.first().map(|p| p.start),
            last_period_end: periods.last().map(|p| p.end),
            ..BackfillReport::default()
        };

        for series in [&self.plan.energy, &self.plan.cost] {
            if self.sink.ensure_series(series).await? {
                report.series_registered += 1;
            }
        }

        for snap in &snapshots {
            let outcome = self
                .sink
                .upsert_point(&self.plan.energy.id, snap.period_end, snap.cumulative_kwh)
                .await?;
            report.record(outcome);

            let outcome = self
                .sink
                .upsert_point(&self.plan.cost.id, snap.period_end, snap.cumulative_cost)
                .await?;
            report.record(outcome);

            tracing::debug!(
                period_end = %snap.period_end,
                days = snap.days,
                period_cost = snap.period_cost,
                cumulative_kwh = snap.cumulative_kwh,
                cumulative_cost = snap.cumulative_cost,
                "period written"
            );
        }

        if let Some(last) = snapshots.last() {
            report.total_kwh = last.cumulative_kwh;
            report.total_cost = last.cumulative_cost;
        }

        tracing::info!(
            rows = report.rows,
            inserted = report.points_inserted,
            updated = report.points_updated,
            "backfill finished"
        );

        Ok(report)
    }

    /// Drain the source through the transforms and sort by period end.
    async fn collect_records(&self) -> Result<Vec<UsageRecord>, BackfillError> {
        let mut stream = self.source.stream().await;

        for t in &self.transforms {
            let t_arc = Arc::clone(t);
            stream = Box::pin(stream.then(move |item| {
                let t_inner = Arc::clone(&t_arc);
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let mut envelopes: Vec<Envelope<UsageRecord>> = stream.try_collect().await?;
        envelopes.sort_by(|a, b| a.payload.period_end.cmp(&b.payload.period_end));

        tracing::info!(
            rows = envelopes.len(),
            source = %self.source.describe(),
            "usage records loaded"
        );

        Ok(envelopes.into_iter().map(|env| env.payload).collect())
    }
}

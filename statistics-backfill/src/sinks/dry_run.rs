use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::{Mutex, MutexGuard},
};

use recorder_client::domain::{align_to_hour, StatisticsPoint, StatisticsSeries};
use time::OffsetDateTime;

use crate::pipeline::{BackfillError, StatisticsSink, UpsertOutcome};

#[derive(Default)]
struct DryRunState {
    series: BTreeMap<String, StatisticsSeries>,
    points: BTreeMap<(String, OffsetDateTime), f64>,
}

/// In-memory sink with the same upsert contract as the recorder database.
///
/// Used for `--dry-run`: the run is planned and logged, nothing is written to disk.
#[derive(Default)]
pub struct DryRunSink {
    state: Mutex<DryRunState>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DryRunState> {
        // State is plain data; a poisoned lock still holds a usable map.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn series(&self) -> Vec<StatisticsSeries> {
        self.lock().series.values().cloned().collect()
    }

    /// Planned points for one series in chronological order.
    pub fn points(&self, series_id: &str) -> Vec<StatisticsPoint> {
        self.lock()
            .points
            .iter()
            .filter(|((id, _), _)| id == series_id)
            .map(|((id, hour_start), value)| StatisticsPoint {
                series_id: id.clone(),
                hour_start: *hour_start,
                cumulative_value: *value,
            })
            .collect()
    }

    /// One block per series: a header line, then `hour_start  value` per planned point.
    pub fn render_plan(&self, series: &[&StatisticsSeries]) -> String {
        let mut out = String::new();
        for s in series {
            let _ = writeln!(out, "{} ({})", s.id, s.unit);
            for point in self.points(&s.id) {
                let _ = writeln!(out, "  {}  {:.3}", point.hour_start, point.cumulative_value);
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl StatisticsSink for DryRunSink {
    async fn ensure_series(&self, series: &StatisticsSeries) -> Result<bool, BackfillError> {
        let mut state = self.lock();
        if state.series.contains_key(&series.id) {
            return Ok(false);
        }
        state.series.insert(series.id.clone(), series.clone());
        tracing::info!(statistic_id = %series.id, unit = %series.unit, "dry run: would register series");
        Ok(true)
    }

    async fn upsert_point(
        &self,
        series_id: &str,
        ts: OffsetDateTime,
        value: f64,
    ) -> Result<UpsertOutcome, BackfillError> {
        let mut state = self.lock();
        if !state.series.contains_key(series_id) {
            return Err(BackfillError::UnknownSeries(series_id.to_string()));
        }

        let hour_start = align_to_hour(ts);
        let outcome = match state.points.insert((series_id.to_string(), hour_start), value) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        tracing::info!(statistic_id = series_id, start = %hour_start, sum = value, ?outcome, "dry run: would upsert point");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn upsert_requires_registered_series() {
        let sink = DryRunSink::new();
        let err = sink
            .upsert_point("sensor:grid_kwh", datetime!(2024-01-15 23:59:59 UTC), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::UnknownSeries(id) if id == "sensor:grid_kwh"));
    }

    #[tokio::test]
    async fn same_hour_is_replaced_not_duplicated() {
        let sink = DryRunSink::new();
        let series = StatisticsSeries::cumulative("sensor:grid_kwh", "kWh", "Grid");
        assert!(sink.ensure_series(&series).await.unwrap());
        assert!(!sink.ensure_series(&series).await.unwrap());
        assert_eq!(sink.series().len(), 1);

        let first = sink
            .upsert_point(&series.id, datetime!(2024-01-15 23:05:00 UTC), 10.0)
            .await
            .unwrap();
        let second = sink
            .upsert_point(&series.id, datetime!(2024-01-15 23:59:59 UTC), 12.0)
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);
        let points = sink.points(&series.id);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].hour_start, datetime!(2024-01-15 23:00:00 UTC));
        assert_eq!(points[0].cumulative_value, 12.0);
    }

    #[tokio::test]
    async fn render_plan_lists_points_per_series() {
        let sink = DryRunSink::new();
        let kwh = StatisticsSeries::cumulative("sensor:grid_kwh", "kWh", "Grid");
        let cost = StatisticsSeries::cumulative("sensor:grid_cost", "USD", "Grid cost");
        sink.ensure_series(&kwh).await.unwrap();
        sink.ensure_series(&cost).await.unwrap();
        sink.upsert_point(&kwh.id, datetime!(2024-01-15 23:59:59 UTC), 500.0)
            .await
            .unwrap();

        let text = sink.render_plan(&[&kwh, &cost]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "sensor:grid_kwh (kWh)");
        assert!(lines[1].ends_with("  500.000"));
        assert!(lines[1].starts_with("  2024-01-15 23:00:00"));
        assert_eq!(lines[2], "sensor:grid_cost (USD)");
    }
}

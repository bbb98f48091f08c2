use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use recorder_client::{
    db::{metadata_id, point_id_at},
    domain::{align_to_hour, recorder_datetime_text, StatisticsSeries},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use time::OffsetDateTime;

use crate::pipeline::{BackfillError, StatisticsSink, UpsertOutcome};

/// Writes cumulative statistics into an existing Home Assistant recorder database.
///
/// The schema (`statistics_meta`, `statistics`) must already exist; this sink only
/// looks up, inserts and updates rows. Every operation runs in its own transaction.
pub struct RecorderSqliteSink {
    pool: SqlitePool,
    path: PathBuf,
}

impl RecorderSqliteSink {
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, BackfillError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(BackfillError::InputNotFound { path });
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(false)
            .busy_timeout(busy_timeout);

        // Single writer: one connection held for the whole run.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| BackfillError::StoreUnavailable {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), "opened recorder database");
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!(path = %self.path.display(), "closed recorder database");
    }
}

fn store_write(series_id: &str) -> impl Fn(sqlx::Error) -> BackfillError + '_ {
    move |source| BackfillError::StoreWrite {
        series_id: series_id.to_string(),
        source,
    }
}

/// `YYYY-MM-DD HH:MM:SS.fff`, matching SQLite's `strftime('%Y-%m-%d %H:%M:%f')`.
fn audit_timestamp(now: OffsetDateTime) -> (String, f64) {
    let text = format!(
        "{}.{:03}",
        recorder_datetime_text(now),
        now.millisecond()
    );
    (text, now.unix_timestamp() as f64)
}

#[async_trait::async_trait]
impl StatisticsSink for RecorderSqliteSink {
    async fn ensure_series(&self, series: &StatisticsSeries) -> Result<bool, BackfillError> {
        let err = store_write(&series.id);
        let mut tx = self.pool.begin().await.map_err(&err)?;

        if metadata_id(&mut *tx, &series.id).await.map_err(&err)?.is_some() {
            tracing::debug!(statistic_id = %series.id, "series already registered");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO statistics_meta (statistic_id, source, unit_of_measurement, has_mean, has_sum, name)
            VALUES (?, ?, ?, 0, 1, ?)
            "#,
        )
        .bind(&series.id)
        .bind(&series.source)
        .bind(&series.unit)
        .bind(&series.display_name)
        .execute(&mut *tx)
        .await
        .map_err(&err)?;

        tx.commit().await.map_err(&err)?;

        metrics::counter!("statistics_series_registered_total").increment(1);
        tracing::info!(
            statistic_id = %series.id,
            unit = %series.unit,
            name = %series.display_name,
            "registered statistics series"
        );
        Ok(true)
    }

    async fn upsert_point(
        &self,
        series_id: &str,
        ts: OffsetDateTime,
        value: f64,
    ) -> Result<UpsertOutcome, BackfillError> {
        let aligned = align_to_hour(ts);
        let start = recorder_datetime_text(aligned);
        let start_ts = aligned.unix_timestamp() as f64;
        let (created, created_ts) = audit_timestamp(OffsetDateTime::now_utc());

        let err = store_write(series_id);
        let mut tx = self.pool.begin().await.map_err(&err)?;

        let meta_id = metadata_id(&mut *tx, series_id)
            .await
            .map_err(&err)?
            .ok_or_else(|| BackfillError::UnknownSeries(series_id.to_string()))?;

        let outcome = match point_id_at(&mut *tx, meta_id, start_ts).await.map_err(&err)? {
            Some(point_id) => {
                sqlx::query("UPDATE statistics SET sum = ?, created = ?, created_ts = ? WHERE id = ?")
                    .bind(value)
                    .bind(&created)
                    .bind(created_ts)
                    .bind(point_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(&err)?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO statistics (
                        created, created_ts, metadata_id, start, start_ts,
                        mean, min, max, last_reset, last_reset_ts, state, sum, mean_weight
                    )
                    VALUES (?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, NULL, NULL, ?, NULL)
                    "#,
                )
                .bind(&created)
                .bind(created_ts)
                .bind(meta_id)
                .bind(&start)
                .bind(start_ts)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(&err)?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit().await.map_err(&err)?;

        match outcome {
            UpsertOutcome::Inserted => metrics::counter!("statistics_points_inserted_total").increment(1),
            UpsertOutcome::Updated => metrics::counter!("statistics_points_updated_total").increment(1),
        }
        tracing::debug!(statistic_id = series_id, start = %start, sum = value, ?outcome, "upserted point");

        Ok(outcome)
    }
}

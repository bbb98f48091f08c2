use sqlx::{Executor, Sqlite, SqlitePool};
use time::OffsetDateTime;

use crate::domain::StatisticsPoint;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SeriesMetadataRow {
    pub id: i64,
    pub statistic_id: String,
    pub source: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub has_mean: Option<bool>,
    pub has_sum: Option<bool>,
    pub name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct PointRow {
    start_ts: f64,
    sum: Option<f64>,
}

/// Resolve the `statistics_meta.id` registered for `statistic_id`.
pub async fn metadata_id<'e, E>(executor: E, statistic_id: &str) -> sqlx::Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT id FROM statistics_meta WHERE statistic_id = ?")
        .bind(statistic_id)
        .fetch_optional(executor)
        .await
}

/// Find the point row for one series at one hour start (epoch seconds).
pub async fn point_id_at<'e, E>(
    executor: E,
    metadata_id: i64,
    start_ts: f64,
) -> sqlx::Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT id FROM statistics WHERE metadata_id = ? AND start_ts = ?")
        .bind(metadata_id)
        .bind(start_ts)
        .fetch_optional(executor)
        .await
}

pub async fn series_metadata(
    pool: &SqlitePool,
    statistic_id: &str,
) -> sqlx::Result<Option<SeriesMetadataRow>> {
    sqlx::query_as::<_, SeriesMetadataRow>(
        r#"
        SELECT id, statistic_id, source, unit_of_measurement, has_mean, has_sum, name
        FROM statistics_meta
        WHERE statistic_id = ?
        "#,
    )
    .bind(statistic_id)
    .fetch_optional(pool)
    .await
}

pub async fn count_series_metadata(pool: &SqlitePool, statistic_id: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM statistics_meta WHERE statistic_id = ?")
        .bind(statistic_id)
        .fetch_one(pool)
        .await
}

/// All stored points for a series in chronological order.
pub async fn points_for_series(
    pool: &SqlitePool,
    statistic_id: &str,
) -> sqlx::Result<Vec<StatisticsPoint>> {
    let rows = sqlx::query_as::<_, PointRow>(
        r#"
        SELECT s.start_ts AS start_ts, s.sum AS sum
        FROM statistics s
        JOIN statistics_meta m ON m.id = s.metadata_id
        WHERE m.statistic_id = ?
        ORDER BY s.start_ts
        "#,
    )
    .bind(statistic_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let hour_start = OffsetDateTime::from_unix_timestamp(row.start_ts as i64)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            Ok(StatisticsPoint {
                series_id: statistic_id.to_string(),
                hour_start,
                cumulative_value: row.sum.unwrap_or_default(),
            })
        })
        .collect()
}

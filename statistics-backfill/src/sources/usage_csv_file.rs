use std::{fs::File, io, path::PathBuf};

use csv::StringRecord;
use futures::Stream;
use recorder_client::domain::UsageRecord;
use time::{macros::format_description, PrimitiveDateTime};

use crate::{
    config::UsageLogConfig,
    pipeline::{BackfillError, Envelope, Source},
    timezone::LocalTimezone,
};

/// Utility usage export, one row per billing period.
///
/// Columns are matched by header name (see `UsageLogConfig`):
/// - period end, `MM/DD/YYYY hh:mm:ss AM|PM` local time
/// - kWh, thousands separators allowed
/// - estimated indicator (optional column), set when equal to the marker
pub struct UsageCsvFileSource {
    path: PathBuf,
    layout: UsageLogConfig,
    timezone: LocalTimezone,
}

impl UsageCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, layout: UsageLogConfig, timezone: LocalTimezone) -> Self {
        Self {
            path: path.into(),
            layout,
            timezone,
        }
    }
}

fn malformed(row: usize, reason: impl Into<String>) -> BackfillError {
    BackfillError::MalformedRecord {
        row,
        reason: reason.into(),
    }
}

fn parse_period_end(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    let format = format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
    );
    PrimitiveDateTime::parse(s.trim(), &format)
}

/// Parse a kWh amount such as `1,234.5`.
fn parse_kwh(s: &str) -> Result<f64, String> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err("empty kWh value".to_string());
    }
    cleaned
        .parse()
        .map_err(|e| format!("invalid kWh '{}': {e}", s.trim()))
}

fn record_to_usage(
    record: &StringRecord,
    headers: &StringRecord,
    layout: &UsageLogConfig,
    timezone: LocalTimezone,
    row: usize,
) -> Result<UsageRecord, BackfillError> {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .and_then(|idx| record.get(idx))
    };
    let required = |name: &str| -> Result<&str, BackfillError> {
        match get(name) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            Some(_) => Err(malformed(row, format!("empty '{name}' field"))),
            None => Err(malformed(row, format!("missing column '{name}'"))),
        }
    };

    let end_str = required(&layout.end_column)?;
    let local = parse_period_end(end_str)
        .map_err(|e| malformed(row, format!("invalid period end '{}': {e}", end_str.trim())))?;
    let period_end = timezone.localize(local).ok_or_else(|| {
        malformed(
            row,
            format!("period end '{}' does not exist in {}", end_str.trim(), timezone.name()),
        )
    })?;

    let kwh = parse_kwh(required(&layout.kwh_column)?).map_err(|reason| malformed(row, reason))?;

    let estimated = layout
        .estimated_column
        .as_deref()
        .and_then(|name| get(name))
        .map(|v| v.trim() == layout.estimated_marker)
        .unwrap_or(false);

    Ok(UsageRecord {
        period_end,
        kwh,
        estimated,
    })
}

#[async_trait::async_trait]
impl Source<UsageRecord> for UsageCsvFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<UsageRecord>, BackfillError>> + Send>> {
        // Blocking CSV reader inside a single stream; usage exports are small.
        let path = self.path.clone();
        let layout = self.layout.clone();
        let timezone = self.timezone;
        let s = async_stream::try_stream! {
            let file = File::open(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => BackfillError::InputNotFound { path: path.clone() },
                _ => BackfillError::Source(format!("failed to open usage log {}: {e}", path.display())),
            })?;
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(layout.delimiter as u8)
                .flexible(true)
                .from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| BackfillError::Source(format!("failed to read usage log headers: {e}")))?
                .clone();

            for (idx, result) in rdr.records().enumerate() {
                let row = idx + 1;
                let record = result.map_err(|e| malformed(row, format!("unreadable row: {e}")))?;

                let usage = match record_to_usage(&record, &headers, &layout, timezone, row) {
                    Ok(u) => u,
                    Err(e) => {
                        metrics::counter!("usage_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope { payload: usage, row };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;
    use time::macros::datetime;

    fn headers() -> StringRecord {
        StringRecord::from(vec!["Start", "End", "kWh", "Estimated Indicator"])
    }

    #[test]
    fn parse_period_end_accepts_export_format() {
        let parsed = parse_period_end("01/15/2024 11:59:59 PM").unwrap();
        assert_eq!(parsed, datetime!(2024-01-15 23:59:59));

        let parsed = parse_period_end("2/5/2024 12:00:00 am").unwrap();
        assert_eq!(parsed, datetime!(2024-02-05 00:00:00));
    }

    #[test]
    fn parse_period_end_rejects_other_formats() {
        assert!(parse_period_end("2024-01-15 23:59:59").is_err());
        assert!(parse_period_end("13/15/2024 11:59:59 PM").is_err());
    }

    #[test]
    fn parse_kwh_strips_thousands_separators() {
        assert_eq!(parse_kwh("1,234.5").unwrap(), 1234.5);
        assert_eq!(parse_kwh(" 500 ").unwrap(), 500.0);
        assert!(parse_kwh("").is_err());
        assert!(parse_kwh("abc").is_err());
    }

    #[test]
    fn record_to_usage_maps_columns_by_name() {
        let record = StringRecord::from(vec![
            "12/15/2023 12:00:00 AM",
            "01/15/2024 11:59:59 PM",
            "1,050",
            "*",
        ]);
        let usage = record_to_usage(&record, &headers(), &UsageLogConfig::default(), LocalTimezone::UTC, 1)
            .unwrap();
        assert_eq!(usage.period_end, datetime!(2024-01-15 23:59:59 UTC));
        assert_eq!(usage.kwh, 1050.0);
        assert!(usage.estimated);
    }

    #[test]
    fn record_to_usage_without_estimate_column_is_not_estimated() {
        let headers = StringRecord::from(vec!["End", "kWh"]);
        let record = StringRecord::from(vec!["01/15/2024 11:59:59 PM", "500"]);
        let usage =
            record_to_usage(&record, &headers, &UsageLogConfig::default(), LocalTimezone::UTC, 1).unwrap();
        assert!(!usage.estimated);
    }

    #[test]
    fn record_to_usage_reports_row_for_bad_fields() {
        let record = StringRecord::from(vec!["", "01/15/2024 11:59:59 PM", "n/a", ""]);
        let err = record_to_usage(&record, &headers(), &UsageLogConfig::default(), LocalTimezone::UTC, 4)
            .unwrap_err();
        assert!(matches!(err, BackfillError::MalformedRecord { row: 4, .. }));

        let record = StringRecord::from(vec!["", "", "500", ""]);
        let err = record_to_usage(&record, &headers(), &UsageLogConfig::default(), LocalTimezone::UTC, 2)
            .unwrap_err();
        assert!(matches!(err, BackfillError::MalformedRecord { row: 2, .. }));
    }

    #[test]
    fn record_to_usage_matches_header_with_byte_order_mark() {
        let headers = StringRecord::from(vec!["\u{feff}End", "kWh"]);
        let record = StringRecord::from(vec!["01/15/2024 11:59:59 PM", "500"]);
        assert!(
            record_to_usage(&record, &headers, &UsageLogConfig::default(), LocalTimezone::UTC, 1).is_ok()
        );
    }

    #[tokio::test]
    async fn stream_yields_rows_in_file_order_with_row_numbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Start,End,kWh,Estimated Indicator").unwrap();
        writeln!(file, "01/15/2024 12:00:00 AM,02/15/2024 11:59:59 PM,600,").unwrap();
        writeln!(file, "12/15/2023 12:00:00 AM,01/15/2024 11:59:59 PM,\"1,500\",*").unwrap();

        let source = UsageCsvFileSource::new(file.path(), UsageLogConfig::default(), LocalTimezone::UTC);
        let rows: Vec<_> = source.stream().await.try_collect().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].payload.kwh, 600.0);
        assert_eq!(rows[1].row, 2);
        assert_eq!(rows[1].payload.kwh, 1500.0);
        assert!(rows[1].payload.estimated);
    }

    #[tokio::test]
    async fn missing_file_is_input_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = UsageCsvFileSource::new(
            dir.path().join("Usage.csv"),
            UsageLogConfig::default(),
            LocalTimezone::UTC,
        );
        let res: Result<Vec<_>, _> = source.stream().await.try_collect().await;
        assert!(matches!(res, Err(BackfillError::InputNotFound { .. })));
    }

    #[tokio::test]
    async fn pipe_delimited_exports_are_supported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "End|kWh").unwrap();
        writeln!(file, "01/15/2024 11:59:59 PM|1,200").unwrap();

        let layout = UsageLogConfig {
            delimiter: '|',
            ..UsageLogConfig::default()
        };
        let source = UsageCsvFileSource::new(file.path(), layout, LocalTimezone::UTC);
        let rows: Vec<_> = source.stream().await.try_collect().await.unwrap();
        assert_eq!(rows[0].payload.kwh, 1200.0);
    }
}

use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// Source tag the recorder uses for statistics imported from outside an integration.
pub const EXTERNAL_SOURCE: &str = "external";

/// Metadata for one cumulative ("has sum") statistics series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsSeries {
    pub id: String,
    pub unit: String,
    pub display_name: String,
    pub source: String,
}

impl StatisticsSeries {
    pub fn cumulative(
        id: impl Into<String>,
        unit: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            unit: unit.into(),
            display_name: display_name.into(),
            source: EXTERNAL_SOURCE.to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// A stored running total for one series at one aligned hour.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsPoint {
    pub series_id: String,
    pub hour_start: OffsetDateTime,
    pub cumulative_value: f64,
}

/// Truncate `ts` to the start of its hour in UTC.
pub fn align_to_hour(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.replace_time(Time::MIDNIGHT) + Duration::hours(i64::from(utc.hour()))
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, the text form the recorder keeps next to epoch columns.
pub fn recorder_datetime_text(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

use time::OffsetDateTime;

/// One end-of-period reading from a utility usage export.
///
/// `period_end` keeps the offset of the zone the export was written in, so calendar
/// dates stay local; conversion to UTC happens when points are written.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub period_end: OffsetDateTime,
    pub kwh: f64,
    pub estimated: bool,
}

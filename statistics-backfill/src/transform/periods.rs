use recorder_client::domain::{Period, UsageRecord};
use time::{Duration, OffsetDateTime};

use crate::pipeline::BackfillError;

/// Default length assumed for the first period, which has no preceding reading.
pub const NOMINAL_PERIOD_DAYS: i64 = 31;

/// Longest accepted nominal first period.
pub const MAX_NOMINAL_PERIOD_DAYS: i64 = 366;

/// Turn ascending end-of-period readings into back-to-back periods.
///
/// Each period starts where the previous one ended. The first start is
/// `end - nominal_period`, an approximation flagged with `start_inferred`.
pub fn reconstruct_periods(
    records: &[UsageRecord],
    nominal_period: Duration,
) -> Result<Vec<Period>, BackfillError> {
    let mut periods = Vec::with_capacity(records.len());
    let mut prev_end: Option<OffsetDateTime> = None;

    for record in records {
        let (start, start_inferred) = match prev_end {
            Some(end) => (end, false),
            None => {
                let start = record.period_end.checked_sub(nominal_period).ok_or(
                    BackfillError::PeriodOutOfRange {
                        end: record.period_end,
                        nominal_days: nominal_period.whole_days(),
                    },
                )?;
                (start, true)
            }
        };
        periods.push(Period {
            start,
            end: record.period_end,
            kwh: record.kwh,
            start_inferred,
            estimated: record.estimated,
        });
        prev_end = Some(record.period_end);
    }

    Ok(periods)
}

pub mod periods;

pub use periods::{reconstruct_periods, MAX_NOMINAL_PERIOD_DAYS, NOMINAL_PERIOD_DAYS};

use recorder_client::domain::UsageRecord;
use time::{macros::datetime, OffsetDateTime};

use crate::pipeline::{BackfillError, Envelope, Transform};

/// Earliest period end a usage export is expected to contain.
const EARLIEST_PERIOD_END: OffsetDateTime = datetime!(2000-01-01 00:00:00 UTC);
/// Latest period end a usage export is expected to contain.
const LATEST_PERIOD_END: OffsetDateTime = datetime!(2100-01-01 00:00:00 UTC);

/// Reject a billing row whose reading cannot feed a cumulative total.
///
/// The energy reading has to be a finite, non-negative kWh amount, and the
/// period end has to fall between 2000 and 2100. The error carries the row
/// number of the offending line.
pub fn validate_usage_record(env: Envelope<UsageRecord>) -> Result<Envelope<UsageRecord>, BackfillError> {
    let row = env.row;
    let reject = move |reason: String| BackfillError::MalformedRecord { row, reason };
    let UsageRecord { period_end, kwh, .. } = env.payload;

    if !kwh.is_finite() || kwh < 0.0 {
        return Err(reject(format!("kWh must be a non-negative number, got {kwh}")));
    }
    if !(EARLIEST_PERIOD_END..=LATEST_PERIOD_END).contains(&period_end) {
        return Err(reject(format!(
            "period end {period_end} is outside {EARLIEST_PERIOD_END} .. {LATEST_PERIOD_END}"
        )));
    }

    Ok(env)
}

/// Pipeline step running [`validate_usage_record`] and counting rejections.
#[derive(Clone, Default)]
pub struct UsageRecordValidation;

#[async_trait::async_trait]
impl Transform<UsageRecord, UsageRecord> for UsageRecordValidation {
    async fn apply(
        &self,
        input: Envelope<UsageRecord>,
    ) -> Result<Envelope<UsageRecord>, BackfillError> {
        validate_usage_record(input).inspect_err(|err| {
            metrics::counter!("validation_usage_record_rejected_total").increment(1);
            tracing::warn!(error = %err, "usage record rejected");
        })
    }
}

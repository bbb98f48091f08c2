pub mod period;
pub mod statistics;
pub mod usage;

pub use period::Period;
pub use statistics::{align_to_hour, recorder_datetime_text, StatisticsPoint, StatisticsSeries};
pub use usage::UsageRecord;

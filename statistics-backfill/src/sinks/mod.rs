pub mod dry_run;
pub mod recorder_sqlite;

pub use dry_run::DryRunSink;
pub use recorder_sqlite::RecorderSqliteSink;

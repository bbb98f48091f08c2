use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use recorder_client::domain::UsageRecord;
use statistics_backfill::{
    config::{AppConfig, RateOverrides},
    observability,
    pipeline::{require_inputs, BackfillPlan, Pipeline, Transform},
    sinks::{DryRunSink, RecorderSqliteSink},
    sources::UsageCsvFileSource,
    timezone::LocalTimezone,
    transform,
};

/// Backfill monthly cumulative kWh and cost into a Home Assistant recorder database.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Path to the recorder SQLite database (home-assistant_v2.db).
    #[arg(long)]
    db: PathBuf,
    /// Usage export CSV, one row per billing period.
    #[arg(long)]
    csv: PathBuf,
    /// Statistic id for the cumulative kWh series.
    #[arg(long)]
    sensor_kwh: String,
    /// Statistic id for the cumulative cost series.
    #[arg(long)]
    sensor_cost: String,
    /// Time zone the usage export is written in; stored timestamps are UTC.
    #[arg(long, default_value = "America/Los_Angeles")]
    tz: String,
    /// TOML configuration file.
    #[arg(long, env = "BACKFILL_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    base_rate_per_day: Option<f64>,
    #[arg(long)]
    energy_rate_per_kwh: Option<f64>,
    #[arg(long)]
    tax_multiplier: Option<f64>,
    /// Plan the backfill and print the points without writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    cfg.apply_rate_overrides(RateOverrides {
        base_rate_per_day: cli.base_rate_per_day,
        energy_rate_per_kwh: cli.energy_rate_per_kwh,
        tax_multiplier: cli.tax_multiplier,
    })?;

    let timezone = LocalTimezone::from_name(&cli.tz)?;

    // Both inputs must exist before anything is read or opened.
    require_inputs([cli.db.as_path(), cli.csv.as_path()])?;

    tracing::info!(
        db = %cli.db.display(),
        csv = %cli.csv.display(),
        tz = timezone.name(),
        base_rate_per_day = cfg.rates.base_rate_per_day,
        energy_rate_per_kwh = cfg.rates.energy_rate_per_kwh,
        tax_multiplier = cfg.rates.tax_multiplier,
        dry_run = cli.dry_run,
        "starting backfill"
    );

    let plan = BackfillPlan::from_config(&cfg, &cli.sensor_kwh, &cli.sensor_cost);
    let source = UsageCsvFileSource::new(&cli.csv, cfg.usage_log.clone(), timezone);
    let transforms: Vec<Arc<dyn Transform<UsageRecord, UsageRecord> + Send + Sync>> =
        vec![Arc::new(transform::UsageRecordValidation)];

    if cli.dry_run {
        let pipeline = Pipeline {
            source,
            transforms,
            sink: DryRunSink::new(),
            plan,
        };
        let report = pipeline.run().await?;

        print!(
            "{}",
            pipeline
                .sink
                .render_plan(&[&pipeline.plan.energy, &pipeline.plan.cost])
        );
        println!("{report}");
        println!("Dry run: no changes written to {}", cli.db.display());
        return Ok(());
    }

    let sink = RecorderSqliteSink::open(&cli.db, Duration::from_millis(cfg.store.busy_timeout_ms)).await?;
    let pipeline = Pipeline {
        source,
        transforms,
        sink,
        plan,
    };

    // Release the database on every exit path before reporting the outcome.
    let result = pipeline.run().await;
    pipeline.sink.close().await;
    let report = result?;

    println!("{report}");
    Ok(())
}

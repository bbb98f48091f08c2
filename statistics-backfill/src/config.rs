use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::cost::RateSchedule;
use crate::transform::{MAX_NOMINAL_PERIOD_DAYS, NOMINAL_PERIOD_DAYS};

const CONFIG_ENV: &str = "BACKFILL_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "backfill-config.toml";

/// Column layout of the usage CSV export.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageLogConfig {
    pub end_column: String,
    pub kwh_column: String,
    /// Optional column whose value equals `estimated_marker` for estimated reads.
    pub estimated_column: Option<String>,
    pub estimated_marker: String,
    pub delimiter: char,
}

impl Default for UsageLogConfig {
    fn default() -> Self {
        Self {
            end_column: "End".to_string(),
            kwh_column: "kWh".to_string(),
            estimated_column: Some("Estimated Indicator".to_string()),
            estimated_marker: "*".to_string(),
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    pub energy_unit: String,
    pub energy_name: String,
    pub cost_unit: String,
    pub cost_name: String,
    pub source: String,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            energy_unit: "kWh".to_string(),
            energy_name: "Grid Energy Total".to_string(),
            cost_unit: "USD".to_string(),
            cost_name: "Grid Energy Total Cost".to_string(),
            source: recorder_client::domain::statistics::EXTERNAL_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub nominal_days: i64,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            nominal_days: NOMINAL_PERIOD_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

/// Rates given for a single run, taking precedence over the `[rates]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateOverrides {
    pub base_rate_per_day: Option<f64>,
    pub energy_rate_per_kwh: Option<f64>,
    pub tax_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rates: RateSchedule,
    pub usage_log: UsageLogConfig,
    pub series: SeriesConfig,
    pub periods: PeriodConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load from `path`, else `BACKFILL_CONFIG`, else `backfill-config.toml` when it
    /// exists, else built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var(CONFIG_ENV).ok().map(PathBuf::from).or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }),
        };

        match path {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml_str(&contents)
                    .with_context(|| format!("invalid config {}", path.display()))
            }
            None => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply whichever overrides are set and check the resulting config again.
    pub fn apply_rate_overrides(&mut self, overrides: RateOverrides) -> anyhow::Result<()> {
        let rates = &mut self.rates;
        if let Some(v) = overrides.base_rate_per_day {
            rates.base_rate_per_day = v;
        }
        if let Some(v) = overrides.energy_rate_per_kwh {
            rates.energy_rate_per_kwh = v;
        }
        if let Some(v) = overrides.tax_multiplier {
            rates.tax_multiplier = v;
        }
        self.validate().context("invalid rate override")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.rates.validate()?;
        if !(1..=MAX_NOMINAL_PERIOD_DAYS).contains(&self.periods.nominal_days) {
            anyhow::bail!(
                "periods.nominal_days must be between 1 and {MAX_NOMINAL_PERIOD_DAYS}, got {}",
                self.periods.nominal_days
            );
        }
        if !self.usage_log.delimiter.is_ascii() {
            anyhow::bail!("usage_log.delimiter must be a single ASCII character");
        }
        if self.usage_log.end_column.trim().is_empty() || self.usage_log.kwh_column.trim().is_empty() {
            anyhow::bail!("usage_log column names must not be empty");
        }
        Ok(())
    }
}

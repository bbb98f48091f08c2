use serde::Deserialize;

/// Billing formula parameters for one tariff.
///
/// `cost = round((base_rate_per_day * days + energy_rate_per_kwh * kwh) * tax_multiplier, 2)`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateSchedule {
    pub base_rate_per_day: f64,
    pub energy_rate_per_kwh: f64,
    pub tax_multiplier: f64,
}

impl Default for RateSchedule {
    fn default() -> Self {
        Self {
            base_rate_per_day: 0.80,
            energy_rate_per_kwh: 0.102566,
            tax_multiplier: 1.05,
        }
    }
}

impl RateSchedule {
    /// Amount billed for `kwh` over a period of `days`, rounded to cents.
    pub fn cost(&self, kwh: f64, days: u32) -> f64 {
        let base = self.base_rate_per_day * f64::from(days);
        let energy = self.energy_rate_per_kwh * kwh;
        round_cents((base + energy) * self.tax_multiplier)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let rates = [
            ("base_rate_per_day", self.base_rate_per_day),
            ("energy_rate_per_kwh", self.energy_rate_per_kwh),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("rates.{name} must be a non-negative number, got {value}");
            }
        }
        if !self.tax_multiplier.is_finite() || self.tax_multiplier <= 0.0 {
            anyhow::bail!(
                "rates.tax_multiplier must be a positive number, got {}",
                self.tax_multiplier
            );
        }
        Ok(())
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

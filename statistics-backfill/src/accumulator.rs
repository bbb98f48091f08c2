use recorder_client::domain::Period;
use time::OffsetDateTime;

use crate::cost::RateSchedule;

/// Running totals for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CumulativeTotals {
    pub kwh: f64,
    pub cost: f64,
}

/// Totals as of the end of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub period_end: OffsetDateTime,
    pub days: u32,
    pub period_cost: f64,
    pub cumulative_kwh: f64,
    pub cumulative_cost: f64,
}

impl CumulativeTotals {
    pub fn advance(self, period: &Period, rates: &RateSchedule) -> (Self, Snapshot) {
        let days = period.days();
        let period_cost = rates.cost(period.kwh, days);
        let next = Self {
            kwh: self.kwh + period.kwh,
            cost: self.cost + period_cost,
        };
        let snapshot = Snapshot {
            period_end: period.end,
            days,
            period_cost,
            cumulative_kwh: next.kwh,
            cumulative_cost: next.cost,
        };
        (next, snapshot)
    }
}

/// Fold periods left to right into one snapshot per period.
pub fn accumulate(periods: &[Period], rates: &RateSchedule) -> Vec<Snapshot> {
    periods
        .iter()
        .scan(CumulativeTotals::default(), |totals, period| {
            let (next, snapshot) = totals.advance(period, rates);
            *totals = next;
            Some(snapshot)
        })
        .collect()
}

use time::OffsetDateTime;

/// A closed billing period reconstructed from consecutive end-of-period readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub kwh: f64,
    /// True when `start` was derived from a nominal period length rather than
    /// from a preceding reading.
    pub start_inferred: bool,
    pub estimated: bool,
}

impl Period {
    /// Calendar days between the start and end dates, never less than one.
    pub fn days(&self) -> u32 {
        let days = (self.end.date() - self.start.date()).whole_days();
        u32::try_from(days.max(1)).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn period(start: OffsetDateTime, end: OffsetDateTime) -> Period {
        Period {
            start,
            end,
            kwh: 1.0,
            start_inferred: false,
            estimated: false,
        }
    }

    #[test]
    fn days_counts_calendar_dates_not_elapsed_hours() {
        let p = period(
            datetime!(2024-01-15 23:59:59 UTC),
            datetime!(2024-02-15 00:00:01 UTC),
        );
        assert_eq!(p.days(), 31);
    }

    #[test]
    fn days_is_clamped_to_one_for_same_day_or_reversed_bounds() {
        let same_day = period(
            datetime!(2024-01-15 01:00:00 UTC),
            datetime!(2024-01-15 23:00:00 UTC),
        );
        assert_eq!(same_day.days(), 1);

        let reversed = period(
            datetime!(2024-02-15 00:00:00 UTC),
            datetime!(2024-01-15 00:00:00 UTC),
        );
        assert_eq!(reversed.days(), 1);
    }

    #[test]
    fn days_uses_the_local_date_of_each_bound() {
        // 23:30 at -08:00 is already the next day in UTC; the local date must win.
        let p = period(
            datetime!(2024-01-14 23:30:00 -08:00),
            datetime!(2024-01-15 23:30:00 -08:00),
        );
        assert_eq!(p.days(), 1);

        let p = period(
            datetime!(2024-01-01 23:30:00 -08:00),
            datetime!(2024-01-31 23:30:00 -08:00),
        );
        assert_eq!(p.days(), 30);
    }
}

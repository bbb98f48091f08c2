use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// IANA zone used to interpret wall-clock timestamps in usage exports.
#[derive(Debug, Clone, Copy)]
pub struct LocalTimezone {
    tz: Tz,
}

impl LocalTimezone {
    pub const UTC: Self = Self { tz: Tz::UTC };

    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        let tz = name
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("unknown time zone '{name}': {e}"))?;
        Ok(Self { tz })
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Attach this zone's offset to a local wall-clock time.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant. Returns `None`
    /// for times skipped by a DST transition.
    pub fn localize(&self, local: PrimitiveDateTime) -> Option<OffsetDateTime> {
        let naive = NaiveDate::from_ymd_opt(
            local.year(),
            u32::from(u8::from(local.month())),
            u32::from(local.day()),
        )?
        .and_hms_nano_opt(
            u32::from(local.hour()),
            u32::from(local.minute()),
            u32::from(local.second()),
            local.nanosecond(),
        )?;

        let offset = self.tz.offset_from_local_datetime(&naive).earliest()?;
        let offset = UtcOffset::from_whole_seconds(offset.fix().local_minus_utc()).ok()?;
        Some(local.assume_offset(offset))
    }
}

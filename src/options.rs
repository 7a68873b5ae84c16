use chrono::{FixedOffset, Local, NaiveDate, Offset, TimeZone, Utc};

/// Which UTC offset is written after the local wall clock of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetStyle {
    /// The zone's standard offset, ignoring daylight saving time.
    #[default]
    Standard,
    /// The offset actually in force at that instant.
    Observed,
}

/// Settings shared by reading and writing.
///
/// Timestamps in a ledger file are written as a local wall clock plus an offset,
/// and both directions go through the zone configured here. Files only round
/// trip byte for byte when they are read and written with the zone they were
/// produced under.
#[derive(Debug, Clone)]
pub struct Options<Tz: TimeZone> {
    zone: Tz,
    offset_style: OffsetStyle,
}

impl<Tz: TimeZone> Options<Tz> {
    pub fn new(zone: Tz) -> Self {
        Options {
            zone,
            offset_style: OffsetStyle::default(),
        }
    }

    pub fn offset_style(mut self, style: OffsetStyle) -> Self {
        self.offset_style = style;
        self
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    pub fn style(&self) -> OffsetStyle {
        self.offset_style
    }

    /// The standard offset of the zone in `year`: the westernmost of the
    /// offsets on 1 January and 1 July.
    pub fn standard_offset(&self, year: i32) -> FixedOffset {
        [1, 7]
            .iter()
            .filter_map(|month| NaiveDate::from_ymd_opt(year, *month, 1))
            .map(|date| self.zone.offset_from_utc_date(&date).fix())
            .min_by_key(|offset| offset.local_minus_utc())
            .unwrap_or_else(|| Utc.fix())
    }

    /// The offset used as reference when a wall clock is decoded.
    pub(crate) fn reference_offset(&self, observed: FixedOffset, year: i32) -> FixedOffset {
        match self.offset_style {
            OffsetStyle::Standard => self.standard_offset(year),
            OffsetStyle::Observed => observed,
        }
    }
}

impl Default for Options<Local> {
    fn default() -> Self {
        Options::new(Local)
    }
}

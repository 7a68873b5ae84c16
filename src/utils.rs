//! Conversions between the text of a field and its typed value.

use crate::options::{OffsetStyle, Options};
use crate::{Error, GDate, Numeric, Source, Timestamp};
use chrono::{Datelike, Duration, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone};

/// Length of `YYYY-MM-DD HH:MM:SS ±HHMM`.
pub const TIMESTAMP_LEN: usize = 25;

const GDATE_LEN: usize = 10;

/// Parses a [`Numeric`] from a [`&str`], reporting failures at `src`.
pub fn parse_numeric(text: &str, src: &Source) -> Result<Numeric, Error> {
    text.parse::<Numeric>()
        .map_err(|msg| Error::format(msg, src.clone()))
}

pub fn parse_int(text: &str, src: &Source) -> Result<i32, Error> {
    text.trim()
        .parse::<i32>()
        .map_err(|_| Error::format(format!("Invalid integer: {:?}.", text), src.clone()))
}

/// `y` is true, anything else is false.
#[inline]
pub fn parse_bool(text: &str) -> bool {
    text == "y"
}

#[inline]
pub fn format_bool(value: bool) -> char {
    if value {
        'y'
    } else {
        'n'
    }
}

fn digits(bytes: &[u8]) -> Option<u32> {
    bytes.iter().try_fold(0u32, |acc, b| {
        if b.is_ascii_digit() {
            Some(acc * 10 + (b - b'0') as u32)
        } else {
            None
        }
    })
}

/// Parses a `YYYY-MM-DD` date by position.
pub fn parse_gdate(text: &str, src: &Source) -> Result<GDate, Error> {
    let invalid = || Error::format(format!("Invalid date: {:?}.", text), src.clone());
    let bytes = text.as_bytes();
    if bytes.len() != GDATE_LEN || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }
    let year = digits(&bytes[0..4]).ok_or_else(invalid)?;
    let month = digits(&bytes[5..7]).ok_or_else(invalid)?;
    let day = digits(&bytes[8..10]).ok_or_else(invalid)?;
    GDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)
}

pub fn format_gdate(date: &GDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Parses `YYYY-MM-DD HH:MM:SS ±HHMM`.
///
/// The wall clock is first placed in the configured zone, then moved from the
/// zone's reference offset (see [`OffsetStyle`]) to the offset written in the
/// text. A `+` offset lies east of UTC, so it is subtracted.
pub fn parse_timestamp<Tz: TimeZone>(
    text: &str,
    options: &Options<Tz>,
    src: &Source,
) -> Result<Timestamp, Error> {
    let invalid = |why: &str| {
        Error::format(
            format!("Invalid timestamp {:?}: {}.", text, why),
            src.clone(),
        )
    };
    if text.len() != TIMESTAMP_LEN || !text.is_ascii() {
        return Err(invalid("expected 25 characters"));
    }
    let wall = NaiveDateTime::parse_from_str(&text[..19], "%Y-%m-%d %H:%M:%S")
        .map_err(|e| invalid(&e.to_string()))?;
    let bytes = text.as_bytes();
    let sign = match (bytes[19], bytes[20]) {
        (b' ', b'+') => 1,
        (b' ', b'-') => -1,
        _ => return Err(invalid("missing offset")),
    };
    let hours = digits(&bytes[21..23]).ok_or_else(|| invalid("bad offset"))? as i32;
    let minutes = digits(&bytes[23..25]).ok_or_else(|| invalid("bad offset"))? as i32;
    let explicit = FixedOffset::east_opt(sign * (hours * 60 + minutes) * 60)
        .ok_or_else(|| invalid("offset out of range"))?;

    let observed = match options.zone().offset_from_local_datetime(&wall) {
        LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset.fix(),
        LocalResult::None => options.standard_offset(wall.year()),
    };
    let reference = options.reference_offset(observed, wall.year());
    let instant = wall - Duration::seconds(observed.local_minus_utc() as i64);
    let utc = instant
        + Duration::seconds((reference.local_minus_utc() - explicit.local_minus_utc()) as i64);
    Ok(explicit.from_utc_datetime(&utc))
}

fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let minutes = secs.abs() / 60;
    format!("{}{:02}{:02}", sign, minutes / 60, minutes % 60)
}

/// Renders the instant as a wall clock in the configured zone followed by the
/// offset selected by the [`OffsetStyle`].
pub fn format_timestamp<Tz: TimeZone>(timestamp: &Timestamp, options: &Options<Tz>) -> String {
    let local = timestamp.with_timezone(options.zone());
    let wall = local.naive_local();
    let offset = match options.style() {
        OffsetStyle::Standard => options.standard_offset(wall.year()),
        OffsetStyle::Observed => local.offset().fix(),
    };
    format!(
        "{} {}",
        wall.format("%Y-%m-%d %H:%M:%S"),
        format_offset(offset)
    )
}

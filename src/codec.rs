//! Byte-level codecs shared by every Scanco header dialect.
//!
//! All multi-byte integers on disk are little-endian. Floating point values
//! use Scanco's own representation: a rotated byte order with a pre-applied
//! scale of 4, so the decoder multiplies by 0.25 (and the encoder by 4).
//! Timestamps count 100-nanosecond ticks since the VMS epoch
//! (November 17, 1858).

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Offset between the astronomical Julian day count and the VMS epoch.
const JULIAN_OFFSET: u64 = 2_400_001;
const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60 * 1000;
const MILLIS_PER_HOUR: u64 = 3600 * 1000;
const MILLIS_PER_DAY: u64 = 3600 * 24 * 1000;
/// Days between the VMS epoch and the Unix epoch (1970-01-01).
const VMS_TO_UNIX_DAYS: u64 = 40_587;

const MONTHS: [&str; 13] = [
    "XXX", "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

pub(crate) fn read_i32(data: &[u8]) -> i32 {
    LittleEndian::read_i32(&data[..4])
}

pub(crate) fn write_i32(value: i32, target: &mut [u8]) {
    LittleEndian::write_i32(&mut target[..4], value);
}

pub(crate) fn read_i64(data: &[u8]) -> i64 {
    LittleEndian::read_i64(&data[..8])
}

pub(crate) fn write_i64(value: i64, target: &mut [u8]) {
    LittleEndian::write_i64(&mut target[..8], value);
}

/// Reassemble the 32-bit word from its rotated byte order.
fn scanco_word(data: &[u8]) -> u32 {
    u32::from(data[2])
        | u32::from(data[3]) << 8
        | u32::from(data[0]) << 16
        | u32::from(data[1]) << 24
}

fn scanco_word_bytes(word: u32, target: &mut [u8]) {
    target[0] = (word >> 16) as u8;
    target[1] = (word >> 24) as u8;
    target[2] = word as u8;
    target[3] = (word >> 8) as u8;
}

pub(crate) fn read_scanco_f32(data: &[u8]) -> f32 {
    0.25 * f32::from_bits(scanco_word(data))
}

pub(crate) fn write_scanco_f32(value: f32, target: &mut [u8]) {
    scanco_word_bytes((value * 4.0).to_bits(), target);
}

pub(crate) fn read_scanco_f64(data: &[u8]) -> f64 {
    let high = scanco_word(&data[0..4]);
    let low = scanco_word(&data[4..8]);
    0.25 * f64::from_bits((u64::from(high) << 32) | u64::from(low))
}

pub(crate) fn write_scanco_f64(value: f64, target: &mut [u8]) {
    let bits = (value * 4.0).to_bits();
    scanco_word_bytes((bits >> 32) as u32, &mut target[0..4]);
    scanco_word_bytes(bits as u32, &mut target[4..8]);
}

/// Gregorian calendar date from a Julian day number, per Fliegel and
/// Van Flandern. Valid for the Gregorian calendar from October 15, 1582.
fn gregorian_from_julian(julian_day: i64) -> (i64, i64, i64) {
    let mut l = julian_day + 68_569;
    let n = (4 * l) / 146_097;
    l -= (146_097 * n + 3) / 4;
    let i = (4000 * (l + 1)) / 1_461_001;
    l = l - (1461 * i) / 4 + 31;
    let j = (80 * l) / 2447;
    let day = l - (2447 * j) / 80;
    l = j / 11;
    let month = j + 2 - 12 * l;
    let year = 100 * (n - 49) + i + l;
    (year, month, day)
}

/// Julian day number from a Gregorian calendar date (inverse of
/// [`gregorian_from_julian`]).
fn julian_from_gregorian(year: i64, month: i64, day: i64) -> i64 {
    // January and February count as months 13 and 14 of the previous year
    let (year, month) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };
    let a = year / 100;
    let b = 2 - a + a / 4;
    (365.25 * (year + 4716) as f64) as i64 + (30.6001 * (month + 1) as f64) as i64 + day + b - 1524
}

/// Format VMS ticks as `"D-MMM-YYYY HH:MM:SS.mmm"`.
pub(crate) fn format_vms_ticks(ticks: u64) -> String {
    let mut time = ticks / 10_000 + JULIAN_OFFSET * MILLIS_PER_DAY;
    let julian_day = (time / MILLIS_PER_DAY) as i64;
    time -= julian_day as u64 * MILLIS_PER_DAY;

    let (year, month, day) = gregorian_from_julian(julian_day);
    let month = if (1..=12).contains(&month) { month } else { 0 };

    let hour = time / MILLIS_PER_HOUR;
    time -= hour * MILLIS_PER_HOUR;
    let minute = time / MILLIS_PER_MINUTE;
    time -= minute * MILLIS_PER_MINUTE;
    let second = time / MILLIS_PER_SECOND;
    let millis = time - second * MILLIS_PER_SECOND;

    format!(
        "{}-{}-{} {:02}:{:02}:{:02}.{:03}",
        day % 100,
        MONTHS[month as usize],
        year % 10_000,
        hour,
        minute,
        second,
        millis
    )
}

/// Decode an 8-byte VMS timestamp into its formatted string form.
pub(crate) fn decode_vms_date(data: &[u8]) -> String {
    format_vms_ticks(LittleEndian::read_u64(&data[..8]))
}

/// Parse a `"D-MMM-YYYY HH:MM:SS.mmm"` string back into VMS ticks.
///
/// The month is matched case-insensitively; an unknown month maps to 0
/// (`XXX`), mirroring the formatter.
pub(crate) fn parse_vms_date(date: &str) -> Result<u64> {
    let bad = || Error::BadHeader(format!("unparseable date string: {date:?}"));

    let (date_part, time_part) = date.trim().split_once(' ').ok_or_else(bad)?;
    let mut fields = date_part.splitn(3, '-');
    let day: i64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let month_name = fields.next().ok_or_else(bad)?;
    let year: i64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;

    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))
        .unwrap_or(0) as i64;

    let (clock, millis) = time_part.trim().split_once('.').ok_or_else(bad)?;
    let mut clock = clock.splitn(3, ':');
    let hour: u64 = clock.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute: u64 = clock.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let second: u64 = clock.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let millis: u64 = millis.trim().parse().map_err(|_| bad())?;

    let julian_day = julian_from_gregorian(year, month, day);
    let day_millis =
        hour * MILLIS_PER_HOUR + minute * MILLIS_PER_MINUTE + second * MILLIS_PER_SECOND + millis;
    let total = julian_day as u64 * MILLIS_PER_DAY + day_millis;
    if total < JULIAN_OFFSET * MILLIS_PER_DAY {
        return Err(bad());
    }
    Ok((total - JULIAN_OFFSET * MILLIS_PER_DAY) * 10_000)
}

/// Encode a formatted date string as an 8-byte VMS timestamp.
pub(crate) fn encode_vms_date(date: &str, target: &mut [u8]) -> Result<()> {
    let ticks = parse_vms_date(date)?;
    LittleEndian::write_u64(&mut target[..8], ticks);
    Ok(())
}

/// Current system time as VMS ticks.
pub(crate) fn current_vms_ticks() -> u64 {
    let since_unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (since_unix.as_millis() as u64 + VMS_TO_UNIX_DAYS * MILLIS_PER_DAY) * 10_000
}

/// Current system time in the header's formatted string form.
pub(crate) fn current_date_string() -> String {
    format_vms_ticks(current_vms_ticks())
}

/// Copy a fixed-width field up to the first NUL, dropping trailing spaces.
pub(crate) fn strip_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let mut field = &raw[..end];
    while let [rest @ .., b' '] = field {
        field = rest;
    }
    String::from_utf8_lossy(field).into_owned()
}

/// Copy a string into a fixed-width field, space-padded, no terminator.
pub(crate) fn pad_string(target: &mut [u8], source: &str) {
    let bytes = source.as_bytes();
    let n = bytes.len().min(target.len());
    target[..n].copy_from_slice(&bytes[..n]);
    for b in &mut target[n..] {
        *b = b' ';
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_roundtrip_extremes() {
        let mut buf = [0u8; 4];
        for value in [i32::MIN, -1, 0, 1, 0x1234_5678, i32::MAX] {
            write_i32(value, &mut buf);
            assert_eq!(read_i32(&buf), value);
        }
    }

    #[test]
    fn test_i64_roundtrip_extremes() {
        let mut buf = [0u8; 8];
        for value in [i64::MIN, -1, 0, 1, 0x1234_5678_9abc_def0, i64::MAX] {
            write_i64(value, &mut buf);
            assert_eq!(read_i64(&buf), value);
        }
    }

    #[test]
    fn test_scanco_f32_word_roundtrip() {
        // encode(decode(w)) == w for words that survive the x4 scale
        for word in [0u32, 0x3f80_0000, 0x4120_0000, 0x1234_5678, 0xbf00_0000] {
            let mut buf = [0u8; 4];
            scanco_word_bytes(word, &mut buf);
            let value = read_scanco_f32(&buf);
            let mut back = [0u8; 4];
            write_scanco_f32(value, &mut back);
            assert_eq!(buf, back, "word {word:#010x}");
        }
    }

    #[test]
    fn test_scanco_f32_value_roundtrip() {
        let mut buf = [0u8; 4];
        for value in [0.0f32, 1.0, -2.5, 0.0607, 8192.0, 0.7033] {
            write_scanco_f32(value, &mut buf);
            assert_eq!(read_scanco_f32(&buf), value);
        }
    }

    #[test]
    fn test_scanco_f64_value_roundtrip() {
        let mut buf = [0u8; 8];
        for value in [0.0f64, 1.0, -1000.0, 1603.519, 0.24090, 0.347136] {
            write_scanco_f64(value, &mut buf);
            assert_eq!(read_scanco_f64(&buf), value);
        }
    }

    #[test]
    fn test_vms_epoch_formats_to_origin() {
        assert_eq!(format_vms_ticks(0), "17-NOV-1858 00:00:00.000");
    }

    #[test]
    fn test_date_parse_known_value() {
        // one day of ticks past the epoch
        let ticks = 24 * 3600 * 10_000_000;
        assert_eq!(format_vms_ticks(ticks), "18-NOV-1858 00:00:00.000");
        assert_eq!(parse_vms_date("18-NOV-1858 00:00:00.000").unwrap(), ticks);
    }

    #[test]
    fn test_date_roundtrip_1900_to_2100() {
        // sample the range at an awkward stride to hit month/year boundaries
        let start = parse_vms_date("1-JAN-1900 00:00:00.000").unwrap();
        let end = parse_vms_date("1-JAN-2100 00:00:00.000").unwrap();
        let stride = 37 * 24 * 3600 * 10_000_000 + 123_450_000;
        let mut ticks = start;
        while ticks < end {
            let formatted = format_vms_ticks(ticks);
            let reparsed = parse_vms_date(&formatted).unwrap();
            // formatter floors to milliseconds
            assert_eq!(reparsed, ticks / 10_000 * 10_000, "at {formatted}");
            ticks += stride;
        }
    }

    #[test]
    fn test_date_month_case_insensitive() {
        let upper = parse_vms_date("7-MAY-2023 01:02:03.004").unwrap();
        let lower = parse_vms_date("7-may-2023 01:02:03.004").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_date_unknown_month_maps_to_xxx() {
        // unknown month parses as month 0 rather than failing
        assert!(parse_vms_date("7-ZZZ-2023 01:02:03.004").is_ok());
    }

    #[test]
    fn test_date_garbage_rejected() {
        assert!(parse_vms_date("not a date").is_err());
        assert!(parse_vms_date("7-MAY-2023").is_err());
        assert!(parse_vms_date("").is_err());
    }

    #[test]
    fn test_strip_pad_idempotent() {
        let mut field = [0u8; 16];
        for s in ["", "A", "mg HA/ccm", "sixteen chars ok"] {
            pad_string(&mut field, s);
            assert_eq!(strip_string(&field), s.trim_end());
        }
    }

    #[test]
    fn test_strip_stops_at_nul() {
        let raw = b"CTDATA\0garbage after nul";
        assert_eq!(strip_string(raw), "CTDATA");
    }

    #[test]
    fn test_pad_truncates_long_source() {
        let mut field = [0u8; 4];
        pad_string(&mut field, "toolong");
        assert_eq!(&field, b"tool");
    }
}

//! rapic-odim: Polar volume sink contract and volume assembly helpers.
//!
//! Decoded rapic scans are typically collected into volumes and written to
//! an ODIM_H5 polar volume file. The HDF5 writer itself is an external
//! collaborator; this crate specifies its contract ([`VolumeWriter`]) and
//! provides the pure pieces any writer needs: rapic timestamp parsing,
//! product label time derivation, output file naming, and grouping of a
//! scan stream into volumes and tilts.

use std::path::Path;

use rapic_core::{DecodeError, Result};
use rapic_protocol::Scan;

/// Sink for a completed polar volume.
///
/// Implementations map a list of scans onto their storage schema and
/// return the derived volume time as seconds since epoch. Callers must
/// ensure that all scans are of the VOLUMETRIC product type, belong to a
/// single product instance, and are sorted such that the passes of each
/// tilt are grouped together; the first scan lands in the first dataset.
pub trait VolumeWriter {
    /// Write one volume to `path` and return the volume time.
    fn write_volume(&mut self, path: &Path, scans: &[Scan]) -> Result<i64>;
}

/// Parse a rapic `TIMESTAMP` header value (`YYYYMMDDHHMMSS`, UTC) into
/// seconds since epoch.
pub fn parse_timestamp(value: &str) -> std::result::Result<i64, DecodeError> {
    let digits = value.as_bytes();
    if digits.len() < 14 || !digits[..14].iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::new("invalid rapic timestamp"));
    }
    let field = |from: usize, len: usize| -> i64 {
        value[from..from + len].parse().unwrap_or(0)
    };
    let year = field(0, 4);
    let month = field(4, 2);
    let day = field(6, 2);
    let hour = field(8, 2);
    let minute = field(10, 2);
    let second = field(12, 2);
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 60
    {
        return Err(DecodeError::new("invalid rapic timestamp"));
    }
    Ok(days_from_civil(year, month as u32, day as u32) * 86400
        + hour * 3600
        + minute * 60
        + second)
}

/// Derive the product time from a `VOLUMETRIC [HHMMDDDYY]` product label:
/// hour, minute, day of year and two-digit year (70..99 are 19xx, 00..69
/// are 20xx).
pub fn product_timestamp(product: &str) -> std::result::Result<i64, DecodeError> {
    let inner = product
        .strip_prefix("VOLUMETRIC [")
        .ok_or_else(|| DecodeError::new("invalid PRODUCT header"))?;
    let digits = inner.as_bytes();
    if digits.len() < 9 || !digits[..9].iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::new("invalid PRODUCT header"));
    }
    let field = |from: usize, len: usize| -> i64 {
        inner[from..from + len].parse().unwrap_or(0)
    };
    let hour = field(0, 2);
    let minute = field(2, 2);
    let day_of_year = field(4, 3);
    let year2 = field(7, 2);
    if hour > 23 || minute > 59 || !(1..=366).contains(&day_of_year) {
        return Err(DecodeError::new("invalid PRODUCT header"));
    }

    let year = if year2 < 70 { 2000 + year2 } else { 1900 + year2 };
    Ok(days_from_civil(year, 1, 1) * 86400
        + (day_of_year - 1) * 86400
        + hour * 3600
        + minute * 60)
}

/// Derive the product time of a volume from its first scan.
pub fn volume_time(scans: &[Scan]) -> std::result::Result<i64, DecodeError> {
    let first = scans
        .first()
        .ok_or_else(|| DecodeError::new("empty scan set"))?;
    product_timestamp(first.product())
}

/// Build the conventional output file name for a volume:
/// `<station>_YYYYMMDD_HHMM00.pvol.h5`.
pub fn volume_filename(station_id: i32, time: i64) -> String {
    let days = time.div_euclid(86400);
    let secs = time.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days);
    let hour = secs / 3600;
    let minute = secs % 3600 / 60;
    format!("{station_id}_{year:04}{month:02}{day:02}_{hour:02}{minute:02}00.pvol.h5")
}

/// Split a stream of scans into consecutive volumes.
///
/// A new volume starts whenever the station or product instance changes;
/// within one volume every scan carries the same product string.
pub fn group_volumes(scans: &[Scan]) -> Vec<&[Scan]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=scans.len() {
        if i == scans.len()
            || scans[i].product() != scans[start].product()
            || scans[i].station_id() != scans[start].station_id()
        {
            groups.push(&scans[start..i]);
            start = i;
        }
    }
    groups
}

/// Split the scans of one volume into tilts.
///
/// Consecutive scans sharing a `TILT` header (or failing that, the same
/// `ELEV` value) form one tilt; its scans are the passes of that tilt in
/// transmission order.
pub fn group_tilts(scans: &[Scan]) -> Vec<&[Scan]> {
    fn tilt_key(scan: &Scan) -> Option<&str> {
        scan.find_header("TILT")
            .or_else(|| scan.find_header("ELEV"))
            .map(|h| h.value())
    }

    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=scans.len() {
        if i == scans.len() || tilt_key(&scans[i]) != tilt_key(&scans[start]) {
            groups.push(&scans[start..i]);
            start = i;
        }
    }
    groups
}

/// Days from 1970-01-01 for a proleptic Gregorian civil date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let year_of_era = year - era * 400;
    let month_index = i64::from(if month > 2 { month - 3 } else { month + 9 });
    let day_of_year = (153 * month_index + 2) / 5 + i64::from(day) - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146097 + day_of_era - 719468
}

/// Civil date from days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let day_of_era = z - era * 146097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146096) / 365;
    let year = year_of_era + era * 400;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * month_index + 2) / 5 + 1) as u32;
    let month = (if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

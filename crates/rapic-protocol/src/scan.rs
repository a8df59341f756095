//! The rapic scan message: headers, ray decoding and encoding.
//!
//! A scan is a single radar sweep at one elevation (PPI) or azimuth (RHI).
//! On the wire it is a sequence of `NAME:value` header lines followed by
//! the rays, terminated by an `END RADAR IMAGE` line. Rays arrive in one
//! of two encodings:
//!
//! - `%` rays: an ASCII angle followed by payload bytes translated through
//!   the [`LOOKUP`] table (absolute levels, decimal run lengths of the
//!   previous level, and two-sample deltas);
//! - `@` rays: an ASCII `azimuth,elevation,seconds=` header (plus two ray
//!   length bytes the decoder ignores) followed by binary bytes where 0
//!   and 1 start a `(value, count)` run, a count of zero ends the ray, and
//!   every other byte is a single absolute level.
//!
//! Ray geometry is derived from the headers when the first ray arrives;
//! rays are stored in arrival order and never reordered.

use std::fmt::Write as _;

use rapic_core::{DecodeError, Error, MessageType, Result};

use crate::buffer::Buffer;
use crate::lookup::{level_byte, RayCode, LOOKUP};
use crate::message::Message;
use crate::wire::SCAN_TERM;

/// Tolerance when checking that a span is an exact multiple of a
/// resolution, in the units of the span.
const GEOMETRY_TOLERANCE: f64 = 1e-3;

/// A scan header: an ordered `(name, value)` pair of printable ASCII.
///
/// Duplicate names are permitted; lookups return the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Create a header from a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Header {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Get the name of the header.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the header value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Interpret the value as a boolean.
    ///
    /// `true`/`on`/`yes`/`1` and `false`/`off`/`no`/`0` are accepted,
    /// case-insensitively.
    pub fn get_boolean(&self) -> std::result::Result<bool, DecodeError> {
        let v = self.value.as_str();
        if ["true", "on", "yes", "1"].iter().any(|t| v.eq_ignore_ascii_case(t)) {
            return Ok(true);
        }
        if ["false", "off", "no", "0"].iter().any(|t| v.eq_ignore_ascii_case(t)) {
            return Ok(false);
        }
        Err(DecodeError::new("bad boolean value"))
    }

    /// Interpret the value as a base-10 integer.
    ///
    /// Trailing tokens after the number are ignored.
    pub fn get_integer(&self) -> std::result::Result<i64, DecodeError> {
        self.value
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| DecodeError::new("bad integer value"))
    }

    /// Interpret the value as a real number.
    ///
    /// Trailing tokens after the number are ignored.
    pub fn get_real(&self) -> std::result::Result<f64, DecodeError> {
        self.value
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| DecodeError::new("bad real value"))
    }

    /// Interpret the value as a whitespace-separated integer array.
    pub fn get_integer_array(&self) -> std::result::Result<Vec<i64>, DecodeError> {
        self.value
            .split_whitespace()
            .map(|t| t.parse().map_err(|_| DecodeError::new("bad integer value")))
            .collect()
    }

    /// Interpret the value as a whitespace-separated real array.
    pub fn get_real_array(&self) -> std::result::Result<Vec<f64>, DecodeError> {
        self.value
            .split_whitespace()
            .map(|t| t.parse().map_err(|_| DecodeError::new("bad real value")))
            .collect()
    }
}

/// Information about a single ray.
///
/// Elevation and time offset are only carried by binary rays; ASCII rays
/// leave them at their absent sentinels (NaN and -1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHeader {
    azimuth: f32,
    elevation: f32,
    time_offset: i32,
}

impl RayHeader {
    /// Create a ray header carrying only an angle.
    pub fn new(azimuth: f32) -> RayHeader {
        RayHeader {
            azimuth,
            elevation: f32::NAN,
            time_offset: -1,
        }
    }

    /// Create a fully populated ray header.
    pub fn with_details(azimuth: f32, elevation: f32, time_offset: i32) -> RayHeader {
        RayHeader {
            azimuth,
            elevation,
            time_offset,
        }
    }

    /// Get the azimuth at the center of this ray (degrees).
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Get the elevation at the center of this ray (degrees); NaN when
    /// absent.
    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    /// Get the time offset from the start of the scan to this ray
    /// (seconds); -1 when absent.
    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }
}

/// Radar scan message.
#[derive(Debug, Clone)]
pub struct Scan {
    headers: Vec<Header>,
    ray_headers: Vec<RayHeader>,
    rays: usize,
    bins: usize,
    level_data: Vec<u8>,

    // cached from the headers due to likelihood of frequent access
    station_id: i32,
    volume_id: i32,
    product: String,
    pass: i32,
    pass_count: i32,
    is_rhi: bool,
    angle_min: f32,
    angle_max: f32,
    angle_resolution: f32,
}

impl Default for Scan {
    fn default() -> Self {
        Scan {
            headers: Vec::new(),
            ray_headers: Vec::new(),
            rays: 0,
            bins: 0,
            level_data: Vec::new(),
            station_id: -1,
            volume_id: -1,
            product: String::new(),
            pass: -1,
            pass_count: -1,
            is_rhi: false,
            angle_min: f32::NAN,
            angle_max: f32::NAN,
            angle_resolution: f32::NAN,
        }
    }
}

impl Scan {
    /// Construct an empty scan.
    pub fn new() -> Scan {
        Scan::default()
    }

    /// Get the station identifier.
    pub fn station_id(&self) -> i32 {
        self.station_id
    }

    /// Get the volume identifier, or -1 if there is none.
    pub fn volume_id(&self) -> i32 {
        self.volume_id
    }

    /// Get the product string.
    ///
    /// This value is normally shared by every scan message belonging to
    /// one complete product; a volume product contains many passes which
    /// each carry the same string.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Get the pass number, or -1 if unavailable.
    pub fn pass(&self) -> i32 {
        self.pass
    }

    /// Get the number of passes in the containing product, or -1 if
    /// unavailable.
    pub fn pass_count(&self) -> i32 {
        self.pass_count
    }

    /// Whether this scan is an RHI (sweep in elevation) rather than a PPI.
    pub fn is_rhi(&self) -> bool {
        self.is_rhi
    }

    /// Get the minimum angle of the scan (degrees).
    ///
    /// 0 for a complete sweep, otherwise taken from the SECTOR limits of
    /// the product header.
    pub fn angle_min(&self) -> f32 {
        self.angle_min
    }

    /// Get the maximum angle of the scan (degrees).
    pub fn angle_max(&self) -> f32 {
        self.angle_max
    }

    /// Get the angular width of a single ray (degrees).
    pub fn angle_resolution(&self) -> f32 {
        self.angle_resolution
    }

    /// Access all scan headers in wire order.
    ///
    /// Every header is available here, including those exposed through the
    /// cached accessors.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Find a header by name; the first match wins.
    pub fn find_header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.name == name)
    }

    /// Append a header.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// Access the per-ray information in arrival order.
    pub fn ray_headers(&self) -> &[RayHeader] {
        &self.ray_headers
    }

    /// Get the number of rays (rows) in the level data array.
    pub fn rays(&self) -> usize {
        self.rays
    }

    /// Get the number of bins (columns) in the level data array.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Access the scan data encoded as levels, row-major `rays x bins`.
    pub fn level_data(&self) -> &[u8] {
        &self.level_data
    }

    /// Access the levels of a single ray, by arrival order.
    pub fn ray_levels(&self, ray: usize) -> &[u8] {
        &self.level_data[ray * self.bins..(ray + 1) * self.bins]
    }

    /// Replace the ray data of this scan.
    ///
    /// Used when building a scan for transmission. The level data must be
    /// row-major with one row per ray header.
    pub fn set_ray_data(
        &mut self,
        bins: usize,
        ray_headers: Vec<RayHeader>,
        level_data: Vec<u8>,
    ) -> Result<()> {
        if level_data.len() != ray_headers.len() * bins {
            return Err(Error::InvalidState("level data does not match ray dimensions"));
        }
        self.rays = ray_headers.len();
        self.bins = bins;
        self.ray_headers = ray_headers;
        self.level_data = level_data;
        Ok(())
    }

    /// Map an angle to its row index, using the scan geometry.
    ///
    /// The angle must land on a multiple of the angular resolution from
    /// the minimum angle (within a small tolerance), otherwise `None` is
    /// returned. Rays are stored in arrival order, so this is only
    /// meaningful to callers reordering rays by angle.
    pub fn ray_index(&self, angle: f32) -> Option<usize> {
        if self.rays == 0 || !(self.angle_resolution > 0.0) {
            return None;
        }
        let rel = f64::from(angle - self.angle_min).rem_euclid(360.0);
        let index = (rel / f64::from(self.angle_resolution)).round();
        if (rel - index * f64::from(self.angle_resolution)).abs() > GEOMETRY_TOLERANCE {
            return None;
        }
        Some(index as usize % self.rays)
    }

    /// Decode a scan from a raw byte slice, returning the number of bytes
    /// consumed.
    ///
    /// The slice must contain a complete scan (up to and including its
    /// `END RADAR IMAGE` line); bytes past the terminator are ignored.
    /// This form is useful for walking archive files of concatenated
    /// scans without a connection.
    pub fn decode_slice(&mut self, data: &[u8]) -> std::result::Result<usize, DecodeError> {
        self.decode_impl(data).map_err(|cause| self.describe_failure(cause))
    }

    /// Augment a decode failure with the identifying headers seen so far.
    fn describe_failure(&self, cause: DecodeError) -> DecodeError {
        let mut desc = String::from("failed to decode scan");
        for (name, label) in [
            ("STNID", "stnid"),
            ("NAME", "name"),
            ("PRODUCT", "product"),
            ("TILT", "tilt"),
            ("PASS", "pass"),
            ("VIDEO", "video"),
        ] {
            if let Some(header) = self.find_header(name) {
                let _ = write!(desc, " {}: {}", label, header.value());
            }
        }
        DecodeError::context(desc, cause)
    }

    fn decode_impl(&mut self, data: &[u8]) -> std::result::Result<usize, DecodeError> {
        self.reset_state();

        let size = data.len();
        let mut pos = 0usize;
        while pos < size {
            let next = data[pos];
            if next == b'%' {
                pos = self.decode_ascii_ray(data, pos + 1)?;
            } else if next == b'@' {
                pos = self.decode_binary_ray(data, pos + 1)?;
            } else if next > b' ' {
                match self.decode_header(data, pos)? {
                    HeaderOutcome::Continue(at) => pos = at,
                    HeaderOutcome::EndOfScan(at) => return Ok(at),
                }
            } else {
                pos += 1;
            }
        }

        Err(DecodeError::new("unterminated scan"))
    }

    /// Decode one `%` ray starting just past the marker byte.
    fn decode_ascii_ray(&mut self, data: &[u8], mut pos: usize) -> std::result::Result<usize, DecodeError> {
        let size = data.len();

        if self.ray_headers.is_empty() {
            self.initialize_rays()?;
        }
        if self.ray_headers.len() == self.rays {
            return Err(DecodeError::new("scan data overflow (too many rays)"));
        }
        if pos + 4 >= size {
            return Err(DecodeError::new("truncated ray header"));
        }

        // the angle is 3 ASCII digits for a PPI, 4 for an RHI
        let angle_len = if self.is_rhi { 4 } else { 3 };
        let angle: f32 = std::str::from_utf8(&data[pos..pos + angle_len])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| DecodeError::new("invalid ascii ray header"))?;
        pos += angle_len;

        self.ray_headers.push(RayHeader::new(angle));
        let row = (self.ray_headers.len() - 1) * self.bins;
        let bins = self.bins;

        let mut prev: i32 = 0;
        let mut bin = 0usize;
        while pos < size {
            let code = LOOKUP[data[pos] as usize];
            pos += 1;
            match code {
                // absolute level value
                RayCode::Value(v) => {
                    if bin < bins {
                        self.level_data[row + bin] = v;
                        prev = i32::from(v);
                        bin += 1;
                    } else {
                        return Err(DecodeError::new("scan data overflow (ascii absolute)"));
                    }
                }
                // run length encoding of the previous value
                RayCode::Digit(d) => {
                    let mut count = usize::from(d);
                    while pos < size {
                        if let RayCode::Digit(d2) = LOOKUP[data[pos] as usize] {
                            count = count * 10 + usize::from(d2);
                            pos += 1;
                        } else {
                            break;
                        }
                    }
                    if bin + count > bins {
                        return Err(DecodeError::new("scan data overflow (ascii rle)"));
                    }
                    for _ in 0..count {
                        self.level_data[row + bin] = prev as u8;
                        bin += 1;
                    }
                }
                // delta encoding.  an overflow caused by the second half of
                // a delta at the end of the ray is silently ignored as an
                // artefact of the encoding process
                RayCode::Delta(d1, d2) => {
                    if bin < bins {
                        prev += i32::from(d1);
                        self.level_data[row + bin] = prev as u8;
                        bin += 1;
                    } else {
                        return Err(DecodeError::new("scan data overflow (ascii delta)"));
                    }

                    if bin < bins {
                        prev += i32::from(d2);
                        self.level_data[row + bin] = prev as u8;
                        bin += 1;
                    } else if pos < size && LOOKUP[data[pos] as usize] != RayCode::Terminate {
                        return Err(DecodeError::new("scan data overflow (ascii delta)"));
                    }
                }
                // null or end of line - end of the radial
                RayCode::Terminate => {
                    /* some radars corrupt the stream with extra newlines
                     * mid-ray.  if the next non-whitespace byte starts
                     * neither a ray nor the scan terminator, treat this
                     * newline as stray and keep decoding the ray. */
                    let mut i = pos;
                    while i < size && data[i] <= b' ' {
                        i += 1;
                    }
                    if i < size
                        && data[i] != b'%'
                        && data[i] != b'@'
                        && !data[i..].starts_with(SCAN_TERM)
                    {
                        continue;
                    }
                    break;
                }
                RayCode::Error => {
                    return Err(DecodeError::new(
                        "invalid character encountered in ray encoding",
                    ));
                }
            }
        }

        Ok(pos)
    }

    /// Decode one `@` ray starting just past the marker byte.
    fn decode_binary_ray(&mut self, data: &[u8], mut pos: usize) -> std::result::Result<usize, DecodeError> {
        let size = data.len();

        if self.ray_headers.is_empty() {
            self.initialize_rays()?;
        }
        if self.ray_headers.len() == self.rays {
            return Err(DecodeError::new("scan data overflow (too many rays)"));
        }
        if pos + 18 >= size {
            return Err(DecodeError::new("truncated ray header"));
        }

        // 18 header bytes: "azi,el,sec=" plus a two byte ray length which
        // is ignored
        let (azimuth, elevation, seconds) = parse_binary_ray_header(&data[pos..pos + 18])
            .ok_or_else(|| DecodeError::new("invalid binary ray header"))?;
        pos += 18;

        self.ray_headers
            .push(RayHeader::with_details(azimuth, elevation, seconds));
        let row = (self.ray_headers.len() - 1) * self.bins;
        let bins = self.bins;

        let mut bin = 0usize;
        loop {
            if pos >= size {
                return Err(DecodeError::new("truncated binary ray"));
            }
            let value = data[pos];
            pos += 1;
            if value <= 1 {
                if pos >= size {
                    return Err(DecodeError::new("truncated binary ray"));
                }
                let count = usize::from(data[pos]);
                pos += 1;
                if count == 0 {
                    break;
                }
                if bin + count > bins {
                    return Err(DecodeError::new("scan data overflow (binary rle)"));
                }
                for _ in 0..count {
                    self.level_data[row + bin] = value;
                    bin += 1;
                }
            } else if bin < bins {
                self.level_data[row + bin] = value;
                bin += 1;
            } else {
                return Err(DecodeError::new("scan data overflow (binary absolute)"));
            }
        }

        Ok(pos)
    }

    /// Decode one header line, or the scan terminator.
    fn decode_header(&mut self, data: &[u8], pos: usize) -> std::result::Result<HeaderOutcome, DecodeError> {
        let size = data.len();

        // find the end of the header name (spaces are valid name bytes)
        let mut name_end = pos + 1;
        while name_end < size && data[name_end] >= b' ' && data[name_end] != b':' {
            name_end += 1;
        }

        // no colon means either the end of the scan or corruption
        if name_end >= size || data[name_end] != b':' {
            if &data[pos..name_end] == SCAN_TERM {
                return Ok(HeaderOutcome::EndOfScan(name_end));
            }
            return Err(DecodeError::new("malformed scan header"));
        }

        // find the start of the header value
        let mut value_start = name_end + 1;
        while value_start < size && data[value_start] <= b' ' {
            value_start += 1;
        }
        if value_start == size {
            return Err(DecodeError::new("malformed scan header"));
        }

        // find the end of the header value (spaces are valid value bytes)
        let mut value_end = value_start + 1;
        while value_end < size && data[value_end] >= b' ' {
            value_end += 1;
        }

        self.headers.push(Header::new(
            String::from_utf8_lossy(&data[pos..name_end]).into_owned(),
            String::from_utf8_lossy(&data[value_start..value_end]).into_owned(),
        ));

        Ok(HeaderOutcome::Continue(value_end + 1))
    }

    /// Materialize the scan geometry from the headers, immediately before
    /// the first ray is stored.
    fn initialize_rays(&mut self) -> std::result::Result<(), DecodeError> {
        self.station_id = self.get_header_integer("STNID")? as i32;
        if let Some(header) = self.find_header("VOLUMEID") {
            self.volume_id = header.get_integer()? as i32;
        }
        self.product = self.get_header_string("PRODUCT")?.to_string();
        if let Some(header) = self.find_header("PASS") {
            let (pass, count) = parse_n_of_m(header.value())
                .ok_or_else(|| DecodeError::new("invalid PASS header"))?;
            self.pass = pass;
            self.pass_count = count;
        }
        self.is_rhi = self.get_header_string("IMGFMT")? == "RHI";

        self.angle_resolution = self.get_header_real("ANGRES")? as f32;
        let rngres = self.get_header_real("RNGRES")?;
        let startrng = self.get_header_real("STARTRNG")?;
        let endrng = self.get_header_real("ENDRNG")?;

        // sector products limit the sweep to their angle range
        if let Some((angle1, angle2, increasing)) = parse_sector(&self.product) {
            let (min, mut max) = if increasing != 0 {
                (angle1, angle2)
            } else {
                (angle2, angle1)
            };
            while max <= min {
                max += 360.0;
            }
            self.angle_min = min;
            self.angle_max = max;
        } else {
            self.angle_min = 0.0;
            self.angle_max = 360.0;
        }

        let span = f64::from(self.angle_max - self.angle_min);
        let resolution = f64::from(self.angle_resolution);
        let rays = (span / resolution).round();
        if !rays.is_finite() || rays < 0.0 || !((span - rays * resolution).abs() <= GEOMETRY_TOLERANCE)
        {
            return Err(DecodeError::new("ANGRES is not a factor of sweep length"));
        }

        let range_span = endrng - startrng;
        let bins = (range_span / rngres).round();
        if !bins.is_finite()
            || bins < 0.0
            || !((range_span - bins * rngres).abs() <= GEOMETRY_TOLERANCE)
        {
            return Err(DecodeError::new("RNGRES is not a factor of range span"));
        }

        self.rays = rays as usize;
        self.bins = bins as usize;
        let cells = self
            .rays
            .checked_mul(self.bins)
            .ok_or_else(|| DecodeError::new("scan dimensions too large"))?;
        self.ray_headers.reserve(self.rays);
        self.level_data = vec![0; cells];
        Ok(())
    }

    fn get_header_string(&self, name: &str) -> std::result::Result<&str, DecodeError> {
        self.find_header(name)
            .map(Header::value)
            .ok_or_else(|| DecodeError::new(format!("missing mandatory header {name}")))
    }

    fn get_header_integer(&self, name: &str) -> std::result::Result<i64, DecodeError> {
        self.find_header(name)
            .ok_or_else(|| DecodeError::new(format!("missing mandatory header {name}")))?
            .get_integer()
    }

    fn get_header_real(&self, name: &str) -> std::result::Result<f64, DecodeError> {
        self.find_header(name)
            .ok_or_else(|| DecodeError::new(format!("missing mandatory header {name}")))?
            .get_real()
    }

    fn reset_state(&mut self) {
        *self = Scan::default();
    }

    /// Encode the rays in the 16/32/64/160 level ASCII form.
    fn encode_ascii_rays(&self, wire: &mut Vec<u8>) -> Result<()> {
        for (ray, header) in self.ray_headers.iter().enumerate() {
            let angle = header.azimuth().round() as i32;
            if self.is_rhi {
                wire.extend_from_slice(format!("%{angle:04}").as_bytes());
            } else {
                wire.extend_from_slice(format!("%{angle:03}").as_bytes());
            }

            let row = self.ray_levels(ray);
            let mut bin = 0usize;
            while bin < self.bins {
                let value = row[bin];
                let byte = level_byte(value).ok_or(Error::InvalidState(
                    "level exceeds ascii encoding range",
                ))?;
                wire.push(byte);

                let mut run = 1usize;
                while bin + run < self.bins && row[bin + run] == value {
                    run += 1;
                }
                if run > 1 {
                    wire.extend_from_slice((run - 1).to_string().as_bytes());
                }
                bin += run;
            }
            wire.push(b'\n');
        }
        Ok(())
    }

    /// Encode the rays in the 256 level binary form.
    fn encode_binary_rays(&self, wire: &mut Vec<u8>) {
        for (ray, header) in self.ray_headers.iter().enumerate() {
            wire.extend_from_slice(
                format!(
                    "@{},{},{:03}=",
                    format_ray_angle(header.azimuth()),
                    format_ray_angle(header.elevation()),
                    header.time_offset()
                )
                .as_bytes(),
            );

            // two byte length, patched once the ray has been written
            let length_at = wire.len();
            wire.extend_from_slice(&[0, 0]);

            let row = self.ray_levels(ray);
            let mut bin = 0usize;
            while bin < self.bins {
                let value = row[bin];
                if value <= 1 {
                    let mut run = 1usize;
                    while run < 255 && bin + run < self.bins && row[bin + run] == value {
                        run += 1;
                    }
                    wire.push(value);
                    wire.push(run as u8);
                    bin += run;
                } else {
                    wire.push(value);
                    bin += 1;
                }
            }
            wire.push(0);
            wire.push(0);

            let ray_len = wire.len() - length_at - 2;
            wire[length_at] = ((ray_len >> 8) & 0x0f) as u8;
            wire[length_at + 1] = (ray_len & 0x0f) as u8;
        }
    }
}

/// What a decoded header line turned out to be.
enum HeaderOutcome {
    /// A header was stored; continue at the given position.
    Continue(usize),
    /// The `END RADAR IMAGE` terminator; decoding is complete.
    EndOfScan(usize),
}

impl Message for Scan {
    fn message_type(&self) -> MessageType {
        MessageType::Scan
    }

    fn reset(&mut self) {
        self.reset_state();
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        let mut video_res: i64 = 160;
        for header in &self.headers {
            if header.name() == "VIDRES" {
                video_res = header.get_integer()?;
            }
        }

        let mut wire = Vec::with_capacity(self.level_data.len() * 2 + 1024);
        for header in &self.headers {
            wire.extend_from_slice(header.name().as_bytes());
            wire.push(b':');
            wire.extend_from_slice(header.value().as_bytes());
            wire.push(b'\n');
        }

        match video_res {
            16 | 32 | 64 | 160 => self.encode_ascii_rays(&mut wire)?,
            256 => self.encode_binary_rays(&mut wire),
            _ => return Err(Error::InvalidState("unsupported video resolution")),
        }

        wire.extend_from_slice(SCAN_TERM);
        wire.push(b'\n');
        out.write_all(&wire)
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        self.decode_slice(input.read_acquire())?;
        Ok(())
    }
}

/// Parse the `azimuth,elevation,seconds=` text of a binary ray header.
fn parse_binary_ray_header(header: &[u8]) -> Option<(f32, f32, i32)> {
    let text_end = header.iter().position(|&b| b == b'=')?;
    let text = std::str::from_utf8(&header[..text_end]).ok()?;
    let mut fields = text.splitn(3, ',');
    let azimuth = fields.next()?.trim().parse().ok()?;
    let elevation = fields.next()?.trim().parse().ok()?;
    let seconds = fields.next()?.trim().parse().ok()?;
    Some((azimuth, elevation, seconds))
}

/// Format an angle for a binary ray header; NaN marks an absent value.
fn format_ray_angle(angle: f32) -> String {
    if angle.is_nan() {
        "  nan".to_string()
    } else {
        format!("{angle:05.1}")
    }
}

/// Parse an `<n> of <m>` header value (PASS, TILT).
fn parse_n_of_m(value: &str) -> Option<(i32, i32)> {
    let mut fields = value.split_whitespace();
    let n = fields.next()?.parse().ok()?;
    if fields.next()? != "of" {
        return None;
    }
    let m = fields.next()?.parse().ok()?;
    Some((n, m))
}

/// Parse the `SECTOR ANGLE1=a ANGLE2=b ANGLEINCREASING=i` suffix of a
/// sector product string.
fn parse_sector(product: &str) -> Option<(f32, f32, i32)> {
    let fields: Vec<&str> = product.split_whitespace().collect();
    if fields.len() < 6 || fields[2] != "SECTOR" {
        return None;
    }
    let angle1 = fields[3].strip_prefix("ANGLE1=")?.parse().ok()?;
    let angle2 = fields[4].strip_prefix("ANGLE2=")?.parse().ok()?;
    let increasing = fields[5].strip_prefix("ANGLEINCREASING=")?.parse().ok()?;
    Some((angle1, angle2, increasing))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal header block for a PPI scan with the given bin span.
    fn ppi_headers(endrng: u32) -> String {
        format!(
            "STNID: 64\n\
             NAME: Melbourne\n\
             PRODUCT: NORMAL\n\
             IMGFMT: PPI\n\
             ANGRES: 1.0\n\
             RNGRES: 1\n\
             STARTRNG: 0\n\
             ENDRNG: {endrng}\n"
        )
    }

    fn decode(data: &[u8]) -> Scan {
        let mut scan = Scan::new();
        scan.decode_slice(data).expect("scan decodes");
        scan
    }

    #[test]
    fn headers_only_scan() {
        let scan = decode(b"STNID: 64\nPRODUCT: NORMAL\nEND RADAR IMAGE\n");
        assert_eq!(scan.rays(), 0);
        assert_eq!(scan.bins(), 0);
        assert!(scan.ray_headers().is_empty());
        assert_eq!(scan.find_header("STNID").unwrap().value(), "64");
        assert_eq!(scan.find_header("PRODUCT").unwrap().value(), "NORMAL");
    }

    #[test]
    fn unknown_headers_are_preserved() {
        let scan = decode(b"STNID: 64\nX_CUSTOM: anything at all\nEND RADAR IMAGE\n");
        assert_eq!(
            scan.find_header("X_CUSTOM").unwrap().value(),
            "anything at all"
        );
    }

    #[test]
    fn duplicate_headers_first_found_wins() {
        let scan = decode(b"STNID: 64\nSTNID: 2\nEND RADAR IMAGE\n");
        assert_eq!(scan.find_header("STNID").unwrap().value(), "64");
    }

    #[test]
    fn consumed_length_allows_walking_archives() {
        let mut data = Vec::new();
        data.extend_from_slice(b"STNID: 1\nEND RADAR IMAGE\n");
        data.extend_from_slice(b"STNID: 2\nEND RADAR IMAGE\n");

        let mut scan = Scan::new();
        let used = scan.decode_slice(&data).unwrap();
        assert_eq!(scan.find_header("STNID").unwrap().value(), "1");

        // skip whitespace, then the second scan decodes from the remainder
        let mut pos = used;
        while data[pos] <= b' ' {
            pos += 1;
        }
        let mut second = Scan::new();
        second.decode_slice(&data[pos..]).unwrap();
        assert_eq!(second.find_header("STNID").unwrap().value(), "2");
    }

    #[test]
    fn geometry_from_headers() {
        let wire = format!("{}%000ABC\nEND RADAR IMAGE\n", ppi_headers(3));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.station_id(), 64);
        assert_eq!(scan.volume_id(), -1);
        assert_eq!(scan.product(), "NORMAL");
        assert!(!scan.is_rhi());
        assert_eq!(scan.rays(), 360);
        assert_eq!(scan.bins(), 3);
        assert_eq!(scan.angle_min(), 0.0);
        assert_eq!(scan.angle_max(), 360.0);
        assert_eq!(scan.level_data().len(), 360 * 3);
    }

    #[test]
    fn ascii_ray_absolute_levels() {
        let wire = format!("{}%090ABC\nEND RADAR IMAGE\n", ppi_headers(3));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_headers().len(), 1);
        assert_eq!(scan.ray_headers()[0].azimuth(), 90.0);
        assert!(scan.ray_headers()[0].elevation().is_nan());
        assert_eq!(scan.ray_headers()[0].time_offset(), -1);
        assert_eq!(scan.ray_levels(0), &[0, 1, 2]);
    }

    #[test]
    fn ascii_ray_run_length() {
        // 'B' writes level 1, '3' repeats it three more times
        let wire = format!("{}%000B3\nEND RADAR IMAGE\n", ppi_headers(4));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_levels(0), &[1, 1, 1, 1]);
    }

    #[test]
    fn ascii_ray_multi_digit_run() {
        let wire = format!("{}%000B11\nEND RADAR IMAGE\n", ppi_headers(12));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_levels(0), &[1; 12]);
    }

    #[test]
    fn ascii_ray_run_overflow_fails() {
        let wire = format!("{}%000B9\nEND RADAR IMAGE\n", ppi_headers(4));
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(rapic_core::format_error_chain(&err).contains("scan data overflow (ascii rle)"));
    }

    #[test]
    fn ascii_ray_delta_tolerates_trailing_overflow() {
        // '@' is Delta(3, -3).  with three bins the second delta's second
        // component lands past the ray, which is tolerated only because
        // the terminator follows.
        let wire = format!("{}%000@@\nEND RADAR IMAGE\n", ppi_headers(3));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_levels(0), &[3, 0, 3]);
    }

    #[test]
    fn ascii_ray_delta_overflow_mid_ray_fails() {
        let wire = format!("{}%000@@@\nEND RADAR IMAGE\n", ppi_headers(3));
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(rapic_core::format_error_chain(&err).contains("scan data overflow (ascii delta)"));
    }

    #[test]
    fn ascii_ray_early_termination_pads_with_zero() {
        let wire = format!("{}%000B\nEND RADAR IMAGE\n", ppi_headers(5));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_levels(0), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn ascii_ray_stray_newline_is_tolerated() {
        // the newline after the third 'A' does not start a ray, the scan
        // terminator or a header, so decoding continues within the ray
        let wire = format!("{}%000AAA\nAAB\nEND RADAR IMAGE\n", ppi_headers(6));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_headers().len(), 1);
        assert_eq!(scan.ray_levels(0), &[0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn ascii_ray_invalid_byte_fails() {
        let wire = format!("{}%000A#\nEND RADAR IMAGE\n", ppi_headers(3));
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(rapic_core::format_error_chain(&err)
            .contains("invalid character encountered in ray encoding"));
    }

    #[test]
    fn too_many_rays_fails() {
        let mut wire = String::from(
            "STNID: 64\nPRODUCT: VOL A SECTOR ANGLE1=10 ANGLE2=11 ANGLEINCREASING=1\n\
             IMGFMT: PPI\nANGRES: 1.0\nRNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n",
        );
        wire.push_str("%010AB\n%011AB\nEND RADAR IMAGE\n");
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(
            rapic_core::format_error_chain(&err).contains("scan data overflow (too many rays)")
        );
    }

    #[test]
    fn sector_limits_ray_count() {
        let wire = "STNID: 64\nPRODUCT: VOL A SECTOR ANGLE1=30 ANGLE2=60 ANGLEINCREASING=1\n\
                    IMGFMT: PPI\nANGRES: 1.0\nRNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n\
                    %030AB\nEND RADAR IMAGE\n";
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.angle_min(), 30.0);
        assert_eq!(scan.angle_max(), 60.0);
        assert_eq!(scan.rays(), 30);
    }

    #[test]
    fn sector_decreasing_swaps_and_wraps() {
        let wire = "STNID: 64\nPRODUCT: VOL A SECTOR ANGLE1=30 ANGLE2=330 ANGLEINCREASING=0\n\
                    IMGFMT: PPI\nANGRES: 1.0\nRNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n\
                    %330AB\nEND RADAR IMAGE\n";
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.angle_min(), 330.0);
        assert_eq!(scan.angle_max(), 390.0);
        assert_eq!(scan.rays(), 60);
    }

    #[test]
    fn angle_resolution_mismatch_fails() {
        let wire = "STNID: 64\nPRODUCT: NORMAL\nIMGFMT: PPI\nANGRES: 0.7\n\
                    RNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n%000AB\nEND RADAR IMAGE\n";
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(rapic_core::format_error_chain(&err)
            .contains("ANGRES is not a factor of sweep length"));
    }

    #[test]
    fn range_mismatch_fails() {
        let wire = "STNID: 64\nPRODUCT: NORMAL\nIMGFMT: PPI\nANGRES: 1.0\n\
                    RNGRES: 0.3\nSTARTRNG: 0\nENDRNG: 1\n%000AB\nEND RADAR IMAGE\n";
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(
            rapic_core::format_error_chain(&err).contains("RNGRES is not a factor of range span")
        );
    }

    #[test]
    fn missing_mandatory_header_fails_with_context() {
        let wire = "NAME: Melbourne\nPRODUCT: NORMAL\nIMGFMT: PPI\nANGRES: 1.0\n\
                    RNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n%000AB\nEND RADAR IMAGE\n";
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        let chain = rapic_core::format_error_chain(&err);
        assert!(chain.starts_with("failed to decode scan"));
        assert!(chain.contains("name: Melbourne"));
        assert!(chain.contains("product: NORMAL"));
        assert!(chain.contains("missing mandatory header STNID"));
    }

    #[test]
    fn pass_header_is_parsed() {
        let wire = format!(
            "{}PASS: 2 of 5\nVOLUMEID: 3\n%000ABC\nEND RADAR IMAGE\n",
            ppi_headers(3)
        );
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.pass(), 2);
        assert_eq!(scan.pass_count(), 5);
        assert_eq!(scan.volume_id(), 3);
    }

    #[test]
    fn invalid_pass_header_fails() {
        let wire = format!("{}PASS: second\n%000ABC\nEND RADAR IMAGE\n", ppi_headers(3));
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        assert!(rapic_core::format_error_chain(&err).contains("invalid PASS header"));
    }

    #[test]
    fn rhi_rays_use_four_digit_angles() {
        let wire = "STNID: 64\nPRODUCT: RHI A SECTOR ANGLE1=0 ANGLE2=90 ANGLEINCREASING=1\n\
                    IMGFMT: RHI\nANGRES: 1.0\nRNGRES: 1\nSTARTRNG: 0\nENDRNG: 2\n\
                    %0045AB\nEND RADAR IMAGE\n";
        let scan = decode(wire.as_bytes());
        assert!(scan.is_rhi());
        assert_eq!(scan.ray_headers()[0].azimuth(), 45.0);
        assert_eq!(scan.ray_levels(0), &[0, 1]);
    }

    #[test]
    fn binary_ray_run_of_zeros() {
        // the first two payload bytes land in the ignored ray length
        // field, so the ray terminates immediately and every bin keeps its
        // zero initial value
        let mut wire = ppi_headers(5).into_bytes();
        wire.extend_from_slice(b"@000.0,000.0,000=");
        wire.extend_from_slice(&[0x00, 0x05, 0x00, 0x00]);
        wire.extend_from_slice(b"\nEND RADAR IMAGE\n");
        let scan = decode(&wire);
        assert_eq!(scan.ray_levels(0), &[0, 0, 0, 0, 0]);
        assert_eq!(scan.ray_headers()[0].azimuth(), 0.0);
        assert_eq!(scan.ray_headers()[0].elevation(), 0.0);
        assert_eq!(scan.ray_headers()[0].time_offset(), 0);
    }

    #[test]
    fn binary_ray_mixed_runs_and_levels() {
        let mut wire = ppi_headers(6).into_bytes();
        wire.extend_from_slice(b"@085.5,001.5,012=");
        wire.extend_from_slice(&[0x00, 0x07]); // ray length, ignored
        wire.extend_from_slice(&[1, 4, 200, 0, 1, 0, 0]);
        wire.extend_from_slice(b"\nEND RADAR IMAGE\n");
        let scan = decode(&wire);
        assert_eq!(scan.ray_levels(0), &[1, 1, 1, 1, 200, 0]);
        let ray = scan.ray_headers()[0];
        assert_eq!(ray.azimuth(), 85.5);
        assert_eq!(ray.elevation(), 1.5);
        assert_eq!(ray.time_offset(), 12);
    }

    #[test]
    fn binary_ray_run_overflow_fails() {
        let mut wire = ppi_headers(3).into_bytes();
        wire.extend_from_slice(b"@000.0,000.0,000=");
        wire.extend_from_slice(&[0x00, 0x02, 0x01, 0x09, 0x00, 0x00]);
        wire.extend_from_slice(b"\nEND RADAR IMAGE\n");
        let mut scan = Scan::new();
        let err = scan.decode_slice(&wire).unwrap_err();
        assert!(
            rapic_core::format_error_chain(&err).contains("scan data overflow (binary rle)")
        );
    }

    #[test]
    fn binary_ray_bad_header_fails() {
        let mut wire = ppi_headers(3).into_bytes();
        wire.extend_from_slice(b"@no angles here....");
        wire.extend_from_slice(&[0x00, 0x00]);
        wire.extend_from_slice(b"\nEND RADAR IMAGE\n");
        let mut scan = Scan::new();
        let err = scan.decode_slice(&wire).unwrap_err();
        assert!(rapic_core::format_error_chain(&err).contains("invalid binary ray header"));
    }

    #[test]
    fn decode_error_context_carries_station_headers() {
        let wire = format!(
            "{}VIDEO: Refl\nTILT: 1 of 3\n%000A#\nEND RADAR IMAGE\n",
            ppi_headers(3)
        );
        let mut scan = Scan::new();
        let err = scan.decode_slice(wire.as_bytes()).unwrap_err();
        let chain = rapic_core::format_error_chain(&err);
        assert!(chain.contains("stnid: 64"));
        assert!(chain.contains("name: Melbourne"));
        assert!(chain.contains("tilt: 1 of 3"));
        assert!(chain.contains("video: Refl"));
    }

    #[test]
    fn ray_index_maps_angles_to_rows() {
        let wire = format!("{}%000ABC\nEND RADAR IMAGE\n", ppi_headers(3));
        let scan = decode(wire.as_bytes());
        assert_eq!(scan.ray_index(0.0), Some(0));
        assert_eq!(scan.ray_index(90.0), Some(90));
        assert_eq!(scan.ray_index(359.0), Some(359));
        assert_eq!(scan.ray_index(90.5), None);
    }

    #[test]
    fn header_typed_accessors() {
        let header = Header::new("DBZLVL", "19.0 25.0 31.0");
        assert_eq!(header.get_real_array().unwrap(), vec![19.0, 25.0, 31.0]);

        let header = Header::new("QC0", "1 2 3");
        assert_eq!(header.get_integer_array().unwrap(), vec![1, 2, 3]);

        let header = Header::new("UNFOLDING", "None");
        assert!(header.get_integer().is_err());

        let header = Header::new("CLEARAIR", "ON");
        assert!(header.get_boolean().unwrap());
        let header = Header::new("CLEARAIR", "no");
        assert!(!header.get_boolean().unwrap());
        let header = Header::new("CLEARAIR", "maybe");
        assert!(header.get_boolean().is_err());

        let header = Header::new("VIDEOGAIN", "0.565 (dB)");
        assert_eq!(header.get_real().unwrap(), 0.565);
    }

    fn transmit_scan(video_res: u32, bins: usize, levels: Vec<u8>, rays: Vec<RayHeader>) -> Scan {
        let mut scan = Scan::new();
        scan.push_header("STNID", "64");
        scan.push_header("NAME", "Melbourne");
        scan.push_header("PRODUCT", "NORMAL");
        scan.push_header("IMGFMT", "PPI");
        scan.push_header("ANGRES", "1.0");
        scan.push_header("RNGRES", "1");
        scan.push_header("STARTRNG", "0");
        scan.push_header("ENDRNG", bins.to_string());
        scan.push_header("VIDRES", video_res.to_string());
        scan.set_ray_data(bins, rays, levels).unwrap();
        scan
    }

    #[test]
    fn binary_encode_decode_round_trips_levels() {
        let rays = vec![RayHeader::with_details(0.0, 0.5, 0), RayHeader::with_details(1.0, 0.5, 2)];
        let levels = vec![
            0, 0, 0, 5, 200, 1, 1, 0, // ray 0
            255, 254, 1, 1, 1, 1, 0, 0, // ray 1
        ];
        let scan = transmit_scan(256, 8, levels.clone(), rays);

        let mut out = Buffer::new(1024, usize::MAX);
        scan.encode(&mut out).unwrap();

        let mut back = Scan::new();
        back.decode(&out).unwrap();
        assert_eq!(back.ray_headers().len(), 2);
        assert_eq!(back.level_data()[..16], levels[..]);
        assert_eq!(back.ray_headers()[0].elevation(), 0.5);
        assert_eq!(back.ray_headers()[1].azimuth(), 1.0);
        assert_eq!(back.ray_headers()[1].time_offset(), 2);
    }

    #[test]
    fn binary_encode_constant_levels_round_trip() {
        for level in [0u8, 1, 2, 127, 255] {
            let scan = transmit_scan(
                256,
                7,
                vec![level; 7],
                vec![RayHeader::with_details(0.0, 0.0, 0)],
            );
            let mut out = Buffer::new(1024, usize::MAX);
            scan.encode(&mut out).unwrap();

            let mut back = Scan::new();
            back.decode(&out).unwrap();
            assert_eq!(back.ray_levels(0), &[level; 7], "level {level}");
        }
    }

    #[test]
    fn binary_encode_splits_long_runs() {
        // a run longer than 255 must be emitted as multiple runs
        let scan = transmit_scan(
            256,
            300,
            vec![0; 300],
            vec![RayHeader::with_details(0.0, 0.0, 0)],
        );
        let mut out = Buffer::new(4096, usize::MAX);
        scan.encode(&mut out).unwrap();

        let mut back = Scan::new();
        back.decode(&out).unwrap();
        assert_eq!(back.ray_levels(0), &[0u8; 300][..]);
    }

    #[test]
    fn ascii_encode_decode_round_trips_levels() {
        let levels = vec![
            0, 0, 0, 0, 7, 7, 123, 159, // ray 0
            1, 2, 3, 4, 5, 6, 7, 8, // ray 1
        ];
        let rays = vec![RayHeader::new(0.0), RayHeader::new(1.0)];
        let scan = transmit_scan(160, 8, levels.clone(), rays);

        let mut out = Buffer::new(1024, usize::MAX);
        scan.encode(&mut out).unwrap();

        let mut back = Scan::new();
        back.decode(&out).unwrap();
        assert_eq!(back.ray_headers().len(), 2);
        assert_eq!(back.level_data()[..16], levels[..]);
        assert_eq!(back.ray_headers()[1].azimuth(), 1.0);
    }

    #[test]
    fn encode_refuses_unsupported_video_resolution() {
        let scan = transmit_scan(6, 2, vec![0, 0], vec![RayHeader::new(0.0)]);
        let mut out = Buffer::new(1024, usize::MAX);
        assert!(matches!(
            scan.encode(&mut out),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn encoded_scan_is_framed_as_a_scan() {
        let scan = transmit_scan(256, 4, vec![9; 4], vec![RayHeader::with_details(0.0, 0.0, 0)]);
        let mut out = Buffer::new(1024, usize::MAX);
        scan.encode(&mut out).unwrap();
        let (kind, len) = out.read_detect().unwrap().expect("complete message");
        assert_eq!(kind, MessageType::Scan);
        assert_eq!(len, out.unread());
    }
}

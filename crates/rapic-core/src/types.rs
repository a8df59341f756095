//! Protocol-wide types shared by the rapic message codecs.
//!
//! These types mirror the tokens used on the wire by the rapic protocol:
//! the message taxonomy, the scan type identifiers used by queries and
//! filters (including their numeric and indexed spellings), and the query
//! type identifiers.

use std::fmt;

use crate::error::DecodeError;

/// The kind of a framed rapic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Comment line starting with `/`. Used for meta-headers (IMAGE,
    /// RXTIME, ...) in concatenated volume files; never sent by radar
    /// transmitters over the wire.
    Comment,
    /// Administration message (`MSSG:`).
    Mssg,
    /// Status message (`RDRSTAT:`), used as the connection keepalive.
    Status,
    /// Semi-permanent connection message (`RPQUERY: SEMIPERMANENT CONNECTION`).
    PermConn,
    /// Data request message (`RPQUERY:`).
    Query,
    /// Filter specification message (`RPFILTER:`).
    Filter,
    /// Radar scan message.
    Scan,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Comment => "comment",
            MessageType::Mssg => "mssg",
            MessageType::Status => "status",
            MessageType::PermConn => "permcon",
            MessageType::Query => "query",
            MessageType::Filter => "filter",
            MessageType::Scan => "scan",
        };
        write!(f, "{s}")
    }
}

/// Scan types used by queries and filters.
///
/// The numeric values match the numeric spellings sent by some servers in
/// place of the identifier strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    /// Any scan type (wildcard).
    Any,
    /// Plan position indicator (single sweep at one elevation).
    Ppi,
    /// Range height indicator (single sweep at one azimuth).
    Rhi,
    /// Composite PPI.
    CompPpi,
    /// Image product.
    Image,
    /// Volume (ordered set of tilts).
    Volume,
    /// RHI set.
    RhiSet,
    /// Merged product.
    Merge,
    /// Scan error indication.
    ScanError,
}

impl ScanType {
    /// Parse a scan type token from a query or filter message.
    ///
    /// Accepts identifier strings (`ANY`, `PPI`, `VOL`, `VOLUME`, ...,
    /// case-insensitive), the numeric spellings `-1`..`7`, and the indexed
    /// forms `VOLUME<id>` and `COMPPPI<id>`. Returns the scan type together
    /// with the volume id (`-1` when the token carries none).
    pub fn from_wire(token: &str) -> Result<(ScanType, i32), DecodeError> {
        // numeric spelling
        if token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '-')
        {
            let value: i32 = token
                .parse()
                .map_err(|_| DecodeError::new("invalid scan type"))?;
            let scan_type = match value {
                -1 => ScanType::Any,
                0 => ScanType::Ppi,
                1 => ScanType::Rhi,
                2 => ScanType::CompPpi,
                3 => ScanType::Image,
                4 => ScanType::Volume,
                5 => ScanType::RhiSet,
                6 => ScanType::Merge,
                7 => ScanType::ScanError,
                _ => return Err(DecodeError::new("invalid scan type")),
            };
            return Ok((scan_type, -1));
        }

        // plain identifier
        let upper = token.to_ascii_uppercase();
        let plain = match upper.as_str() {
            "ANY" => Some(ScanType::Any),
            "PPI" => Some(ScanType::Ppi),
            "RHI" => Some(ScanType::Rhi),
            "COMPPPI" => Some(ScanType::CompPpi),
            "IMAGE" => Some(ScanType::Image),
            "VOL" | "VOLUME" => Some(ScanType::Volume),
            "RHI_SET" => Some(ScanType::RhiSet),
            "MERGE" => Some(ScanType::Merge),
            "SCAN_ERROR" => Some(ScanType::ScanError),
            _ => None,
        };
        if let Some(scan_type) = plain {
            return Ok((scan_type, -1));
        }

        // indexed identifier: VOLUME<id> or COMPPPI<id>
        if let Some(id) = upper.strip_prefix("VOLUME") {
            if let Ok(id) = id.parse() {
                return Ok((ScanType::Volume, id));
            }
        }
        if let Some(id) = upper.strip_prefix("COMPPPI") {
            if let Ok(id) = id.parse() {
                return Ok((ScanType::CompPpi, id));
            }
        }

        Err(DecodeError::new("invalid scan type id"))
    }

    /// Format this scan type as a wire token.
    ///
    /// When `volume_id` is not `-1`, the volume and composite PPI types use
    /// their indexed forms (`VOLUME<id>`, `COMPPPI<id>`).
    pub fn to_wire(self, volume_id: i32) -> String {
        match self {
            ScanType::Any => "ANY".to_string(),
            ScanType::Ppi => "PPI".to_string(),
            ScanType::Rhi => "RHI".to_string(),
            ScanType::CompPpi if volume_id != -1 => format!("COMPPPI{volume_id}"),
            ScanType::CompPpi => "CompPPI".to_string(),
            ScanType::Image => "IMAGE".to_string(),
            ScanType::Volume if volume_id != -1 => format!("VOLUME{volume_id}"),
            ScanType::Volume => "VOLUME".to_string(),
            ScanType::RhiSet => "RHI_SET".to_string(),
            ScanType::Merge => "MERGE".to_string(),
            ScanType::ScanError => "SCAN_ERROR".to_string(),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire(-1))
    }
}

/// Query types, largely unused by current servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Latest available image.
    Latest,
    /// Images up to the given time.
    ToTime,
    /// Images from the given time.
    FromTime,
    /// Images centered on the given time.
    CentreTime,
}

impl QueryType {
    /// Parse a query type token (case-insensitive).
    pub fn from_wire(token: &str) -> Result<QueryType, DecodeError> {
        match token.to_ascii_uppercase().as_str() {
            "LATEST" => Ok(QueryType::Latest),
            "TOTIME" => Ok(QueryType::ToTime),
            "FROMTIME" => Ok(QueryType::FromTime),
            "CENTRETIME" => Ok(QueryType::CentreTime),
            _ => Err(DecodeError::new("invalid query type")),
        }
    }

    /// Format this query type as a wire token.
    pub fn to_wire(self) -> &'static str {
        match self {
            QueryType::Latest => "LATEST",
            QueryType::ToTime => "TOTIME",
            QueryType::FromTime => "FROMTIME",
            QueryType::CentreTime => "CENTRETIME",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire())
    }
}

/// Parse a station identifier token.
///
/// `ANY` (case-insensitive) means any station and parses as `0`; otherwise
/// the token must be a base-10 integer.
pub fn parse_station_id(token: &str) -> Result<i32, DecodeError> {
    if token.eq_ignore_ascii_case("ANY") {
        return Ok(0);
    }
    token
        .parse()
        .map_err(|_| DecodeError::new("invalid station id"))
}

/// Split a comma-separated data type list into its elements.
///
/// Empty elements are dropped; an empty input yields an empty list.
pub fn parse_data_types(token: &str) -> Vec<String> {
    token
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

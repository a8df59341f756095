//! The rapic message taxonomy.
//!
//! Every message kind implements [`Message`]: it knows its
//! [`MessageType`], can reset to a default state, encode itself into a
//! [`Buffer`], and decode itself from the front of one. Decoding assumes
//! the caller has already framed the message (see
//! [`Buffer::read_detect`]); the buffer's unread span may extend past the
//! message being decoded.
//!
//! # Wire formats
//!
//! ```text
//! /free text\n                                  comment
//! MSSG: <number> <text>\n                       mssg
//! MSSG: 30 <text>\n<lines...>\nEND STATUS\n     mssg (multi-line)
//! RDRSTAT: <text>\n                             status (keepalive)
//! RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=<0|1>\n
//! RPQUERY: <stn> <type> <angle> <repeat> <qtype> <time> <dtypes> <vidres>\n
//! RPFILTER:<stn>:<type>:<vidres>:<source>:<dtype,...>\n
//! ```

use rapic_core::{
    parse_data_types, parse_station_id, DecodeError, MessageType, QueryType, Result, ScanType,
};

use crate::buffer::Buffer;
use crate::wire::{
    find_eol, find_non_whitespace, find_non_whitespace_or_eol, FILTER_HEAD, MSSG30_TERM,
    MSSG_HEAD, PERMCON_HEAD, QUERY_HEAD, STATUS_HEAD,
};

/// Common interface of all rapic message kinds.
pub trait Message {
    /// Get the type of this message.
    fn message_type(&self) -> MessageType;

    /// Reset the message to its default state.
    fn reset(&mut self);

    /// Encode the message into its wire format.
    fn encode(&self, out: &mut Buffer) -> Result<()>;

    /// Decode the message from the front of the buffer.
    ///
    /// The concrete message type must match the message at the front of
    /// the buffer, normally ensured by first calling
    /// [`Buffer::read_detect`]. The buffer is not advanced.
    fn decode(&mut self, input: &Buffer) -> Result<()>;
}

/// Locate the first byte of the message, skipping leading whitespace.
fn message_start(data: &[u8]) -> std::result::Result<usize, DecodeError> {
    let start = find_non_whitespace(data, 0);
    if start == data.len() {
        return Err(DecodeError::new("failed to parse message header"));
    }
    Ok(start)
}

/// Strip a literal head from the message, failing if it is absent.
fn expect_head<'a>(
    data: &'a [u8],
    start: usize,
    head: &[u8],
) -> std::result::Result<&'a [u8], DecodeError> {
    if !data[start..].starts_with(head) {
        return Err(DecodeError::new("failed to parse message header"));
    }
    Ok(&data[start + head.len()..])
}

/// Take the text up to the end of the current line.
fn line_text(data: &[u8], from: usize) -> std::result::Result<(String, usize), DecodeError> {
    let eol = find_eol(data, from);
    if eol == data.len() {
        return Err(DecodeError::new("unterminated message"));
    }
    Ok((
        String::from_utf8_lossy(&data[from..eol]).into_owned(),
        eol,
    ))
}

/// Parse a base-10 integer at `from`, returning the value and the position
/// just past its digits.
fn parse_int(data: &[u8], from: usize) -> std::result::Result<(i64, usize), DecodeError> {
    let mut pos = from;
    let mut negative = false;
    if pos < data.len() && (data[pos] == b'-' || data[pos] == b'+') {
        negative = data[pos] == b'-';
        pos += 1;
    }
    let digits = pos;
    let mut value: i64 = 0;
    while pos < data.len() && data[pos].is_ascii_digit() {
        value = value * 10 + i64::from(data[pos] - b'0');
        pos += 1;
    }
    if pos == digits {
        return Err(DecodeError::new("failed to parse message header"));
    }
    Ok((if negative { -value } else { value }, pos))
}

// ---------------------------------------------------------------------------
// comment
// ---------------------------------------------------------------------------

/// Comment message.
///
/// Only found in rapic files where multiple scans have been concatenated
/// into a single volume file, where comments implement meta-headers such
/// as IMAGE, RXTIME, IMAGESCANS and IMAGEHEADER. These let a viewer index
/// directly into the file without parsing every scan; radar transmitters
/// never send them over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    /// The comment text, without the leading `/`.
    pub text: String,
}

impl Message for Comment {
    fn message_type(&self) -> MessageType {
        MessageType::Comment
    }

    fn reset(&mut self) {
        self.text.clear();
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        out.write_all(format!("/{}\n", self.text).as_bytes())
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        if data[start] != b'/' {
            return Err(DecodeError::new("failed to parse message header").into());
        }
        let (text, _) = line_text(data, start + 1)?;
        self.text = text;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// mssg
// ---------------------------------------------------------------------------

/// MSSG administration message.
///
/// Message number 30 is special: its text continues over multiple lines
/// until a line reading `END STATUS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mssg {
    /// The message number (-1 when unset).
    pub number: i32,
    /// The message text. Multi-line for message number 30.
    pub text: String,
}

impl Default for Mssg {
    fn default() -> Self {
        Mssg {
            number: -1,
            text: String::new(),
        }
    }
}

impl Message for Mssg {
    fn message_type(&self) -> MessageType {
        MessageType::Mssg
    }

    fn reset(&mut self) {
        *self = Mssg::default();
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        let wire = if self.number == 30 {
            format!("MSSG: {} {}\nEND STATUS\n", self.number, self.text)
        } else {
            format!("MSSG: {} {}\n", self.number, self.text)
        };
        out.write_all(wire.as_bytes())
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        expect_head(data, start, MSSG_HEAD)?;

        let pos = find_non_whitespace_or_eol(data, start + MSSG_HEAD.len());
        let (number, pos) = parse_int(data, pos)?;
        self.number = number as i32;

        let pos = find_non_whitespace_or_eol(data, pos);
        let (text, eol) = line_text(data, pos)?;
        self.text = text;

        // message 30 continues until an END STATUS line
        if self.number == 30 {
            let mut pos = eol + 1;
            loop {
                let eol = find_eol(data, pos);
                if eol == data.len() {
                    return Err(DecodeError::new("unterminated message").into());
                }
                if &data[pos..eol] == MSSG30_TERM {
                    break;
                }
                self.text.push('\n');
                self.text
                    .push_str(&String::from_utf8_lossy(&data[pos..eol]));
                pos = eol + 1;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// RDRSTAT status message.
///
/// Used as the keepalive for rapic connections; carries no useful data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Optional status text.
    pub text: String,
}

impl Message for Status {
    fn message_type(&self) -> MessageType {
        MessageType::Status
    }

    fn reset(&mut self) {
        self.text.clear();
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        out.write_all(format!("RDRSTAT: {}\n", self.text).as_bytes())
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        expect_head(data, start, STATUS_HEAD)?;
        let pos = find_non_whitespace_or_eol(data, start + STATUS_HEAD.len());
        let (text, _) = line_text(data, pos)?;
        self.text = text;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// permcon
// ---------------------------------------------------------------------------

/// Semi-permanent connection message.
///
/// Sent by a client immediately after connecting to subscribe to the
/// server's data stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermConn {
    /// Whether the server should only transmit complete scans.
    pub tx_complete_scans: bool,
}

impl Message for PermConn {
    fn message_type(&self) -> MessageType {
        MessageType::PermConn
    }

    fn reset(&mut self) {
        self.tx_complete_scans = false;
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        out.write_all(
            format!(
                "RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS={}\n",
                self.tx_complete_scans as i32
            )
            .as_bytes(),
        )
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        let rest = expect_head(data, start, PERMCON_HEAD)?;
        let tail = expect_head(rest, 0, b" - SEND ALL DATA TXCOMPLETESCANS=")?;
        let (value, _) = parse_int(tail, 0)?;
        self.tx_complete_scans = value != 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

/// RPQUERY data request message.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Station identifier (0 = any).
    pub station_id: i32,
    /// Requested scan type.
    pub scan_type: ScanType,
    /// Volume id (-1 = any or not a volume).
    pub volume_id: i32,
    /// Selected angle (-1 = default).
    pub angle: f32,
    /// Repeat count (-1 = default).
    pub repeat_count: i32,
    /// Query type (latest by default).
    pub query_type: QueryType,
    /// Image time as seconds since epoch (0 = latest image).
    pub time: i64,
    /// Data types to retrieve; empty for all available.
    pub data_types: Vec<String>,
    /// Video resolution (-1 = default).
    pub video_res: i32,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            station_id: 0,
            scan_type: ScanType::Any,
            volume_id: -1,
            angle: -1.0,
            repeat_count: -1,
            query_type: QueryType::Latest,
            time: 0,
            data_types: Vec::new(),
            video_res: -1,
        }
    }
}

impl Message for Query {
    fn message_type(&self) -> MessageType {
        MessageType::Query
    }

    fn reset(&mut self) {
        *self = Query::default();
    }

    /// Encode the query.
    ///
    /// An empty data type list is written as a bare comma so the field is
    /// never empty on the wire.
    fn encode(&self, out: &mut Buffer) -> Result<()> {
        let data_types = if self.data_types.is_empty() {
            ",".to_string()
        } else {
            self.data_types.join(",")
        };
        out.write_all(
            format!(
                "RPQUERY: {} {} {} {} {} {} {} {}\n",
                self.station_id,
                self.scan_type.to_wire(self.volume_id),
                self.angle,
                self.repeat_count,
                self.query_type.to_wire(),
                self.time,
                data_types,
                self.video_res
            )
            .as_bytes(),
        )
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        expect_head(data, start, QUERY_HEAD)?;
        let (line, _) = line_text(data, start + QUERY_HEAD.len())?;

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 8 {
            return Err(DecodeError::new("failed to parse message header").into());
        }

        self.station_id = parse_station_id(fields[0])?;
        let (scan_type, volume_id) = ScanType::from_wire(fields[1])?;
        self.scan_type = scan_type;
        self.volume_id = volume_id;
        self.angle = fields[2]
            .parse()
            .map_err(|_| DecodeError::new("failed to parse message header"))?;
        self.repeat_count = fields[3]
            .parse()
            .map_err(|_| DecodeError::new("failed to parse message header"))?;
        self.query_type = QueryType::from_wire(fields[4])?;
        self.time = fields[5]
            .parse()
            .map_err(|_| DecodeError::new("failed to parse message header"))?;
        self.data_types = parse_data_types(fields[6]);
        self.video_res = fields[7]
            .parse()
            .map_err(|_| DecodeError::new("failed to parse message header"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// filter
// ---------------------------------------------------------------------------

/// RPFILTER filter specification message.
///
/// Sent by a client after the semi-permanent connection message to narrow
/// the products the server transmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Station identifier (0 = any, -1 = all).
    pub station_id: i32,
    /// Scan type to pass.
    pub scan_type: ScanType,
    /// Volume id (-1 = any or not a volume).
    pub volume_id: i32,
    /// Video resolution (-1 = whatever is available).
    pub video_res: i32,
    /// Data source (unused by current servers, conventionally `-1`).
    pub source: String,
    /// Data types (moments) to pass; empty for all available.
    pub data_types: Vec<String>,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            station_id: 0,
            scan_type: ScanType::Any,
            volume_id: -1,
            video_res: -1,
            source: String::new(),
            data_types: Vec::new(),
        }
    }
}

impl Message for Filter {
    fn message_type(&self) -> MessageType {
        MessageType::Filter
    }

    fn reset(&mut self) {
        *self = Filter::default();
    }

    fn encode(&self, out: &mut Buffer) -> Result<()> {
        out.write_all(
            format!(
                "RPFILTER:{}:{}:{}:{}:{}\n",
                self.station_id,
                self.scan_type.to_wire(self.volume_id),
                self.video_res,
                self.source,
                self.data_types.join(",")
            )
            .as_bytes(),
        )
    }

    fn decode(&mut self, input: &Buffer) -> Result<()> {
        let data = input.read_acquire();
        let start = message_start(data)?;
        expect_head(data, start, FILTER_HEAD)?;
        let (line, _) = line_text(data, start + FILTER_HEAD.len())?;

        let fields: Vec<&str> = line.splitn(5, ':').collect();
        if fields.len() < 4 {
            return Err(DecodeError::new("failed to parse message header").into());
        }

        self.station_id = parse_station_id(fields[0])?;
        let (scan_type, volume_id) = ScanType::from_wire(fields[1])?;
        self.scan_type = scan_type;
        self.volume_id = volume_id;
        self.video_res = fields[2]
            .parse()
            .map_err(|_| DecodeError::new("failed to parse message header"))?;
        self.source = fields[3].to_string();
        self.data_types = fields.get(4).copied().map(parse_data_types).unwrap_or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(bytes: &[u8]) -> Buffer {
        let mut buf = Buffer::new(1024, usize::MAX);
        buf.write_all(bytes).unwrap();
        buf
    }

    #[test]
    fn status_keepalive_decodes_empty() {
        let buf = buffer_with(b"RDRSTAT:\n");
        let mut msg = Status::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.text, "");
    }

    #[test]
    fn status_round_trip() {
        let mut out = Buffer::new(64, usize::MAX);
        let msg = Status {
            text: "online".to_string(),
        };
        msg.encode(&mut out).unwrap();
        assert_eq!(out.read_acquire(), b"RDRSTAT: online\n");

        let mut back = Status::default();
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn status_decode_ignores_following_messages() {
        let buf = buffer_with(b"RDRSTAT: one\nRDRSTAT: two\n");
        let mut msg = Status::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.text, "one");
    }

    #[test]
    fn comment_round_trip() {
        let mut out = Buffer::new(64, usize::MAX);
        let msg = Comment {
            text: "IMAGE: 23".to_string(),
        };
        msg.encode(&mut out).unwrap();
        assert_eq!(out.read_acquire(), b"/IMAGE: 23\n");

        let mut back = Comment::default();
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn mssg_simple() {
        let buf = buffer_with(b"MSSG: 12 radar offline\n");
        let mut msg = Mssg::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.number, 12);
        assert_eq!(msg.text, "radar offline");
    }

    #[test]
    fn mssg_30_multi_line() {
        let buf = buffer_with(b"MSSG: 30 first line\nsecond\nthird\nEND STATUS\n");
        let mut msg = Mssg::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.number, 30);
        assert_eq!(msg.text, "first line\nsecond\nthird");
    }

    #[test]
    fn mssg_30_round_trip() {
        let mut out = Buffer::new(256, usize::MAX);
        let msg = Mssg {
            number: 30,
            text: "first line".to_string(),
        };
        msg.encode(&mut out).unwrap();
        assert_eq!(out.read_acquire(), b"MSSG: 30 first line\nEND STATUS\n");

        let mut back = Mssg::default();
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn mssg_missing_number_fails() {
        let buf = buffer_with(b"MSSG: radar offline\n");
        let mut msg = Mssg::default();
        assert!(msg.decode(&buf).is_err());
    }

    #[test]
    fn permcon_round_trip() {
        let mut out = Buffer::new(128, usize::MAX);
        let msg = PermConn {
            tx_complete_scans: false,
        };
        msg.encode(&mut out).unwrap();
        assert_eq!(
            out.read_acquire(),
            b"RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=0\n"
        );

        let mut back = PermConn {
            tx_complete_scans: true,
        };
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn permcon_tx_complete_scans_set() {
        let buf =
            buffer_with(b"RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=1\n");
        let mut msg = PermConn::default();
        msg.decode(&buf).unwrap();
        assert!(msg.tx_complete_scans);
    }

    #[test]
    fn query_decode() {
        let buf = buffer_with(b"RPQUERY: 2 VOLUME3 15.5 -1 LATEST 0 Refl,Vel -1\n");
        let mut msg = Query::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.station_id, 2);
        assert_eq!(msg.scan_type, ScanType::Volume);
        assert_eq!(msg.volume_id, 3);
        assert_eq!(msg.angle, 15.5);
        assert_eq!(msg.repeat_count, -1);
        assert_eq!(msg.query_type, QueryType::Latest);
        assert_eq!(msg.time, 0);
        assert_eq!(msg.data_types, vec!["Refl", "Vel"]);
        assert_eq!(msg.video_res, -1);
    }

    #[test]
    fn query_round_trip() {
        let msg = Query {
            station_id: 64,
            scan_type: ScanType::Ppi,
            volume_id: -1,
            angle: 0.5,
            repeat_count: 2,
            query_type: QueryType::FromTime,
            time: 1456191600,
            data_types: vec!["Refl".to_string()],
            video_res: 160,
        };
        let mut out = Buffer::new(256, usize::MAX);
        msg.encode(&mut out).unwrap();

        let mut back = Query::default();
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn query_round_trip_empty_data_types() {
        let msg = Query {
            station_id: 0,
            ..Query::default()
        };
        let mut out = Buffer::new(256, usize::MAX);
        msg.encode(&mut out).unwrap();

        let mut back = Query {
            data_types: vec!["Refl".to_string()],
            ..Query::default()
        };
        back.decode(&out).unwrap();
        assert!(back.data_types.is_empty());
    }

    #[test]
    fn query_wrong_field_count_fails() {
        let buf = buffer_with(b"RPQUERY: 2 VOL -1\n");
        let mut msg = Query::default();
        assert!(msg.decode(&buf).is_err());
    }

    #[test]
    fn filter_decode_without_data_types() {
        let buf = buffer_with(b"RPFILTER:2:VOL:-1:-1\n");
        let mut msg = Filter::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.station_id, 2);
        assert_eq!(msg.scan_type, ScanType::Volume);
        assert_eq!(msg.video_res, -1);
        assert_eq!(msg.source, "-1");
        assert!(msg.data_types.is_empty());
    }

    #[test]
    fn filter_decode_with_moments() {
        let buf = buffer_with(b"RPFILTER:-1:ANY:-1:-1:Refl,Vel,SpWdth\n");
        let mut msg = Filter::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.station_id, -1);
        assert_eq!(msg.scan_type, ScanType::Any);
        assert_eq!(msg.data_types, vec!["Refl", "Vel", "SpWdth"]);
    }

    #[test]
    fn filter_round_trip() {
        let msg = Filter {
            station_id: 70,
            scan_type: ScanType::Volume,
            volume_id: 2,
            video_res: 256,
            source: "-1".to_string(),
            data_types: vec!["Refl".to_string(), "Vel".to_string()],
        };
        let mut out = Buffer::new(256, usize::MAX);
        msg.encode(&mut out).unwrap();
        assert_eq!(out.read_acquire(), b"RPFILTER:70:VOLUME2:256:-1:Refl,Vel\n");

        let mut back = Filter::default();
        back.decode(&out).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn decode_with_leading_whitespace() {
        let buf = buffer_with(b"\n\n  RDRSTAT: ok\n");
        let mut msg = Status::default();
        msg.decode(&buf).unwrap();
        assert_eq!(msg.text, "ok");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut msg = Query {
            station_id: 5,
            time: 99,
            ..Query::default()
        };
        msg.reset();
        assert_eq!(msg, Query::default());
    }
}

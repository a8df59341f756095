//! Message boundary detection for the rapic byte stream.
//!
//! The outer protocol has no length prefix: the next message is identified
//! purely from its leading bytes, and its end from a per-kind terminator.
//! Line messages end at the first end-of-line byte; `MSSG: 30` runs until a
//! line reading `END STATUS`; everything that matches no head is a scan and
//! runs until a line containing only `END RADAR IMAGE`.
//!
//! Head dispatch order matters: `MSSG: 30` is checked before `MSSG:` and
//! `RPQUERY: SEMIPERMANENT CONNECTION` before `RPQUERY:`, as the shorter
//! heads are prefixes of the longer ones.

use rapic_core::MessageType;

use crate::wire::{
    find_eol, find_non_whitespace, COMMENT_HEAD, FILTER_HEAD, MSSG30_HEAD, MSSG30_TERM, MSSG_HEAD,
    PERMCON_HEAD, QUERY_HEAD, SCAN_TERM, STATUS_HEAD,
};

/// Classify and measure the next complete message in `data`.
///
/// Returns the message type and its length from the start of `data`,
/// terminator included (the length is never zero). Returns `None` when no
/// complete message is available yet; feeding more data may complete it.
pub fn detect(data: &[u8]) -> Option<(MessageType, usize)> {
    // ignore leading whitespace (and give up if no data at all)
    let start = find_non_whitespace(data, 0);
    if start == data.len() {
        return None;
    }
    let head = &data[start..];

    if head.starts_with(COMMENT_HEAD) {
        detect_line(data, start, MessageType::Comment)
    } else if head.starts_with(MSSG30_HEAD) {
        detect_terminated_line(data, start + MSSG30_HEAD.len(), MSSG30_TERM, MessageType::Mssg)
    } else if head.starts_with(MSSG_HEAD) {
        detect_line(data, start, MessageType::Mssg)
    } else if head.starts_with(STATUS_HEAD) {
        detect_line(data, start, MessageType::Status)
    } else if head.starts_with(PERMCON_HEAD) {
        detect_line(data, start, MessageType::PermConn)
    } else if head.starts_with(QUERY_HEAD) {
        detect_line(data, start, MessageType::Query)
    } else if head.starts_with(FILTER_HEAD) {
        detect_line(data, start, MessageType::Filter)
    } else {
        detect_scan(data, start)
    }
}

/// A single-line message: complete once its end-of-line byte has arrived.
fn detect_line(data: &[u8], start: usize, kind: MessageType) -> Option<(MessageType, usize)> {
    let eol = find_eol(data, start);
    if eol == data.len() {
        return None;
    }
    Some((kind, eol + 1))
}

/// A multi-line message: complete once a line equal to `term` has arrived.
fn detect_terminated_line(
    data: &[u8],
    mut pos: usize,
    term: &[u8],
    kind: MessageType,
) -> Option<(MessageType, usize)> {
    loop {
        let eol = find_eol(data, pos);
        if eol == data.len() {
            return None;
        }
        if &data[pos..eol] == term {
            return Some((kind, eol + 1));
        }
        pos = eol + 1;
    }
}

/// A scan: complete once a line containing only `END RADAR IMAGE` has
/// arrived. Some radars prefix the terminator with a 0x1A byte; any
/// whitespace at the start of a line is skipped before comparing.
fn detect_scan(data: &[u8], mut pos: usize) -> Option<(MessageType, usize)> {
    loop {
        let eol = find_eol(data, pos);
        if eol == data.len() {
            return None;
        }
        let line = find_non_whitespace(data, pos);
        if line < eol && &data[line..eol] == SCAN_TERM {
            return Some((MessageType::Scan, eol + 1));
        }
        pos = eol + 1;
    }
}

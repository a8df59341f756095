//! Host and service name resolution.
//!
//! Rapic endpoints are addressed by a host name and a service name. The
//! service is looked up in `/etc/services` first and parsed as a numeric
//! port if no entry matches, mirroring how the radar network has
//! traditionally published its ports.

use std::net::SocketAddr;

use rapic_core::{Error, Result};
use tokio::net::lookup_host;

/// Resolve a service name to a TCP port number.
///
/// The name is looked up in `/etc/services` (TCP entries, aliases
/// included); failing that it must parse as a non-zero port number.
pub fn resolve_service(service: &str) -> Result<u16> {
    if let Some(port) = services_lookup(service) {
        return Ok(port);
    }
    match service.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Error::Resolve(service.to_string())),
    }
}

/// Resolve a host and service to a socket address.
///
/// Only the first resolved address is returned; trying the remainder of
/// the list on connection failure is a possible future refinement.
pub async fn resolve_endpoint(host: &str, service: &str) -> Result<SocketAddr> {
    let port = resolve_service(service)?;
    let spec = || format!("{host}:{service}");

    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|_| Error::Resolve(spec()))?;
    let first = addrs.next().ok_or_else(|| Error::Resolve(spec()))?;
    if addrs.next().is_some() {
        tracing::debug!(
            host = %host,
            addr = %first,
            "host resolves to multiple addresses, using the first"
        );
    }
    Ok(first)
}

/// Find a TCP service entry by name or alias in `/etc/services`.
fn services_lookup(name: &str) -> Option<u16> {
    let content = std::fs::read_to_string("/etc/services").ok()?;
    parse_services(&content, name)
}

/// Scan `/etc/services` formatted content for a TCP entry.
///
/// Each line is `name port/protocol [aliases...]`, with `#` starting a
/// comment.
fn parse_services(content: &str, name: &str) -> Option<u16> {
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let Some(entry) = fields.next() else {
            continue;
        };
        let Some(port_proto) = fields.next() else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        if entry == name || fields.any(|alias| alias == name) {
            if let Ok(port) = port.parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

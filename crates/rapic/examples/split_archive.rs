//! Split a rapic archive file into volumes.
//!
//! Walks a `.rapic` file of concatenated scans, groups the scans into
//! volumes, and reports the output file name each volume would be written
//! to. The actual polar volume writer is pluggable (see
//! `rapic::odim::VolumeWriter`); this example only derives the structure.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p rapic --example split_archive -- archive.rapic
//! ```

use rapic::format_error_chain;
use rapic::odim::{group_tilts, group_volumes, volume_filename, volume_time};
use rapic::protocol::Scan;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: split_archive <archive.rapic>"))?;
    let data = std::fs::read(&path)?;

    // find scans and parse them into a list
    let mut scans = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        // whitespace - skip
        if data[pos] <= b' ' {
            pos += 1;
            continue;
        }

        // image headers - skip the line
        if data[pos] == b'/' {
            while pos < data.len() && data[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }

        let mut scan = Scan::new();
        match scan.decode_slice(&data[pos..]) {
            Ok(used) => {
                pos += used;
                scans.push(scan);
            }
            Err(err) => {
                eprintln!("skipping undecodable scan: {}", format_error_chain(&err));
                // resynchronize at the next line
                while pos < data.len() && data[pos] != b'\n' {
                    pos += 1;
                }
            }
        }
    }

    println!("{}: {} scans", path, scans.len());
    for volume in group_volumes(&scans) {
        let station = volume[0].station_id();
        match volume_time(volume) {
            Ok(time) => println!(
                "  {} ({} scans, {} tilts)",
                volume_filename(station, time),
                volume.len(),
                group_tilts(volume).len()
            ),
            Err(err) => println!(
                "  stn {station} {} scans (no product time: {err})",
                volume.len()
            ),
        }
    }
    Ok(())
}

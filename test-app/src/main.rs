//! Interactive test application for the rapic library.
//!
//! Exercises the library against real servers and archive files:
//!
//! - `monitor` connects to a rapic server, subscribes with filters, and
//!   dumps a summary of every message received;
//! - `inspect` walks a rapic archive file, decodes each scan, and reports
//!   the volume structure.
//!
//! Exits 0 on success and 1 on any error.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rapic::net::{Client, ClientOptions};
use rapic::odim::{group_tilts, group_volumes, volume_filename, volume_time};
use rapic::protocol::{Mssg, Scan, Status};
use rapic::{format_error_chain, MessageType};

#[derive(Parser)]
#[command(name = "rapic-test-app", about = "Exercise the rapic library")]
struct Cli {
    /// Suppress warnings; only errors are reported.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a rapic server and dump the message stream.
    Monitor {
        /// Server hostname or address.
        host: String,
        /// Server service name or port.
        service: String,
        /// Product filters as `station:product` (station -1 for all);
        /// defaults to all products from all stations.
        #[arg(short, long)]
        filter: Vec<String>,
        /// Keepalive period in seconds.
        #[arg(long, default_value_t = 40)]
        keepalive: u64,
    },
    /// Decode a rapic archive file and report its volume structure.
    Inspect {
        /// Path to the archive file.
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Command::Monitor {
            host,
            service,
            filter,
            keepalive,
        } => monitor(&host, &service, &filter, keepalive).await,
        Command::Inspect { path } => inspect(&path, cli.quiet),
    }
}

async fn monitor(host: &str, service: &str, filters: &[String], keepalive: u64) -> anyhow::Result<()> {
    let mut client = Client::with_options(ClientOptions {
        keepalive_period: Duration::from_secs(keepalive),
        ..ClientOptions::default()
    });

    if filters.is_empty() {
        client.add_filter(-1, "ANY", &[])?;
    }
    for spec in filters {
        let (station, product) = spec
            .split_once(':')
            .with_context(|| format!("bad filter {spec:?}, expected station:product"))?;
        let station: i32 = station
            .parse()
            .with_context(|| format!("bad station in filter {spec:?}"))?;
        client.add_filter(station, product, &[])?;
    }

    client
        .connect(host, service)
        .await
        .with_context(|| format!("cannot connect to {host}:{service}"))?;
    println!("Connected to {host}:{service}.");

    while client.connected() {
        client.poll().await?;
        loop {
            let more = client.process_traffic()?;
            dump_messages(&mut client)?;
            if !more {
                break;
            }
        }
    }

    println!("Connection closed by server.");
    Ok(())
}

fn dump_messages(client: &mut Client) -> anyhow::Result<()> {
    while let Some(kind) = client.dequeue()? {
        match kind {
            MessageType::Mssg => {
                let mut msg = Mssg::default();
                client.decode(&mut msg)?;
                println!("MSSG {}: {}", msg.number, msg.text);
            }
            MessageType::Status => {
                let mut msg = Status::default();
                client.decode(&mut msg)?;
                println!("RDRSTAT {}", msg.text);
            }
            MessageType::Scan => {
                let mut scan = Scan::new();
                match client.decode(&mut scan) {
                    Ok(()) => println!(
                        "SCAN stn {} pass {}/{} product {} ({} rays x {} bins)",
                        scan.station_id(),
                        scan.pass(),
                        scan.pass_count(),
                        scan.product(),
                        scan.ray_headers().len(),
                        scan.bins()
                    ),
                    Err(err) => {
                        tracing::error!("error decoding scan: {}", format_error_chain(&err));
                    }
                }
            }
            other => println!("{other}"),
        }
    }
    Ok(())
}

fn inspect(path: &str, quiet: bool) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("cannot read {path}"))?;

    let mut scans = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] <= b' ' {
            pos += 1;
            continue;
        }
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
                if !quiet {
                    tracing::warn!("skipping undecodable scan: {}", format_error_chain(&err));
                }
                while pos < data.len() && data[pos] != b'\n' {
                    pos += 1;
                }
            }
        }
    }

    println!("{path}: {} scans", scans.len());
    for volume in group_volumes(&scans) {
        let tilts = group_tilts(volume);
        match volume_time(volume) {
            Ok(time) => println!(
                "  {} ({} scans, {} tilts)",
                volume_filename(volume[0].station_id(), time),
                volume.len(),
                tilts.len()
            ),
            Err(_) => println!(
                "  stn {} product {:?} ({} scans, {} tilts)",
                volume[0].station_id(),
                volume[0].product(),
                volume.len(),
                tilts.len()
            ),
        }
    }
    Ok(())
}

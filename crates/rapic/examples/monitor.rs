//! Monitor a live rapic server.
//!
//! Connects to a radar server, subscribes to all products, and prints a
//! one-line summary of every message as it arrives. This mirrors how an
//! ingest daemon consumes the feed: poll, process traffic until the
//! socket runs dry, then drain the framed messages.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p rapic --example monitor -- <host> <port>
//! ```

use rapic::net::Client;
use rapic::protocol::{Mssg, Scan};
use rapic::{format_error_chain, MessageType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let service = args.next().unwrap_or_else(|| "15555".to_string());

    let mut client = Client::new();
    client.add_filter(-1, "ANY", &[])?;

    println!("Connecting to {host}:{service}...");
    client.connect(&host, &service).await?;

    // loop for as long as the connection stays open
    while client.connected() {
        // wait for messages to arrive
        client.poll().await?;

        // process socket traffic and handle messages until the socket
        // runs dry
        loop {
            let more = client.process_traffic()?;
            handle_messages(&mut client)?;
            if !more {
                break;
            }
        }
    }

    println!("Connection closed by server.");
    Ok(())
}

fn handle_messages(client: &mut Client) -> anyhow::Result<()> {
    while let Some(kind) = client.dequeue()? {
        match kind {
            MessageType::Mssg => {
                let mut msg = Mssg::default();
                client.decode(&mut msg)?;
                println!("MSSG {}: {}", msg.number, msg.text);
            }
            MessageType::Scan => {
                let mut scan = Scan::new();
                match client.decode(&mut scan) {
                    Ok(()) => println!(
                        "SCAN: stn {} pass {}/{} product {} ({} rays x {} bins)",
                        scan.station_id(),
                        scan.pass(),
                        scan.pass_count(),
                        scan.product(),
                        scan.ray_headers().len(),
                        scan.bins()
                    ),
                    // a corrupt scan does not end the stream
                    Err(err) => eprintln!("error decoding scan: {}", format_error_chain(&err)),
                }
            }
            other => println!("{other}"),
        }
    }
    Ok(())
}

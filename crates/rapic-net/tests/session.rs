//! End-to-end session tests: a client against a scripted mock radar.

use std::time::Duration;

use rapic_core::MessageType;
use rapic_net::Client;
use rapic_protocol::{Mssg, Scan, Status};
use rapic_test_harness::MockRadar;

/// Drive the client until `count` messages have been framed, decoding
/// scans and collecting every message type seen.
async fn collect_messages(client: &mut Client, count: usize) -> (Vec<MessageType>, Vec<Scan>) {
    let mut kinds = Vec::new();
    let mut scans = Vec::new();
    for _ in 0..200 {
        if !client.connected() {
            break;
        }
        client
            .poll_with_timeout(Duration::from_millis(50))
            .await
            .unwrap();
        loop {
            let more = match client.process_traffic() {
                Ok(more) => more,
                // the mock radar closes once its script completes
                Err(_) if !client.connected() => false,
                Err(e) => panic!("traffic error: {e:?}"),
            };
            while let Some(kind) = client.dequeue().unwrap() {
                kinds.push(kind);
                if kind == MessageType::Scan {
                    let mut scan = Scan::new();
                    client.decode(&mut scan).unwrap();
                    scans.push(scan);
                }
            }
            if !more {
                break;
            }
        }
        if kinds.len() >= count {
            break;
        }
    }
    (kinds, scans)
}

#[tokio::test]
async fn subscription_and_volume_stream() {
    let mut radar = MockRadar::new().await.unwrap();
    radar.expect_line("RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=0");
    radar.expect_line("RPFILTER:2:VOL:-1:-1:Refl,Vel");
    radar.expect_line("RDRSTAT:");
    radar.send(b"MSSG: 30 status report\nsite ok\nEND STATUS\n");
    radar.send(
        b"STNID: 2\nNAME: Melbourne\nPRODUCT: NORMAL\nIMGFMT: PPI\n\
          ANGRES: 1.0\nRNGRES: 500\nSTARTRNG: 0\nENDRNG: 2000\n\
          PASS: 1 of 2\n%000ABCD\n%001D3\nEND RADAR IMAGE\n",
    );
    radar.send(b"RDRSTAT:\n");
    radar.start();

    let mut client = Client::new();
    client.add_filter(2, "VOL", &["Refl", "Vel"]).unwrap();
    client.connect(&radar.host(), &radar.service()).await.unwrap();

    // the first process_traffic issues the keepalive the radar expects
    let (kinds, scans) = collect_messages(&mut client, 3).await;
    assert_eq!(
        kinds,
        vec![MessageType::Mssg, MessageType::Scan, MessageType::Status]
    );

    assert_eq!(scans.len(), 1);
    let scan = &scans[0];
    assert_eq!(scan.station_id(), 2);
    assert_eq!(scan.pass(), 1);
    assert_eq!(scan.pass_count(), 2);
    assert_eq!(scan.rays(), 360);
    assert_eq!(scan.bins(), 4);
    assert_eq!(scan.ray_headers().len(), 2);
    assert_eq!(scan.ray_levels(0), &[0, 1, 2, 3]);
    assert_eq!(scan.ray_levels(1), &[3, 3, 3, 3]);

    radar.wait().await.unwrap();
}

#[tokio::test]
async fn mssg_and_status_content() {
    let mut radar = MockRadar::new().await.unwrap();
    radar.send(b"MSSG: 30 first line\nsecond\nthird\nEND STATUS\n");
    radar.send(b"RDRSTAT:\n");
    radar.start();

    let mut client = Client::new();
    client.connect(&radar.host(), &radar.service()).await.unwrap();

    let mut got_mssg = None;
    let mut got_status = None;
    for _ in 0..200 {
        client
            .poll_with_timeout(Duration::from_millis(50))
            .await
            .unwrap();
        let _ = client.process_traffic();
        while let Some(kind) = client.dequeue().unwrap() {
            match kind {
                MessageType::Mssg => {
                    let mut msg = Mssg::default();
                    client.decode(&mut msg).unwrap();
                    got_mssg = Some(msg);
                }
                MessageType::Status => {
                    let mut msg = Status::default();
                    client.decode(&mut msg).unwrap();
                    got_status = Some(msg);
                }
                other => panic!("unexpected message: {other}"),
            }
        }
        if got_mssg.is_some() && got_status.is_some() {
            break;
        }
        if !client.connected() {
            break;
        }
    }

    let mssg = got_mssg.expect("mssg received");
    assert_eq!(mssg.number, 30);
    assert_eq!(mssg.text, "first line\nsecond\nthird");

    let status = got_status.expect("status received");
    assert_eq!(status.text, "");
}

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use cmdbus::bus::{Bus, FanoutBus, PeerBus};
use cmdbus::protocol::{FramePayload, MAX_WIRE_FRAME_LEN, TARGET_1, TARGET_2};

fn wire_bytes(payload: &FramePayload) -> Vec<u8> {
    let frame = payload.encode();
    let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
    let len = frame.to_wire(&mut buf);
    buf[..len].to_vec()
}

#[test]
fn test_empty_bus_times_out_with_none() {
    let mut bus = FanoutBus::new("127.0.0.1:0", &[]).unwrap();
    let timeout = Duration::from_millis(150);

    let started = Instant::now();
    let received = bus.recv(timeout).unwrap();
    let elapsed = started.elapsed();

    assert!(received.is_none());
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_millis(250),
        "overslept: {elapsed:?}"
    );
}

#[test]
fn test_fanout_delivers_to_every_subscriber() {
    let mut rx_a = FanoutBus::new("127.0.0.1:0", &[]).unwrap();
    let mut rx_b = FanoutBus::new("127.0.0.1:0", &[]).unwrap();
    let subscribers = vec![
        rx_a.local_addr().unwrap().to_string(),
        rx_b.local_addr().unwrap().to_string(),
    ];
    let mut tx = FanoutBus::new("127.0.0.1:0", &subscribers).unwrap();

    let payload = FramePayload::RestartTarget { target: TARGET_1 };
    tx.send(&payload.encode()).unwrap();

    let timeout = Duration::from_millis(500);
    let got_a = rx_a.recv(timeout).unwrap().expect("subscriber a");
    let got_b = rx_b.recv(timeout).unwrap().expect("subscriber b");
    assert_eq!(FramePayload::decode(&got_a).unwrap(), payload);
    assert_eq!(FramePayload::decode(&got_b).unwrap(), payload);
}

#[test]
fn test_allowlisted_source_passes() {
    let mut rx = PeerBus::new(
        "127.0.0.1:0",
        "127.0.0.1:9",
        Some(&["127.0.0.1".to_string()]),
        &[],
    )
    .unwrap();
    let addr = rx.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let payload = FramePayload::ComponentReady { component: TARGET_2 };
    sender.send_to(&wire_bytes(&payload), addr).unwrap();

    let got = rx.recv(Duration::from_millis(500)).unwrap().expect("frame");
    assert_eq!(FramePayload::decode(&got).unwrap(), payload);
}

#[test]
fn test_non_allowlisted_source_is_silently_dropped() {
    // Allow-list names an address the test sender does not have: the
    // datagram reaches the transport but never the caller.
    let mut rx = PeerBus::new(
        "127.0.0.1:0",
        "127.0.0.1:9",
        Some(&["10.9.9.9".to_string()]),
        &[],
    )
    .unwrap();
    let addr = rx.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let payload = FramePayload::ComponentReady { component: TARGET_2 };
    sender.send_to(&wire_bytes(&payload), addr).unwrap();

    assert!(rx.recv(Duration::from_millis(200)).unwrap().is_none());
}

#[test]
fn test_denylisted_source_is_dropped() {
    let mut rx = PeerBus::new(
        "127.0.0.1:0",
        "127.0.0.1:9",
        None,
        &["127.0.0.1".to_string()],
    )
    .unwrap();
    let addr = rx.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let payload = FramePayload::RestartTarget { target: TARGET_1 };
    sender.send_to(&wire_bytes(&payload), addr).unwrap();

    assert!(rx.recv(Duration::from_millis(200)).unwrap().is_none());
}

#[test]
fn test_malformed_datagram_is_dropped_and_waiting_continues() {
    let mut rx = FanoutBus::new("127.0.0.1:0", &[]).unwrap();
    let addr = rx.local_addr().unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    // short header, then a valid frame: only the valid one surfaces
    sender.send_to(&[0xAA, 0xFE], addr).unwrap();
    let payload = FramePayload::RestartTarget { target: TARGET_1 };
    sender.send_to(&wire_bytes(&payload), addr).unwrap();

    let got = rx.recv(Duration::from_millis(500)).unwrap().expect("frame");
    assert_eq!(FramePayload::decode(&got).unwrap(), payload);
}

#[test]
fn test_construction_fails_on_bad_address() {
    assert!(FanoutBus::new("not-an-address", &[]).is_err());
    assert!(FanoutBus::new("127.0.0.1:0", &["also not an address".to_string()]).is_err());
    assert!(PeerBus::new(
        "127.0.0.1:0",
        "127.0.0.1:9",
        Some(&["not-an-ip".to_string()]),
        &[],
    )
    .is_err());
}

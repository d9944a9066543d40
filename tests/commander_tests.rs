use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use cmdbus::bus::FanoutBus;
use cmdbus::config::Config;
use cmdbus::coordinators::commander::{Commander, CommanderState};
use cmdbus::events::ComponentEvent;
use cmdbus::protocol::{
    FramePayload, ERROR_UNSPECIFIED, IGNITION, MAX_WIRE_FRAME_LEN, TARGET_1, TARGET_3,
};
use cmdbus::registry::TargetStatus;

fn test_config() -> Config {
    let mut config = Config::default();
    config.timing.cc_timeout_ms = 50;
    config
}

fn make_commander() -> (Commander, UdpSocket, SocketAddr) {
    let bus = FanoutBus::new("127.0.0.1:0", &[]).unwrap();
    let addr = bus.local_addr().unwrap();
    let commander = Commander::new(Box::new(bus), &test_config()).unwrap();
    let injector = UdpSocket::bind("127.0.0.1:0").unwrap();
    (commander, injector, addr)
}

fn inject(sock: &UdpSocket, addr: SocketAddr, payload: FramePayload) {
    let frame = payload.encode();
    let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
    let len = frame.to_wire(&mut buf);
    sock.send_to(&buf[..len], addr).unwrap();
}

#[test]
fn test_boot_reaches_ready_in_one_tick() {
    let (mut commander, _injector, _addr) = make_commander();
    assert_eq!(commander.state(), CommanderState::Boot);
    assert_eq!(commander.tick(), CommanderState::Ready);
}

#[test]
fn test_restart_request_frame_drives_full_reset_cycle() {
    let (mut commander, injector, addr) = make_commander();
    let mut directives = commander.subscribe_events();
    assert_eq!(commander.tick(), CommanderState::Ready);

    // kiosk asks for a TARGET_3 restart over the C&C channel
    inject(&injector, addr, FramePayload::RestartTarget { target: TARGET_3 });
    assert_eq!(commander.tick(), CommanderState::Ready);
    assert_eq!(commander.registry().status(TARGET_3), Ok(TargetStatus::Reset));

    // next advance enters RESTART_TARGET, dispatches the reset directive
    // and parks the target in WAIT
    assert_eq!(commander.tick(), CommanderState::RestartTarget);
    assert_eq!(commander.registry().status(TARGET_3), Ok(TargetStatus::Wait));
    let events = directives.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(
        ComponentEvent::parse(&events[0]),
        Some(ComponentEvent::Reset(3))
    );

    // the supervisor reports the target back up
    commander
        .report_sender()
        .send(ComponentEvent::Ready(3).to_event())
        .unwrap();
    assert_eq!(commander.tick(), CommanderState::Ready);
    assert_eq!(commander.registry().status(TARGET_3), Ok(TargetStatus::Ready));
}

#[test]
fn test_at_most_one_restart_in_flight_per_target() {
    let (mut commander, _injector, _addr) = make_commander();
    let mut directives = commander.subscribe_events();
    commander.tick();

    commander.process_restart_request(TARGET_3);
    assert_eq!(commander.tick(), CommanderState::RestartTarget);
    assert_eq!(directives.drain().len(), 1);
    assert_eq!(commander.registry().status(TARGET_3), Ok(TargetStatus::Wait));

    // a second request for the same target before it reports READY must
    // not start another WAIT -> RESET cycle
    commander.process_restart_request(TARGET_3);
    assert_eq!(commander.tick(), CommanderState::RestartTarget);
    assert!(directives.drain().is_empty());
    assert_eq!(commander.registry().status(TARGET_3), Ok(TargetStatus::Wait));
}

#[test]
fn test_unknown_target_restart_request_is_ignored() {
    let (mut commander, injector, addr) = make_commander();
    let mut directives = commander.subscribe_events();
    commander.tick();

    // IGNITION is not in the commander's registry
    inject(&injector, addr, FramePayload::RestartTarget { target: IGNITION });
    commander.tick();
    assert_eq!(commander.tick(), CommanderState::Ready);
    assert!(directives.drain().is_empty());
}

#[test]
fn test_component_error_frame_schedules_reset() {
    let (mut commander, injector, addr) = make_commander();
    let mut directives = commander.subscribe_events();
    commander.tick();

    inject(
        &injector,
        addr,
        FramePayload::ComponentError {
            component: TARGET_1,
            error_code: ERROR_UNSPECIFIED,
        },
    );
    commander.tick();
    assert_eq!(commander.tick(), CommanderState::RestartTarget);
    assert_eq!(commander.registry().status(TARGET_1), Ok(TargetStatus::Wait));
    assert_eq!(
        ComponentEvent::parse(&directives.drain()[0]),
        Some(ComponentEvent::Reset(1))
    );
}

#[test]
fn test_internal_error_report_requests_restart() {
    let (mut commander, _injector, _addr) = make_commander();
    let mut directives = commander.subscribe_events();
    commander.tick();

    // watchdog-style report: target index 1 (TARGET_1) errored
    commander
        .report_sender()
        .send(ComponentEvent::Error(1).to_event())
        .unwrap();
    assert_eq!(commander.tick(), CommanderState::RestartTarget);
    assert_eq!(commander.registry().status(TARGET_1), Ok(TargetStatus::Wait));
    assert_eq!(
        ComponentEvent::parse(&directives.drain()[0]),
        Some(ComponentEvent::Reset(1))
    );
}

#[test]
fn test_ready_announce_is_rate_limited() {
    let mut config = test_config();
    config.timing.ready_announce_interval_ms = 60_000;

    let observer = UdpSocket::bind("127.0.0.1:0").unwrap();
    observer
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let bus = FanoutBus::new(
        "127.0.0.1:0",
        &[observer.local_addr().unwrap().to_string()],
    )
    .unwrap();
    let mut commander = Commander::new(Box::new(bus), &config).unwrap();

    let mut announces = 0;
    for _ in 0..4 {
        commander.tick();
    }
    let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
    while let Ok((len, _)) = observer.recv_from(&mut buf) {
        let frame = cmdbus::protocol::Frame::from_wire(&buf[..len]).unwrap();
        if let Ok(FramePayload::ComponentReady { .. }) = FramePayload::decode(&frame) {
            announces += 1;
        }
    }
    // several ticks inside one announce interval produce exactly one announce
    assert_eq!(announces, 1);
}

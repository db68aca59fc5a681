//! End-to-end tests for the forwarding loop
//!
//! These drive a full [`FirewallSession`] over the in-memory tunnel device:
//! packets are injected on the input side and the output side is inspected
//! for what the firewall forwarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tun_firewall::config::TunnelConfig;
use tun_firewall::rules::{Action, Rule, RuleEngine, RuleMatch, RuleSet};
use tun_firewall::session::{FirewallSession, SessionState};
use tun_firewall::stats::StatsSnapshot;
use tun_firewall::tun::{MemoryTunnelDevice, MemoryTunnelProvider, TunnelDevice, TunnelProvider};

/// Build an IPv4-shaped packet of the given total length
fn ipv4_packet(len: usize, protocol: u8, dst: [u8; 4]) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buf[0] = 0x45;
    if len >= 20 {
        buf[9] = protocol;
        buf[12..16].copy_from_slice(&[10, 0, 0, 2]);
        buf[16..20].copy_from_slice(&dst);
    }
    buf
}

/// Poll the session snapshot until the predicate holds or a second passes
fn wait_for(session: &FirewallSession, predicate: impl Fn(&StatsSnapshot) -> bool) -> StatsSnapshot {
    let deadline = Instant::now() + Duration::from_secs(1);
    loop {
        let snap = session.stats_snapshot();
        if predicate(&snap) {
            return snap;
        }
        assert!(Instant::now() < deadline, "timed out waiting for stats: {snap:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_state(session: &FirewallSession, state: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while session.state() != state {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for state {state:?}, currently {:?}",
            session.state()
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn start_session(engine: RuleEngine) -> (FirewallSession, Arc<MemoryTunnelDevice>) {
    let provider = Arc::new(MemoryTunnelProvider::new());
    let session = FirewallSession::new(
        TunnelConfig::default(),
        Arc::clone(&provider) as Arc<dyn TunnelProvider>,
        Arc::new(engine),
    );
    session.start().expect("session should start");
    let device = provider.last_device().expect("device was established");
    (session, device)
}

#[test]
fn blocked_destination_is_dropped() {
    // Scenario A: traffic to 198.51.100.1 never reaches the output side
    let (session, device) = start_session(RuleEngine::with_defaults());

    device.inject(ipv4_packet(40, 6, [198, 51, 100, 1]));

    let snap = wait_for(&session, |s| s.total_packets == 1);
    assert_eq!(snap.packets_dropped, 1);
    assert_eq!(snap.threats_blocked, 1);
    assert_eq!(snap.packets_sent, 0);
    assert_eq!(snap.bytes_processed, 40);
    assert!(device.written().is_empty());

    session.stop();
}

#[test]
fn allowed_packet_is_forwarded_unchanged() {
    // Scenario B: an allowed TCP packet comes out byte-identical
    let (session, device) = start_session(RuleEngine::with_defaults());

    let packet = ipv4_packet(60, 6, [8, 8, 8, 8]);
    device.inject(packet.clone());

    let snap = wait_for(&session, |s| s.packets_sent == 1);
    assert_eq!(snap.total_packets, 1);
    assert_eq!(snap.packets_analyzed, 1);
    assert_eq!(snap.packets_dropped, 0);
    assert_eq!(snap.protocol_breakdown.tcp, 1);
    assert_eq!(device.written(), vec![packet]);

    session.stop();
}

#[test]
fn malformed_packet_does_not_kill_the_loop() {
    // Scenario C: a 10-byte packet is counted as analyzed, not dropped,
    // and the loop continues with the next read
    let (session, device) = start_session(RuleEngine::with_defaults());

    device.inject(ipv4_packet(10, 0, [0, 0, 0, 0]));
    let snap = wait_for(&session, |s| s.packets_analyzed == 1);
    assert_eq!(snap.packets_dropped, 0);
    assert_eq!(snap.packets_sent, 0);
    assert!(session.is_running());

    // The next packet is processed normally
    device.inject(ipv4_packet(60, 17, [8, 8, 4, 4]));
    let snap = wait_for(&session, |s| s.packets_sent == 1);
    assert_eq!(snap.packets_analyzed, 2);
    assert_eq!(snap.protocol_breakdown.udp, 1);

    session.stop();
}

#[test]
fn empty_rule_set_allows_everything() {
    // Scenario D
    let (session, device) = start_session(RuleEngine::new(RuleSet::empty()));

    device.inject(ipv4_packet(40, 6, [198, 51, 100, 1]));
    device.inject(ipv4_packet(40, 17, [1, 2, 3, 4]));

    let snap = wait_for(&session, |s| s.packets_sent == 2);
    assert_eq!(snap.packets_dropped, 0);
    assert_eq!(device.written().len(), 2);

    session.stop();
}

#[test]
fn start_then_immediate_stop() {
    // Scenario E: counters stay at zero and the handle is closed
    let (session, device) = start_session(RuleEngine::with_defaults());
    session.stop();

    assert_eq!(session.state(), SessionState::Stopped);
    let snap = session.stats_snapshot();
    assert_eq!(snap.total_packets, 0);
    assert_eq!(snap.bytes_processed, 0);
    assert!(device.is_closed());
    assert_eq!(device.close_count(), 1);
}

#[test]
fn stop_is_idempotent() {
    let (session, device) = start_session(RuleEngine::with_defaults());

    session.stop();
    session.stop();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(device.close_count(), 1);
}

#[test]
fn bytes_processed_sums_all_lengths_regardless_of_verdict() {
    let (session, device) = start_session(RuleEngine::with_defaults());

    device.inject(ipv4_packet(40, 6, [198, 51, 100, 1])); // dropped
    device.inject(ipv4_packet(60, 6, [8, 8, 8, 8])); // forwarded
    device.inject(ipv4_packet(10, 0, [0, 0, 0, 0])); // malformed

    let snap = wait_for(&session, |s| s.total_packets == 3);
    assert_eq!(snap.bytes_processed, 110);
    assert_eq!(snap.packets_dropped, 1);
    assert_eq!(snap.packets_sent, 1);

    session.stop();
}

#[test]
fn spurious_zero_length_read_is_retried() {
    let (session, device) = start_session(RuleEngine::with_defaults());

    device.inject(Vec::new());
    device.inject(ipv4_packet(40, 1, [8, 8, 8, 8]));

    // The empty read leaves no trace; the real packet is processed
    let snap = wait_for(&session, |s| s.packets_sent == 1);
    assert_eq!(snap.total_packets, 1);
    assert_eq!(snap.protocol_breakdown.icmp, 1);

    session.stop();
}

#[test]
fn io_failure_terminates_the_session_with_an_error() {
    let (session, device) = start_session(RuleEngine::with_defaults());

    // Closing the device out from under the session is an unrecoverable
    // I/O failure, not a requested stop
    device.close();
    wait_for_state(&session, SessionState::Stopped);

    let status = session.subscribe_status().borrow().clone();
    assert_eq!(status.state, SessionState::Stopped);
    assert_eq!(
        status.error.as_deref(),
        Some("Tunnel device is closed"),
        "expected a terminal closed-device error"
    );
    assert_eq!(device.close_count(), 1);

    // An explicit start() is required to run again; it gets a fresh device
    session.stop();
    session.start().expect("restart after failure");
    assert!(session.is_running());
    session.stop();
}

#[test]
fn stop_racing_a_worker_failure_never_strands_the_session() {
    // An external close and a stop() arriving together must still end in
    // Stopped, whichever lands first; a session stuck in Stopping would
    // refuse every restart
    let provider = Arc::new(MemoryTunnelProvider::new());
    let session = FirewallSession::new(
        TunnelConfig::default(),
        Arc::clone(&provider) as Arc<dyn TunnelProvider>,
        Arc::new(RuleEngine::with_defaults()),
    );

    for i in 0..200u64 {
        session.start().expect("restart refused; session stranded");
        let device = provider.last_device().expect("device was established");

        let closer = std::thread::spawn(move || device.close());
        std::thread::sleep(Duration::from_micros(i % 40));
        session.stop();
        closer.join().expect("closer thread panicked");

        assert_eq!(session.state(), SessionState::Stopped);
    }
}

#[test]
fn counters_reset_between_sessions() {
    let (session, device) = start_session(RuleEngine::with_defaults());

    device.inject(ipv4_packet(60, 6, [8, 8, 8, 8]));
    wait_for(&session, |s| s.packets_sent == 1);
    session.stop();

    session.start().expect("restart");
    let snap = session.stats_snapshot();
    assert_eq!(snap.total_packets, 0);
    assert_eq!(snap.packets_sent, 0);
    assert_eq!(snap.protocol_breakdown.tcp, 0);
    session.stop();
}

#[test]
fn forwarding_preserves_read_order() {
    let (session, device) = start_session(RuleEngine::new(RuleSet::empty()));

    let packets: Vec<Vec<u8>> = (0u8..10)
        .map(|i| ipv4_packet(40, 6, [10, 0, 0, i]))
        .collect();
    for packet in &packets {
        device.inject(packet.clone());
    }

    wait_for(&session, |s| s.packets_sent == 10);
    assert_eq!(device.written(), packets);

    session.stop();
}

#[test]
fn live_rule_update_applies_to_subsequent_packets() {
    let (session, device) = start_session(RuleEngine::new(RuleSet::empty()));

    device.inject(ipv4_packet(40, 6, [1, 2, 3, 4]));
    wait_for(&session, |s| s.packets_sent == 1);

    session.engine().add_rule(Rule::new(
        99,
        RuleMatch::DestIp("1.2.3.4".parse().unwrap()),
        Action::Drop,
    ));

    device.inject(ipv4_packet(40, 6, [1, 2, 3, 4]));
    let snap = wait_for(&session, |s| s.total_packets == 2);
    assert_eq!(snap.packets_dropped, 1);
    assert_eq!(device.written().len(), 1);

    session.stop();
}

#[test]
fn stats_broadcast_publishes_after_each_packet() {
    let (session, device) = start_session(RuleEngine::with_defaults());
    let stats_rx = session.subscribe_stats();

    device.inject(ipv4_packet(60, 6, [8, 8, 8, 8]));
    wait_for(&session, |s| s.packets_sent == 1);

    let deadline = Instant::now() + Duration::from_secs(1);
    while stats_rx.borrow().total_packets == 0 {
        assert!(Instant::now() < deadline, "broadcast never delivered");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(stats_rx.borrow().packets_sent, 1);

    session.stop();
}

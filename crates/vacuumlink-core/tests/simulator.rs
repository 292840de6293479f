use std::time::Duration;
use vacuumlink_core::datalog::{PressureLog, SampleHistory, LOG_HEADER};
use vacuumlink_core::demo::GaugeSimulator;
use vacuumlink_core::engine::{Engine, EngineConfig, GaugeEvent, StopReason};
use vacuumlink_core::protocol::HandshakeTiming;

fn quick_handshake() -> HandshakeTiming {
    HandshakeTiming {
        ack_window_ms: 1000,
        drain_grace_ms: 5,
        manual_settle_ms: 5,
    }
}

#[test]
fn test_fast_mode_against_simulator() {
    let config = EngineConfig::fast_fixed().with_handshake(quick_handshake());
    let engine = Engine::new(config).unwrap();
    let mut events = engine.subscribe();

    let simulator = GaugeSimulator::new()
        .with_seed(42)
        .with_read_timeout(Duration::from_millis(50));
    let handle = engine.spawn(simulator).unwrap();

    let mut log = PressureLog::new(Vec::new()).unwrap();
    let mut history = SampleHistory::new(100);
    while history.len() < 3 {
        let event = events.blocking_recv().unwrap();
        log.record(&event).unwrap();
        history.record(&event);
    }

    let summary = handle.stop_and_join().unwrap();
    assert_eq!(summary.reason, Some(StopReason::Cancelled));
    assert!(summary.samples >= 3);

    // Pumping down from atmosphere
    let (low, high) = history.range().unwrap();
    assert!(low > 500.0 && high < 1100.0, "range {}..{}", low, high);

    let text = String::from_utf8(log.into_inner()).unwrap();
    assert!(text.starts_with(LOG_HEADER));
    assert_eq!(text.lines().count(), 4);
    for record in text.lines().skip(1) {
        assert!(record.starts_with('['), "{}", record);
        assert!(record.contains("]   0,"), "{}", record);
    }
}

#[test]
fn test_glitches_are_reported_not_fatal() {
    let config = EngineConfig::fast_fixed().with_handshake(quick_handshake());
    let engine = Engine::new(config).unwrap();
    let mut events = engine.subscribe();

    let simulator = GaugeSimulator::new()
        .with_seed(1)
        .with_glitch_rate(1.0)
        .with_read_timeout(Duration::from_millis(50));
    let handle = engine.spawn(simulator).unwrap();

    for _ in 0..2 {
        match events.blocking_recv().unwrap() {
            GaugeEvent::Protocol(vacuumlink_core::protocol::ProtocolEvent::MalformedLine {
                raw_line,
                ..
            }) => assert_eq!(raw_line, "0,#####"),
            other => panic!("Expected malformed line, got {:?}", other),
        }
    }

    let summary = handle.stop_and_join().unwrap();
    assert_eq!(summary.samples, 0);
    assert!(summary.malformed >= 2);
}

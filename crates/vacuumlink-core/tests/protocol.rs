use chrono::Local;
use pretty_assertions::assert_eq;
use vacuumlink_core::protocol::{
    parse_line, Frame, LineFramer, LineKind, MalformedReason, MemoryTransport, PollMode, ACK,
};

fn frames(transport: &mut MemoryTransport) -> Vec<Frame> {
    let mut framer = LineFramer::new();
    let mut out = Vec::new();
    loop {
        let frame = framer.next_line(transport).unwrap();
        let done = frame == Frame::EndOfStream;
        out.push(frame);
        if done {
            return out;
        }
    }
}

#[test]
fn test_framing_ignores_arrival_boundaries() {
    let text = b"0,1.0000E-03\r\n0,2.0000E-03\r\n";
    let mut whole = MemoryTransport::new().then_bytes(text);
    let mut split = MemoryTransport::new()
        .then_bytes(&text[..5])
        .then_bytes(&text[5..17])
        .then_bytes(&text[17..]);
    let mut single = MemoryTransport::new().then_bytes_singly(text);

    let expected = vec![
        Frame::Line("0,1.0000E-03".into()),
        Frame::Line("0,2.0000E-03".into()),
        Frame::EndOfStream,
    ];
    assert_eq!(frames(&mut whole), expected);
    assert_eq!(frames(&mut split), expected);
    assert_eq!(frames(&mut single), expected);
}

#[test]
fn test_stall_reports_idle_and_keeps_partial_line() {
    let mut transport = MemoryTransport::new()
        .then_bytes(b"0,5.")
        .then_stall()
        .then_bytes(b"5E+01\n");
    assert_eq!(
        frames(&mut transport),
        vec![
            Frame::Idle,
            Frame::Line("0,5.5E+01".into()),
            Frame::EndOfStream
        ]
    );
}

#[test]
fn test_every_well_formed_line_becomes_a_sample() {
    let values = [1.0e-9, 4.2e-5, 0.00123, 1.0, 999.9, 1013.25, 5.0e3];
    for status in ["0", "1", "2", "5"] {
        for value in values {
            for text in [format!("{:E}", value), format!("{}", value)] {
                let line = format!("{},{}", status, text);
                match parse_line(&line, Local::now()) {
                    LineKind::Sample(sample) => {
                        assert_eq!(sample.status, status);
                        assert!((sample.value - value).abs() <= value * 1e-12, "{}", line);
                        assert_eq!(sample.raw_line, line);
                    }
                    other => panic!("Expected sample for {:?}, got {:?}", line, other),
                }
            }
        }
    }
}

#[test]
fn test_malformed_lines_are_classified() {
    let cases = [
        ("justtext", MalformedReason::FieldCount),
        ("1.23E-3", MalformedReason::FieldCount),
        ("0,", MalformedReason::NumericParse),
        ("0,abc", MalformedReason::NumericParse),
        ("0,1.2.3", MalformedReason::NumericParse),
        ("0,#####", MalformedReason::NumericParse),
    ];
    for (line, reason) in cases {
        assert_eq!(
            parse_line(line, Local::now()),
            LineKind::Malformed(reason),
            "{}",
            line
        );
    }
}

#[test]
fn test_ack_forms() {
    let ack = String::from_utf8(vec![ACK]).unwrap();
    for line in ["ACK", " ACK ", ack.as_str()] {
        assert_eq!(parse_line(line, Local::now()), LineKind::Ack, "{:?}", line);
    }
    assert_eq!(parse_line("   ", Local::now()), LineKind::Empty);
}

#[test]
fn test_mode_commands() {
    assert_eq!(PollMode::FastFixed.command(), b"COM,0\r");
    assert_eq!(PollMode::SlowFixed.command(), b"COM,1\r");
    assert_eq!(PollMode::Manual.command(), b"COM\r");
    assert!(PollMode::FastFixed.expects_ack());
    assert!(PollMode::SlowFixed.expects_ack());
    assert!(!PollMode::Manual.expects_ack());
}

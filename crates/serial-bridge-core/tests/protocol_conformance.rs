//! Integration tests for the serial-bridge-core public API.
//!
//! These tests exercise the framer and codec together the way the gateway
//! does: raw serial chunks go in, JSON text frames come out, and client text
//! frames are decoded into requests.

use serial_bridge_core::{
    decode_request, encode_event, BaudRate, ClientRequest, CodecError, Framed, GatewayEvent,
    LineFramer, PortInfo,
};

/// Runs `chunks` through a fresh framer and returns the encoded
/// `data-received` frames the gateway would send.
fn frames_for(chunks: &[&[u8]]) -> Vec<String> {
    let mut framer = LineFramer::new();
    let mut out = Vec::new();
    for chunk in chunks {
        for item in framer.feed(chunk) {
            if let Framed::Record(record) = item {
                let event = GatewayEvent::DataReceived {
                    data: String::from_utf8_lossy(&record).into_owned(),
                };
                out.push(encode_event(&event).expect("encode must succeed"));
            }
        }
    }
    out
}

#[test]
fn test_split_stream_produces_data_received_frames_in_order() {
    let frames = frames_for(&[b"A\nB\n", b"C\nD"]);

    assert_eq!(
        frames,
        vec![
            r#"{"type":"data-received","data":"A"}"#,
            r#"{"type":"data-received","data":"B"}"#,
            r#"{"type":"data-received","data":"C"}"#,
        ]
    );
}

#[test]
fn test_crlf_terminated_record_has_no_carriage_return_on_the_wire() {
    let frames = frames_for(&[b"VOLT 3.3\r\n"]);
    assert_eq!(frames, vec![r#"{"type":"data-received","data":"VOLT 3.3"}"#]);
}

#[test]
fn test_invalid_utf8_is_replaced_not_dropped() {
    let frames = frames_for(&[b"\xffok\n"]);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("\u{FFFD}ok"));
}

#[test]
fn test_enumeration_result_with_only_path() {
    let event = GatewayEvent::PortsList {
        ports: vec![PortInfo::new("/dev/ttyUSB0")],
    };

    let text = encode_event(&event).unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "ports-list");
    let port = value["ports"][0].as_object().unwrap();
    assert_eq!(port.len(), 1, "optional fields must be absent: {port:?}");
    assert_eq!(port["path"], "/dev/ttyUSB0");
}

#[test]
fn test_browser_style_connect_is_decoded() {
    // The dashboard sends the baud rate exactly as its <select> value.
    let req = decode_request(r#"{"type":"connect","port":"COM3","baudRate":"9600"}"#).unwrap();

    assert_eq!(
        req,
        ClientRequest::Connect {
            port: "COM3".to_string(),
            baud_rate: BaudRate::new(9600).unwrap(),
        }
    );
}

#[test]
fn test_malformed_message_error_text_is_descriptive() {
    let err = decode_request(r#"{"type":"send-data"}"#).unwrap_err();

    assert!(matches!(err, CodecError::MalformedMessage(_)));
    assert!(err.to_string().starts_with("malformed message:"));
    assert!(err.to_string().contains("data"));
}

//! Text codec for the client-facing control protocol.
//!
//! Wire format: one JSON object per WebSocket text frame, discriminated by a
//! `"type"` field.  See [`crate::protocol::messages`] for every shape.
//!
//! Decoding is strict about *what* a message must contain (known `type`,
//! required fields present and well-typed) and lenient about *extra* fields,
//! which are ignored so that newer clients can talk to older gateways.

use thiserror::Error;

use crate::protocol::messages::{ClientRequest, GatewayEvent};

/// Errors that can occur while decoding or encoding protocol messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The text is not JSON, has an unknown `type`, or is missing or mistypes
    /// a required field.
    ///
    /// This is bad client input.  The session reports it and carries on.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one client request from a text frame.
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] when `text` is not valid JSON or
/// does not describe one of the known request variants.
///
/// # Examples
///
/// ```rust
/// use serial_bridge_core::{decode_request, ClientRequest};
///
/// let req = decode_request(r#"{"type":"list-ports"}"#).unwrap();
/// assert_eq!(req, ClientRequest::ListPorts);
///
/// assert!(decode_request("not json").is_err());
/// ```
pub fn decode_request(text: &str) -> Result<ClientRequest, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Encodes one gateway event as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.  None of the
/// [`GatewayEvent`] variants contain types that can fail to serialize, so in
/// practice this always succeeds.
pub fn encode_event(event: &GatewayEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Encode(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{BaudRate, PortInfo};

    #[test]
    fn test_decode_every_request_variant() {
        assert_eq!(
            decode_request(r#"{"type":"list-ports"}"#).unwrap(),
            ClientRequest::ListPorts
        );
        assert_eq!(
            decode_request(r#"{"type":"connect","port":"COM4","baudRate":"115200"}"#).unwrap(),
            ClientRequest::Connect {
                port: "COM4".to_string(),
                baud_rate: BaudRate::new(115_200).unwrap(),
            }
        );
        assert_eq!(
            decode_request(r#"{"type":"send-data","data":"PING"}"#).unwrap(),
            ClientRequest::SendData {
                data: "PING".to_string()
            }
        );
        assert_eq!(
            decode_request(r#"{"type":"disconnect"}"#).unwrap(),
            ClientRequest::Disconnect
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        // Arrange: a newer client adds fields this gateway does not know about
        let text = r#"{"type":"send-data","data":"x","requestId":7,"echo":true}"#;

        // Act
        let req = decode_request(text).unwrap();

        // Assert
        assert_eq!(
            req,
            ClientRequest::SendData {
                data: "x".to_string()
            }
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields_on_unit_variants() {
        let req = decode_request(r#"{"type":"disconnect","port":"/dev/ttyUSB0"}"#).unwrap();
        assert_eq!(req, ClientRequest::Disconnect);
    }

    #[test]
    fn test_decode_invalid_json_is_malformed() {
        let err = decode_request("{not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_unknown_type_is_malformed() {
        let err = decode_request(r#"{"type":"reboot"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_missing_type_is_malformed() {
        let err = decode_request(r#"{"data":"x"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_missing_required_field_is_malformed() {
        let err = decode_request(r#"{"type":"connect","port":"COM1"}"#).unwrap_err();
        match err {
            CodecError::MalformedMessage(msg) => assert!(msg.contains("baudRate"), "{msg}"),
            other => panic!("expected MalformedMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_non_numeric_baud_rate_is_malformed() {
        let err =
            decode_request(r#"{"type":"connect","port":"COM1","baudRate":"fast"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_non_object_is_malformed() {
        assert!(decode_request("[]").is_err());
        assert!(decode_request("42").is_err());
        assert!(decode_request("").is_err());
    }

    #[test]
    fn test_encode_ports_list_omits_absent_fields() {
        let event = GatewayEvent::PortsList {
            ports: vec![PortInfo::new("/dev/ttyUSB0")],
        };
        let text = encode_event(&event).unwrap();
        assert_eq!(
            text,
            r#"{"type":"ports-list","ports":[{"path":"/dev/ttyUSB0"}]}"#
        );
    }

    #[test]
    fn test_encode_connected_echoes_baud_rate_as_string() {
        let event = GatewayEvent::Connected {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: BaudRate::new(9600).unwrap(),
        };
        let text = encode_event(&event).unwrap();
        assert_eq!(
            text,
            r#"{"type":"connected","port":"/dev/ttyACM0","baudRate":"9600"}"#
        );
    }

    #[test]
    fn test_encode_unit_and_error_events() {
        assert_eq!(
            encode_event(&GatewayEvent::Disconnected).unwrap(),
            r#"{"type":"disconnected"}"#
        );
        assert_eq!(
            encode_event(&GatewayEvent::error("Port not connected")).unwrap(),
            r#"{"type":"error","message":"Port not connected"}"#
        );
    }

    #[test]
    fn test_encode_data_received_escapes_control_characters() {
        let event = GatewayEvent::DataReceived {
            data: "tab\there \"quoted\"".to_string(),
        };
        let text = encode_event(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"], "tab\there \"quoted\"");
    }
}

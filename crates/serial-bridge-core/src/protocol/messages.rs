//! JSON envelope types for the client-facing control protocol.
//!
//! Every message is a JSON object with a `"type"` field naming the variant.
//! All other fields sit flat in the same object, using camelCase names:
//!
//! ```json
//! {"type":"connect","port":"/dev/ttyUSB0","baudRate":"115200"}
//! {"type":"data-received","data":"temp=21.5"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles the discriminant.
//!
//! # Why separate request and event types?
//!
//! Clients only ever *send* requests and the gateway only ever *sends*
//! events.  Two distinct enums make it a compile-time error to emit a request
//! towards a client or to dispatch an event as if it were a request.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

// ── Shared types ──────────────────────────────────────────────────────────────

/// Read-only description of a serial device found during enumeration.
///
/// Optional fields are omitted from the JSON object when unknown, so a bare
/// virtual port serializes as just `{"path":"/dev/ttyS0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// OS path or name of the port (`/dev/ttyUSB0`, `COM3`, …).
    pub path: String,

    /// USB manufacturer string, when the driver reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// USB product id as a 4-digit lowercase hex string (e.g. `"7523"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// USB vendor id as a 4-digit lowercase hex string (e.g. `"1a86"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
}

impl PortInfo {
    /// Creates a `PortInfo` with only a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            manufacturer: None,
            product_id: None,
            vendor_id: None,
        }
    }
}

/// A serial line speed in bits per second.
///
/// On the wire the baud rate travels as a decimal string (`"9600"`), which is
/// what browser `<select>` elements naturally produce.  A plain JSON integer
/// is accepted as well.  Zero, negative, fractional, and non-numeric values
/// are rejected during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudRate(u32);

impl BaudRate {
    /// Creates a baud rate, returning `None` for zero.
    pub fn new(bits_per_second: u32) -> Option<Self> {
        (bits_per_second > 0).then_some(Self(bits_per_second))
    }

    /// Returns the rate in bits per second.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BaudRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(BaudRate::new)
            .ok_or_else(|| format!("invalid baud rate: {s:?}"))
    }
}

impl Serialize for BaudRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BaudRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BaudRateVisitor;

        impl de::Visitor<'_> for BaudRateVisitor {
            type Value = BaudRate;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive baud rate as a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BaudRate, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BaudRate, E> {
                u32::try_from(v)
                    .ok()
                    .and_then(BaudRate::new)
                    .ok_or_else(|| E::custom(format!("invalid baud rate: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BaudRate, E> {
                u32::try_from(v)
                    .ok()
                    .and_then(BaudRate::new)
                    .ok_or_else(|| E::custom(format!("invalid baud rate: {v}")))
            }
        }

        deserializer.deserialize_any(BaudRateVisitor)
    }
}

// ── Client → Gateway ──────────────────────────────────────────────────────────

/// All requests a client can send to the gateway.
///
/// ```json
/// {"type":"list-ports"}
/// {"type":"connect","port":"COM3","baudRate":"9600"}
/// {"type":"send-data","data":"LED ON"}
/// {"type":"disconnect"}
/// ```
///
/// Unknown extra fields are ignored.  A missing required field or an unknown
/// `type` fails deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
    /// Enumerate the serial devices currently attached to the host.
    ListPorts,

    /// Open `port` at `baud_rate`, closing any device already held.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// OS path of the port to open.
        port: String,
        /// Line speed.
        baud_rate: BaudRate,
    },

    /// Write `data` followed by `\n` to the open device.
    SendData {
        /// One record of text, without its delimiter.
        data: String,
    },

    /// Close the open device, if any.
    Disconnect,
}

impl ClientRequest {
    /// Returns the wire tag of this request.
    ///
    /// Used in log lines instead of `{:?}` so that payloads written to the
    /// device never end up in the logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::ListPorts => "list-ports",
            ClientRequest::Connect { .. } => "connect",
            ClientRequest::SendData { .. } => "send-data",
            ClientRequest::Disconnect => "disconnect",
        }
    }
}

// ── Gateway → Client ──────────────────────────────────────────────────────────

/// All events the gateway sends to a client.
///
/// ```json
/// {"type":"ports-list","ports":[{"path":"/dev/ttyUSB0"}]}
/// {"type":"connected","port":"/dev/ttyUSB0","baudRate":"115200"}
/// {"type":"disconnected"}
/// {"type":"data-received","data":"temp=21.5"}
/// {"type":"error","message":"Port not connected"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Result of a `list-ports` request.  The list may be empty.
    PortsList {
        /// Every port the driver reported.
        ports: Vec<PortInfo>,
    },

    /// A device is now open.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Path that was opened.
        port: String,
        /// Line speed it was opened at.
        baud_rate: BaudRate,
    },

    /// The device was closed.
    Disconnected,

    /// One delimiter-stripped record read from the device.
    DataReceived {
        /// Record text.  Invalid UTF-8 is replaced with U+FFFD.
        data: String,
    },

    /// Any failure, reported once per occurrence.
    Error {
        /// Human-readable description.
        message: String,
    },
}

impl GatewayEvent {
    /// Convenience constructor for [`GatewayEvent::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        GatewayEvent::Error {
            message: message.into(),
        }
    }

    /// Returns the wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::PortsList { .. } => "ports-list",
            GatewayEvent::Connected { .. } => "connected",
            GatewayEvent::Disconnected => "disconnected",
            GatewayEvent::DataReceived { .. } => "data-received",
            GatewayEvent::Error { .. } => "error",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

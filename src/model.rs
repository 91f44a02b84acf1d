// ABOUTME: Wire and application-level data types shared by the codec, cryptor and relay loop
// ABOUTME: Envelope is the unit published to the broker; ApplicationMessage is the child-side "name:data" format

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// A control message steering the session cryptor or signalling pipe-mode EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Default)]
#[repr(u8)]
pub enum ControlCode {
    #[default]
    Data = 0,
    ResetInboundSymkey = 1,
    Eof = 2,
}

impl ControlCode {
    pub fn is_data(&self) -> bool {
        matches!(self, ControlCode::Data)
    }
}

impl Serialize for ControlCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for ControlCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        ControlCode::try_from(value).map_err(serde::de::Error::custom)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The unit of publication on the broker.
///
/// `data` round-trips arbitrary bytes through JSON by way of base64; zero
/// values are omitted on the wire the way the original implementation's
/// `omitempty` struct tags do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,

    #[serde(
        default,
        rename = "data",
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub data: Vec<u8>,

    #[serde(default, rename = "sec", skip_serializing_if = "is_false")]
    pub secured: bool,

    #[serde(
        default,
        rename = "ctl",
        skip_serializing_if = "ControlCode::is_data"
    )]
    pub control: ControlCode,

    #[serde(default, skip_serializing_if = "is_false")]
    pub pipe: bool,
}

impl Envelope {
    pub fn data_envelope(from: &str, to: &str, data: Vec<u8>, pipe: bool) -> Self {
        Envelope {
            from: from.to_owned(),
            to: to.to_owned(),
            data,
            secured: false,
            control: ControlCode::Data,
            pipe,
        }
    }

    pub fn reset_envelope(from: &str, to: &str) -> Self {
        Envelope {
            from: from.to_owned(),
            to: to.to_owned(),
            data: Vec::new(),
            secured: false,
            control: ControlCode::ResetInboundSymkey,
            pipe: false,
        }
    }

    pub fn eof_envelope(from: &str, to: &str) -> Self {
        Envelope {
            from: from.to_owned(),
            to: to.to_owned(),
            data: Vec::new(),
            secured: false,
            control: ControlCode::Eof,
            pipe: true,
        }
    }

    /// The directional pair key `from:to`, used both as a broker key suffix
    /// and a local cache key. `A:B` and `B:A` are distinct keys.
    pub fn pair_key(from: &str, to: &str) -> String {
        format!("{from}:{to}")
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The child-side inline format: `TARGET:PAYLOAD`, target left of the first
/// colon byte, payload everything after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationMessage {
    pub name: String,
    pub data: Vec<u8>,
}

impl ApplicationMessage {
    /// Splits `frame` on the first `:` byte. A frame with no colon is a
    /// protocol error.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let idx = frame.iter().position(|&b| b == b':')?;
        let name = String::from_utf8(frame[..idx].to_vec()).ok()?;
        let data = frame[idx + 1..].to_vec();
        Some(ApplicationMessage { name, data })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + 1 + self.data.len());
        out.extend_from_slice(self.name.as_bytes());
        out.push(b':');
        out.extend_from_slice(&self.data);
        out
    }
}

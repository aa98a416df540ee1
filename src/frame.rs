//! Line-delimited JSON wire framing.
//!
//! Each outbound frame is one JSON object serialized to a single line followed by
//! `\n`. Each inbound line is parsed into a tagged [`InboundFrame`]. Framing never
//! raises to the caller directly — malformed lines are surfaced as a `FrameError`
//! that the engine's reader loop turns into an [`crate::error::ProtocolErrorKind`]
//! on the error channel, per the spec's "parse errors are never raised inline"
//! rule.

use serde::Serialize;
use serde_json::{Map, Value};

/// Maximum accepted line length, in bytes. Longer lines are rejected as malformed
/// rather than parsed — a runaway or corrupted stream should not grow an unbounded
/// `String`.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A command about to go out on the wire.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub id: u64,
    pub command: String,
    pub args: Map<String, Value>,
}

impl OutboundFrame {
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Encode to a single `\n`-terminated line.
    pub fn encode(&self) -> Vec<u8> {
        let mut map = self.args.clone();
        map.insert("id".to_string(), Value::from(self.id));
        map.insert("command".to_string(), Value::from(self.command.clone()));
        let mut line = serde_json::to_vec(&Value::Object(map)).expect("map serializes");
        line.push(b'\n');
        line
    }
}

/// A parsed line from the device.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Response {
        id: u64,
        ok: bool,
        value: Option<Value>,
        error: Option<String>,
    },
    Sample {
        id: u64,
        value: i64,
    },
    /// Recognized `type` the driver doesn't otherwise care about (e.g. a
    /// device-originated informational event). Carried through so the engine can
    /// choose to log it rather than treat it as a protocol fault.
    Event {
        fields: Map<String, Value>,
    },
}

#[derive(Debug, Clone)]
pub enum FrameError {
    Empty,
    TooLong(usize, usize),
    NotAnObject,
    MissingField(&'static str),
    UnknownType(String),
    WrongType(&'static str),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty line"),
            Self::TooLong(n, max) => write!(f, "line too long ({n} bytes, max {max})"),
            Self::NotAnObject => f.write_str("line is not a JSON object"),
            Self::MissingField(name) => write!(f, "missing field `{name}`"),
            Self::UnknownType(t) => write!(f, "unknown frame type `{t}`"),
            Self::WrongType(name) => write!(f, "field `{name}` has the wrong type"),
        }
    }
}

/// Parse one line of input into a frame. `line` should not include the trailing
/// newline (callers typically get lines from a `BufRead::read_line` and trim it).
/// `max_len` is the configured ceiling (`Config::io::max_line_len`); callers with no
/// config to hand should pass [`MAX_LINE_LEN`].
pub fn decode(line: &str, max_len: usize) -> Result<InboundFrame, FrameError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    if trimmed.len() > max_len {
        return Err(FrameError::TooLong(trimmed.len(), max_len));
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|_| FrameError::NotAnObject)?;
    let map = value.as_object().ok_or(FrameError::NotAnObject)?;

    let frame_type = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingField("type"))?;

    match frame_type {
        "response" => {
            let id = map
                .get("id")
                .and_then(Value::as_u64)
                .ok_or(FrameError::MissingField("id"))?;
            let ok = map
                .get("ok")
                .and_then(Value::as_bool)
                .ok_or(FrameError::MissingField("ok"))?;
            let value = map.get("value").cloned();
            let error = match map.get("error") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(FrameError::WrongType("error")),
                None => None,
            };
            Ok(InboundFrame::Response {
                id,
                ok,
                value,
                error,
            })
        }
        "sample" => {
            let id = map
                .get("id")
                .and_then(Value::as_u64)
                .ok_or(FrameError::MissingField("id"))?;
            let value = map
                .get("value")
                .and_then(Value::as_i64)
                .ok_or(FrameError::MissingField("value"))?;
            Ok(InboundFrame::Sample { id, value })
        }
        "event" => Ok(InboundFrame::Event { fields: map.clone() }),
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

/// Helper used by the driver facade to turn simple scalar arguments into JSON
/// values without callers reaching for `serde_json` directly.
pub fn arg_value<T: Serialize>(v: T) -> Value {
    serde_json::to_value(v).expect("scalar serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_command_with_args() {
        let frame = OutboundFrame::new(7, "set_signal")
            .with_arg("pin", "D40")
            .with_arg("level", "HIGH");
        let line = frame.encode();
        assert!(line.ends_with(b"\n"));
        let value: Value = serde_json::from_slice(&line[..line.len() - 1]).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["command"], "set_signal");
        assert_eq!(value["pin"], "D40");
        assert_eq!(value["level"], "HIGH");
    }

    #[test]
    fn decodes_ok_response() {
        let frame =
            decode(r#"{"id":1,"type":"response","ok":true,"value":"HIGH"}"#, MAX_LINE_LEN)
                .unwrap();
        match frame {
            InboundFrame::Response { id, ok, value, error } => {
                assert_eq!(id, 1);
                assert!(ok);
                assert_eq!(value.unwrap(), Value::from("HIGH"));
                assert!(error.is_none());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn decodes_error_response() {
        let frame = decode(
            r#"{"id":2,"type":"response","ok":false,"error":"INVALID_PIN"}"#,
            MAX_LINE_LEN,
        )
        .unwrap();
        match frame {
            InboundFrame::Response { ok, error, .. } => {
                assert!(!ok);
                assert_eq!(error.unwrap(), "INVALID_PIN");
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn decodes_sample() {
        let frame = decode(r#"{"id":3,"type":"sample","value":1}"#, MAX_LINE_LEN).unwrap();
        match frame {
            InboundFrame::Sample { id, value } => {
                assert_eq!(id, 3);
                assert_eq!(value, 1);
            }
            _ => panic!("expected sample"),
        }
    }

    #[test]
    fn rejects_empty_line() {
        assert!(matches!(decode("", MAX_LINE_LEN), Err(FrameError::Empty)));
        assert!(matches!(decode("\r\n", MAX_LINE_LEN), Err(FrameError::Empty)));
    }

    #[test]
    fn rejects_too_long_line() {
        let huge = "x".repeat(MAX_LINE_LEN + 1);
        assert!(matches!(
            decode(&huge, MAX_LINE_LEN),
            Err(FrameError::TooLong(_, _))
        ));
    }

    #[test]
    fn rejects_line_exceeding_a_configured_smaller_limit() {
        let line = r#"{"id":1,"type":"response","ok":true,"value":"HIGH"}"#;
        assert!(matches!(
            decode(line, 10),
            Err(FrameError::TooLong(_, 10))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            decode("not json", MAX_LINE_LEN),
            Err(FrameError::NotAnObject)
        ));
    }

    #[test]
    fn rejects_unknown_frame_type() {
        assert!(matches!(
            decode(r#"{"id":1,"type":"mystery"}"#, MAX_LINE_LEN),
            Err(FrameError::UnknownType(_))
        ));
    }

    #[test]
    fn rejects_missing_id() {
        assert!(matches!(
            decode(r#"{"type":"response","ok":true}"#, MAX_LINE_LEN),
            Err(FrameError::MissingField("id"))
        ));
    }
}

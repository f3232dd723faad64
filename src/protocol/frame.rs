/// Typed message envelope exchanged with clients
///
/// Every frame travels as one JSON text message:
/// `{"type": "...", "data": "...", "timestamp": <ms since epoch>}`.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame decoding errors
#[derive(Error, Debug)]
pub enum FrameError {
    /// Payload was not a JSON envelope
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope carried a type this server does not know
    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    /// Binary payload was not UTF-8
    #[error("Frame payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// client → server: shell command line to run
    Command,
    /// client → server: keystrokes for the running process
    Input,
    /// server → client: chunk of process output
    Output,
    /// server → client: normalized exit code
    Exit,
    /// server → client: human-readable failure
    Error,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Command => "command",
            FrameType::Input => "input",
            FrameType::Output => "output",
            FrameType::Exit => "exit",
            FrameType::Error => "error",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "command" => Some(FrameType::Command),
            "input" => Some(FrameType::Input),
            "output" => Some(FrameType::Output),
            "exit" => Some(FrameType::Exit),
            "error" => Some(FrameType::Error),
            _ => None,
        }
    }
}

/// One message unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub data: String,
    pub timestamp: i64,
}

/// Lenient wire shape: clients may omit `data` and `timestamp`
#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    timestamp: i64,
}

impl Frame {
    /// Build a frame stamped with the current time
    pub fn new(kind: FrameType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            timestamp: now_millis(),
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::new(FrameType::Command, command)
    }

    pub fn input(keys: impl Into<String>) -> Self {
        Self::new(FrameType::Input, keys)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(FrameType::Output, text)
    }

    pub fn exit(code: i32) -> Self {
        Self::new(FrameType::Exit, code.to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FrameType::Error, message)
    }

    /// Decode a text message
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let kind = FrameType::parse(&raw.kind).ok_or(FrameError::UnknownType(raw.kind))?;
        Ok(Self {
            kind,
            data: raw.data,
            timestamp: raw.timestamp,
        })
    }

    /// Decode a binary message carrying a UTF-8 JSON envelope
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
        Self::decode(text)
    }

    /// Encode as a JSON text message
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Replace invalid UTF-8 with U+FFFD. Valid text passes through unchanged.
pub fn sanitize_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Streaming UTF-8 decoder for pty output.
///
/// A multi-byte character split across two reads is held back until the
/// rest arrives instead of being replaced.
#[derive(Debug, Default)]
pub struct OutputDecoder {
    pending: Vec<u8>,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, carrying any incomplete trailing sequence
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // 不完整的多字节序列，留给下一块
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// Flush whatever is still held back at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(sanitize_output(&pending))
    }
}

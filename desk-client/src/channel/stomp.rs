// desk-client/src/channel/stomp.rs
// STOMP 1.2 帧编解码 (WebSocket 文本帧)

use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Protocol version negotiated in CONNECT
pub const STOMP_VERSION: &str = "1.2";

/// STOMP frame commands used by the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // client -> broker
    Connect,
    Subscribe,
    Unsubscribe,
    Send,
    Disconnect,
    // broker -> client
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            // STOMP is accepted as a CONNECT alias
            "CONNECT" | "STOMP" => Some(Self::Connect),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "SEND" => Some(Self::Send),
            "DISCONNECT" => Some(Self::Disconnect),
            "CONNECTED" => Some(Self::Connected),
            "MESSAGE" => Some(Self::Message),
            "RECEIPT" => Some(Self::Receipt),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// CONNECT / CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order; repeated keys keep the first value
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    // ========== client frames ==========

    pub fn connect(host: &str, bearer: &str, heartbeat: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heartbeat)
            .with_header("Authorization", bearer)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).with_header("receipt", receipt)
    }

    // ========== broker frames ==========

    pub fn connected(heartbeat: &str) -> Self {
        Self::new(Command::Connected)
            .with_header("version", STOMP_VERSION)
            .with_header("heart-beat", heartbeat)
    }

    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Self::new(Command::Message)
            .with_header("destination", destination)
            .with_header("subscription", subscription)
            .with_header("message-id", message_id)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    pub fn receipt(receipt_id: &str) -> Self {
        Self::new(Command::Receipt).with_header("receipt-id", receipt_id)
    }

    pub fn error(message: &str) -> Self {
        Self::new(Command::Error).with_header("message", message)
    }

    /// Encode to wire text (NUL terminated)
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in a text payload.
    ///
    /// Heart-beats (bare EOLs) between or instead of frames are skipped, so
    /// an empty vector means the payload was a heart-beat.
    pub fn decode_all(raw: &str) -> ClientResult<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut rest = raw;
        loop {
            rest = rest.trim_start_matches(['\n', '\r']);
            if rest.is_empty() {
                break;
            }
            let (frame, remaining) = Self::decode_one(rest)?;
            frames.push(frame);
            rest = remaining;
        }
        Ok(frames)
    }

    /// Decode a payload frame by frame, dropping malformed frames.
    ///
    /// A bad frame is skipped up to its NUL terminator; frames before and
    /// after it are still returned.
    pub fn decode_lossy(raw: &str) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = raw;
        loop {
            rest = rest.trim_start_matches(['\n', '\r']);
            if rest.is_empty() {
                break;
            }
            match Self::decode_one(rest) {
                Ok((frame, remaining)) => {
                    frames.push(frame);
                    rest = remaining;
                }
                Err(e) => {
                    tracing::warn!("Dropping malformed STOMP frame: {e}");
                    match rest.find('\0') {
                        Some(end) => rest = &rest[end + 1..],
                        None => break,
                    }
                }
            }
        }
        frames
    }

    fn decode_one(raw: &str) -> ClientResult<(Frame, &str)> {
        let (command_line, mut rest) = split_line(raw)
            .ok_or_else(|| ClientError::Protocol("truncated frame: missing command".into()))?;
        let command = Command::parse(command_line)
            .ok_or_else(|| ClientError::Protocol(format!("unknown command: {command_line}")))?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, remaining) = split_line(rest)
                .ok_or_else(|| ClientError::Protocol("truncated frame: headers".into()))?;
            rest = remaining;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| ClientError::Protocol(format!("malformed header: {line}")))?;
            if escaped {
                headers.push((unescape_header(key)?, unescape_header(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ClientError::Protocol(format!("bad content-length: {v}")))
            })
            .transpose()?;

        let (body, remaining) = match content_length {
            Some(len) => {
                let body = rest
                    .get(..len)
                    .ok_or_else(|| ClientError::Protocol("body shorter than content-length".into()))?;
                let after = &rest[len..];
                let after = after
                    .strip_prefix('\0')
                    .ok_or_else(|| ClientError::Protocol("missing frame terminator".into()))?;
                (body, after)
            }
            None => {
                let end = rest
                    .find('\0')
                    .ok_or_else(|| ClientError::Protocol("missing frame terminator".into()))?;
                (&rest[..end], &rest[end + 1..])
            }
        };

        Ok((
            Frame {
                command,
                headers,
                body: body.to_string(),
            },
            remaining,
        ))
    }
}

/// Heart-beat intervals agreed for one connection (`None` = off)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl HeartBeat {
    /// Combine our `interval,interval` offer with the broker's CONNECTED
    /// `heart-beat` header.
    ///
    /// Each direction runs at the slower of the two sides and is off when
    /// either side sent 0. A missing or unparsable header counts as `0,0`.
    pub fn negotiate(interval: Duration, connected: Option<&str>) -> Self {
        let ours = interval.as_millis() as u64;
        let (server_sends, server_wants) = connected
            .and_then(|raw| raw.split_once(','))
            .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
            .unwrap_or((0, 0));

        let pick = |a: u64, b: u64| (a != 0 && b != 0).then(|| Duration::from_millis(a.max(b)));
        Self {
            outgoing: pick(ours, server_wants),
            incoming: pick(ours, server_sends),
        }
    }
}

/// Split off one line, accepting LF or CRLF endings
fn split_line(raw: &str) -> Option<(&str, &str)> {
    let idx = raw.find('\n')?;
    let line = raw[..idx].strip_suffix('\r').unwrap_or(&raw[..idx]);
    Some((line, &raw[idx + 1..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> ClientResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ClientError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

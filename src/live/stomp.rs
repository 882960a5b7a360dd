//! STOMP 1.1 framing over websocket text frames.
//!
//! One STOMP frame per websocket message. A message made only of EOLs is a heart-beat.

use std::fmt;

use bytes::Bytes;

use crate::core::{FusionError, FusionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    fn parse(raw: &str) -> FusionResult<Self> {
        Ok(match raw {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "SEND" => StompCommand::Send,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            "DISCONNECT" => StompCommand::Disconnect,
            other => return Err(FusionError::Protocol(format!("unknown STOMP command {other:?}"))),
        })
    }

    // Header values of CONNECT/CONNECTED are sent verbatim.
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins when a header is repeated.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> Bytes {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes.push(0);
        Bytes::from(bytes)
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> FusionResult<String> {
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
            Some('c') => out.push(':'),
            Some('r') => out.push('\r'),
            other => {
                return Err(FusionError::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

/// Decode one websocket payload. `Ok(None)` is a heart-beat.
pub fn decode_frame(data: &[u8]) -> FusionResult<Option<StompFrame>> {
    let start = data
        .iter()
        .position(|b| *b != b'\n' && *b != b'\r')
        .unwrap_or(data.len());
    let data = &data[start..];
    if data.is_empty() {
        return Ok(None);
    }

    let header_end = header_terminator(data)
        .ok_or_else(|| FusionError::Protocol("STOMP frame without header terminator".to_string()))?;
    let head = std::str::from_utf8(&data[..header_end.0])
        .map_err(|e| FusionError::Protocol(format!("STOMP header is not UTF-8: {e}")))?;

    let mut lines = head.lines();
    let command = StompCommand::parse(lines.next().unwrap_or_default().trim_end_matches('\r'))?;
    let escape = command.escapes_headers();
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        let Some((name, value)) = line.split_once(':') else {
            return Err(FusionError::Protocol(format!("malformed STOMP header {line:?}")));
        };
        if escape {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let rest = &data[header_end.1..];
    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());
    let body = match content_length {
        Some(len) if len <= rest.len() => &rest[..len],
        Some(len) => {
            return Err(FusionError::Protocol(format!(
                "STOMP body shorter than content-length {len}"
            )));
        }
        None => match rest.iter().position(|b| *b == 0) {
            Some(nul) => &rest[..nul],
            None => rest,
        },
    };

    Ok(Some(StompFrame {
        command,
        headers,
        body: Bytes::copy_from_slice(body),
    }))
}

/// First blank line, where EOL is `\r?\n`: (end of header block, start of body).
fn header_terminator(data: &[u8]) -> Option<(usize, usize)> {
    data.iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .find_map(|(idx, _)| {
            let next = idx + 1;
            match data.get(next..) {
                Some([b'\n', ..]) => Some((idx, next + 1)),
                Some([b'\r', b'\n', ..]) => Some((idx, next + 2)),
                _ => None,
            }
        })
}

pub fn connect_frame(host: &str) -> StompFrame {
    StompFrame::new(StompCommand::Connect)
        .header("accept-version", "1.0,1.1")
        .header("host", host)
        .header("heart-beat", "0,0")
}

pub fn subscribe_frame(id: &str, destination: &str) -> StompFrame {
    StompFrame::new(StompCommand::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

pub fn disconnect_frame(receipt: &str) -> StompFrame {
    StompFrame::new(StompCommand::Disconnect).header("receipt", receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_with_nul_terminator() {
        let raw = b"MESSAGE\ndestination:/live/-1/12109/spat\nsubscription:sub-1\n\n{\"a\":1}\0\n";
        let frame = decode_frame(raw).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.get("destination"), Some("/live/-1/12109/spat"));
        assert_eq!(frame.body.as_ref(), b"{\"a\":1}");
    }

    #[test]
    fn content_length_allows_embedded_nul() {
        let raw = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let frame = decode_frame(raw).unwrap().unwrap();
        assert_eq!(frame.body.as_ref(), b"a\0b");
    }

    #[test]
    fn crlf_headers_end_at_first_blank_line_not_inside_body() {
        let raw = b"MESSAGE\r\nsubscription:sub-map\r\ndestination:/live/-1/1/map\r\n\r\n{\n\n\"a\":1}\0";
        let frame = decode_frame(raw).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.get("subscription"), Some("sub-map"));
        assert_eq!(frame.get("destination"), Some("/live/-1/1/map"));
        assert_eq!(frame.body.as_ref(), b"{\n\n\"a\":1}");
    }

    #[test]
    fn lf_headers_keep_blank_lines_in_body() {
        let raw = b"MESSAGE\ndestination:/live/-1/1/spat\n\n{\r\n\r\n}\0";
        let frame = decode_frame(raw).unwrap().unwrap();
        assert_eq!(frame.headers.len(), 1);
        assert_eq!(frame.body.as_ref(), b"{\r\n\r\n}");
    }

    #[test]
    fn heartbeats_decode_to_none() {
        assert_eq!(decode_frame(b"\n").unwrap(), None);
        assert_eq!(decode_frame(b"\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn header_escaping_survives_encode_decode() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", "/queue/a:b")
            .header("note", "line1\nline2\\end")
            .with_body("x");
        let encoded = frame.encode();
        assert!(std::str::from_utf8(&encoded).unwrap().contains("/queue/a\\cb"));
        assert_eq!(decode_frame(&encoded).unwrap().unwrap(), frame);
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let encoded = connect_frame("cv.example.org:8081").encode();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("host:cv.example.org:8081\n"));
        assert!(text.ends_with("\n\n\0"));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(
            decode_frame(b"HELLO\n\n\0"),
            Err(FusionError::Protocol(_))
        ));
        assert!(decode_frame(b"MESSAGE\nno-terminator").is_err());
        assert!(decode_frame(b"MESSAGE\nbad header\n\n\0").is_err());
    }
}

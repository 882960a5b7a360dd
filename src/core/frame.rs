use bytes::Bytes;

/// Websocket frame as seen by the live feed; transports convert to and from this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsFrame {
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(Bytes::from(s.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: &'static str) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from_static(reason.as_bytes()),
        }))
    }

    /// Payload of a data frame (text or binary). Control frames yield `None`.
    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            WsFrame::Text(bytes) | WsFrame::Binary(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }

    pub fn close_reason(&self) -> Option<String> {
        match self {
            WsFrame::Close(Some(frame)) => Some(format!(
                "code={} reason={}",
                frame.code,
                String::from_utf8_lossy(frame.reason.as_ref())
            )),
            WsFrame::Close(None) => Some("remote closed".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_skips_control_frames() {
        assert_eq!(WsFrame::text("abc").data(), Some(&b"abc"[..]));
        assert_eq!(WsFrame::Ping(Bytes::from_static(b"x")).data(), None);
        assert_eq!(
            WsFrame::close(1000, "bye").close_reason().as_deref(),
            Some("code=1000 reason=bye")
        );
    }
}

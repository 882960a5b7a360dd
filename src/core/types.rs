use chrono::DateTime;
use thiserror::Error;

/// Convenience result alias for engine, feed and export operations.
pub type FusionResult<T> = Result<T, FusionError>;

/// Milliseconds since the Unix epoch. All buffers and windows are keyed on this.
pub type EpochMillis = i64;

/// Canonical error surface shared across the crate.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Fetch failed ({category}): {message}")]
    Fetch {
        category: &'static str,
        message: String,
    },

    #[error("Decode failed ({context}): {error}")]
    Decode {
        context: &'static str,
        error: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Actor error: {0}")]
    Actor(String),
}

impl FusionError {
    pub fn fetch(category: &'static str, err: impl ToString) -> Self {
        Self::Fetch {
            category,
            message: err.to_string(),
        }
    }

    pub fn decode(context: &'static str, err: impl ToString) -> Self {
        Self::Decode {
            context,
            error: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for FusionError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<std::io::Error> for FusionError {
    fn from(err: std::io::Error) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Anything that can be placed in a [`StreamBuffer`](super::StreamBuffer).
pub trait Timestamped {
    fn timestamp_ms(&self) -> EpochMillis;
}

/// Parse an ISO-8601 receipt time into epoch milliseconds.
///
/// ODE payloads sometimes carry a zone-id suffix (`2024-03-01T12:00:00.123Z[UTC]`);
/// the bracketed part is dropped before parsing.
pub fn parse_epoch_millis(raw: &str) -> FusionResult<EpochMillis> {
    let trimmed = match raw.find('[') {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    DateTime::parse_from_rfc3339(trimmed.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|err| FusionError::decode("timestamp", format!("{raw}: {err}")))
}

/// Format epoch milliseconds as an RFC 3339 UTC string (inverse of [`parse_epoch_millis`]).
pub fn format_epoch_millis(ms: EpochMillis) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Best-effort current wall-clock time as epoch milliseconds.
#[inline]
pub fn now_epoch_ms() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

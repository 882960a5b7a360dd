//! Push-channel adapter: STOMP over websocket into [`crate::engine::FusionActor`].

pub mod actor;
pub mod stomp;
pub mod writer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use actor::{
    GetLiveStatus, LiveConnect, LiveDisconnect, LiveEvent, LiveFeedActor, LiveFeedArgs,
    LiveFeedStats, LiveState, LiveStatus,
};
pub use stomp::{StompCommand, StompFrame, decode_frame};
pub use writer::{LiveWriterActor, WriterClose, WriterWrite, WriterWriteBatch};

/// Sub-protocols offered on the websocket handshake, before the auth token.
pub const STOMP_PROTOCOLS: [&str; 2] = ["v10.stomp", "v11.stomp"];

/// Intersection a live session is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTarget {
    pub road_regulator_id: i64,
    pub intersection_id: i64,
}

impl LiveTarget {
    pub fn new(road_regulator_id: i64, intersection_id: i64) -> Self {
        Self {
            road_regulator_id,
            intersection_id,
        }
    }

    pub fn destination(&self, topic: LiveTopic) -> String {
        format!(
            "/live/{}/{}/{}",
            self.road_regulator_id,
            self.intersection_id,
            topic.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveTopic {
    Map,
    Spat,
    Bsm,
}

impl LiveTopic {
    pub const ALL: [LiveTopic; 3] = [LiveTopic::Map, LiveTopic::Spat, LiveTopic::Bsm];

    pub fn as_str(self) -> &'static str {
        match self {
            LiveTopic::Map => "map",
            LiveTopic::Spat => "spat",
            LiveTopic::Bsm => "bsm",
        }
    }

    pub fn subscription_id(self) -> &'static str {
        match self {
            LiveTopic::Map => "sub-map",
            LiveTopic::Spat => "sub-spat",
            LiveTopic::Bsm => "sub-bsm",
        }
    }

    pub fn from_subscription_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.subscription_id() == id)
    }

    /// Topic from the last path segment of a `/live/..` destination.
    pub fn from_destination(destination: &str) -> Option<Self> {
        let suffix = destination.rsplit('/').next()?;
        Self::ALL.into_iter().find(|topic| topic.as_str() == suffix)
    }
}

impl fmt::Display for LiveTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

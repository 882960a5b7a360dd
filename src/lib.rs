//! Temporal fusion and windowing of intersection MAP, SPAT and BSM streams.

pub mod config;
pub mod core;
pub mod engine;
pub mod export;
pub mod history;
pub mod live;
pub mod testing;
pub mod tls;
pub mod transport;

pub use config::FusionConfig;
pub use core::{FusionError, FusionResult};
pub use engine::{FusionActor, FusionActorArgs, FusionEngine, FusionEvent, RenderSnapshot};
pub use live::{LiveConnect, LiveDisconnect, LiveFeedActor, LiveFeedArgs, LiveTarget};

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{FusionError, FusionResult, WsFrame};

pub mod tungstenite;

/// Opening handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConnectRequest {
    pub url: String,
    /// Offered in `Sec-WebSocket-Protocol`, in order.
    pub protocols: Vec<String>,
}

pub type WsTransportConnectFuture<R, W> = Pin<Box<dyn Future<Output = FusionResult<(R, W)>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The read loop lives outside the actor; the actor owns protocol state. Swapping the
/// implementation (tungstenite, in-memory mock) leaves the live-feed logic unchanged.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, FusionError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static;

    fn connect(&self, request: WsConnectRequest) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}

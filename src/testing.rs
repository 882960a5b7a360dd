//! Test doubles for driving the live feed and the historical loader without a network.
//!
//! [`MockTransport`] stands in for the websocket, [`InMemoryHistory`] for the REST
//! collaborators, and the `sample_*` builders produce well-formed records.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use tokio::sync::{Mutex, mpsc};

use crate::core::{
    BsmCoreData, BsmData, BsmMetadata, BsmPayload, ConnectingLane, EpochMillis, FusionError,
    FusionResult, IntersectionEvent, LaneConnection, LaneFeature, LaneProperties, LineString,
    MapProperties, MovementEvent, MovementPhaseState, MovementState, Notification, OdeBsmData,
    PhaseTiming, ProcessedMap, ProcessedSpat, RefPoint, Timestamped, WsFrame,
    format_epoch_millis, parse_epoch_millis,
};
use crate::history::{BsmQuery, HistoricalSource, HistoryFuture, IntersectionQuery};
use crate::live::stomp::{StompFrame, decode_frame};
use crate::transport::{WsConnectRequest, WsTransport, WsTransportConnectFuture};

/// A transport that uses in-memory channels so tests can emulate the broker.
///
/// Create it with [`MockTransport::channel_pair`] to obtain both the transport for
/// `LiveFeedActor` and a [`MockServer`] handle used to receive outbound frames, push
/// inbound frames, or drop the socket.
#[derive(Clone)]
pub struct MockTransport {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
    inbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<WsFrame>>>>,
    requests_tx: mpsc::UnboundedSender<WsConnectRequest>,
    refuse: Option<String>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<WsFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WsFrame>();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel::<WsConnectRequest>();
        (
            Self {
                sent_tx,
                inbound_rx: Arc::new(Mutex::new(Some(inbound_rx))),
                requests_tx,
                refuse: None,
            },
            MockServer {
                outbound_rx: sent_rx,
                inbound_tx: Some(inbound_tx),
                requests_rx,
            },
        )
    }

    /// Every connect attempt fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> (Self, MockServer) {
        let (mut transport, server) = Self::channel_pair();
        transport.refuse = Some(reason.into());
        (transport, server)
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        request: WsConnectRequest,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let sent_tx = self.sent_tx.clone();
        let inbound_rx = Arc::clone(&self.inbound_rx);
        let refuse = self.refuse.clone();
        let _ = self.requests_tx.send(request);
        Box::pin(async move {
            if let Some(reason) = refuse {
                return Err(FusionError::ConnectionFailed(reason));
            }
            let rx = inbound_rx.lock().await.take().ok_or_else(|| {
                FusionError::InvalidState(
                    "mock transport only supports a single active connection".to_string(),
                )
            })?;
            Ok((MockReader { rx }, MockWriter { sent_tx }))
        })
    }
}

/// Error surface for operations on [`MockServer`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The actor side is no longer receiving inbound frames.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock actor channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Broker-side test handle paired with [`MockTransport`].
pub struct MockServer {
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
    requests_rx: mpsc::UnboundedReceiver<WsConnectRequest>,
}

impl MockServer {
    /// Receive a frame written by the actor to the websocket writer.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    /// Receive a frame with a timeout.
    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Next outbound STOMP frame, skipping heart-beats and non-data frames.
    pub async fn recv_stomp(&mut self, timeout: Duration) -> Option<StompFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self.recv_outbound_timeout(remaining).await?;
            let Some(data) = frame.data() else {
                continue;
            };
            if let Ok(Some(stomp)) = decode_frame(data) {
                return Some(stomp);
            }
        }
    }

    /// Handshake request of the most recent connect attempt, if one was made.
    pub fn try_recv_connect_request(&mut self) -> Option<WsConnectRequest> {
        self.requests_rx.try_recv().ok()
    }

    /// Push an inbound frame to the actor.
    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a UTF-8 payload as websocket text.
    pub fn send_text(&self, text: impl AsRef<str>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text.as_ref()))
    }

    /// Push an encoded STOMP frame.
    pub fn send_stomp(&self, frame: &StompFrame) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::Text(frame.encode()))
    }

    /// Simulate server-side socket drop by closing the inbound channel.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, FusionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = FusionError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| FusionError::Transport {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// Historical source

/// Serves fixed records filtered by the query's time range.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    pub maps: Vec<ProcessedMap>,
    pub spats: Vec<ProcessedSpat>,
    pub bsms: Vec<OdeBsmData>,
    pub events: Vec<IntersectionEvent>,
    pub notifications: Vec<Notification>,
    /// Category (`"map"`, `"spat"`, `"bsm"`, `"event"`, `"notification"`) that fails.
    pub failing: Option<&'static str>,
    /// Delay applied to every request.
    pub latency: Option<Duration>,
    requests: Arc<AtomicUsize>,
}

impl InMemoryHistory {
    pub fn new(maps: Vec<ProcessedMap>, spats: Vec<ProcessedSpat>, bsms: Vec<OdeBsmData>) -> Self {
        Self {
            maps,
            spats,
            bsms,
            ..Self::default()
        }
    }

    pub fn failing(mut self, category: &'static str) -> Self {
        self.failing = Some(category);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Requests served so far, across all categories.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn serve<T, F>(&self, category: &'static str, records: &[T], keep: F) -> HistoryFuture<T>
    where
        T: Clone + Send + 'static,
        F: Fn(&T) -> bool,
    {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let result = if self.failing == Some(category) {
            Err(FusionError::fetch(category, "injected failure"))
        } else {
            Ok(records.iter().filter(|record| keep(*record)).cloned().collect())
        };
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

fn within(ms: EpochMillis, start_ms: EpochMillis, end_ms: EpochMillis) -> bool {
    start_ms <= ms && ms <= end_ms
}

impl HistoricalSource for InMemoryHistory {
    fn map_messages(&self, query: IntersectionQuery) -> HistoryFuture<ProcessedMap> {
        self.serve("map", &self.maps, |map| {
            map.intersection_id() == query.intersection_id && map.timestamp_ms() <= query.end_ms
        })
    }

    fn spat_messages(&self, query: IntersectionQuery) -> HistoryFuture<ProcessedSpat> {
        self.serve("spat", &self.spats, |spat| {
            spat.intersection_id == query.intersection_id
                && within(spat.timestamp_ms(), query.start_ms, query.end_ms)
        })
    }

    fn bsm_messages(&self, query: BsmQuery) -> HistoryFuture<OdeBsmData> {
        self.serve("bsm", &self.bsms, |bsm| {
            let in_range = parse_epoch_millis(&bsm.metadata.ode_received_at)
                .is_ok_and(|ms| within(ms, query.start_ms, query.end_ms));
            let vehicle_matches = query
                .vehicle_id
                .as_deref()
                .is_none_or(|id| bsm.vehicle_id() == id);
            in_range && vehicle_matches
        })
    }

    fn events(&self, query: IntersectionQuery) -> HistoryFuture<IntersectionEvent> {
        self.serve("event", &self.events, |event| {
            event.intersection_id == query.intersection_id
        })
    }

    fn notifications(&self, _query: IntersectionQuery) -> HistoryFuture<Notification> {
        self.serve("notification", &self.notifications, |_| true)
    }
}

// ---------------------------------------------------------------------------
// Record builders

/// MAP with two ingress lanes: lane 1 on signal group 2, lane 3 on signal group 4.
pub fn sample_map(
    intersection_id: i64,
    received_ms: EpochMillis,
    ref_point: RefPoint,
) -> FusionResult<ProcessedMap> {
    let lane = |lane_id: i64, signal_group: i32, offset: f64| LaneFeature {
        kind: "Feature".to_string(),
        id: lane_id,
        geometry: LineString::new(vec![
            [ref_point.longitude + offset, ref_point.latitude],
            [ref_point.longitude + offset, ref_point.latitude + 0.0005],
        ]),
        properties: LaneProperties {
            lane_id,
            ingress_approach: Some(1),
            egress_approach: None,
            ingress_path: true,
            egress_path: false,
            connects_to: vec![LaneConnection {
                connecting_lane: ConnectingLane {
                    lane: lane_id + 10,
                    maneuver: None,
                },
                signal_group: Some(signal_group),
                connection_id: None,
            }],
        },
    };
    ProcessedMap::new(
        MapProperties {
            intersection_id,
            road_regulator_id: Some(-1),
            ref_point,
            ode_received_at: format_epoch_millis(received_ms),
            origin_ip: None,
        },
        vec![lane(1, 2, 0.0), lane(3, 4, 0.0001)],
        Vec::new(),
    )
}

pub fn sample_spat(
    intersection_id: i64,
    at_ms: EpochMillis,
    groups: &[(i32, MovementPhaseState)],
) -> FusionResult<ProcessedSpat> {
    let states = groups
        .iter()
        .map(|(signal_group, phase)| MovementState {
            signal_group: *signal_group,
            state_time_speed: vec![MovementEvent {
                event_state: *phase,
                timing: PhaseTiming::default(),
            }],
        })
        .collect();
    ProcessedSpat::new(intersection_id, format_epoch_millis(at_ms), states)
}

pub fn sample_bsm(vehicle_id: &str, at_ms: EpochMillis, longitude: f64, latitude: f64) -> OdeBsmData {
    OdeBsmData {
        metadata: BsmMetadata {
            ode_received_at: format_epoch_millis(at_ms),
            origin_ip: None,
        },
        payload: BsmPayload {
            data: BsmData {
                core_data: BsmCoreData {
                    id: vehicle_id.to_string(),
                    position: RefPoint {
                        latitude,
                        longitude,
                        elevation: None,
                    },
                    speed: None,
                    heading: None,
                    sec_mark: None,
                },
            },
        },
    }
}

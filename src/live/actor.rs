//! Live-feed connection actor.
//!
//! Owns the websocket handle for one STOMP session. The read loop runs in a
//! spawned task and reports frames back to the actor tagged with the connection
//! epoch, so frames from a torn-down connection are ignored.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info, warn};

use super::stomp::{
    StompCommand, StompFrame, connect_frame, decode_frame, disconnect_frame, subscribe_frame,
};
use super::writer::{LiveWriterActor, WriterClose, WriterWrite, WriterWriteBatch};
use super::{LiveTarget, LiveTopic, STOMP_PROTOCOLS};
use crate::config::LiveFeedConfig;
use crate::core::{
    FusionError, FusionResult, WsFrame, decode_bsm, decode_map, decode_spat, now_epoch_ms,
};
use crate::engine::{FusionActor, FusionEvent, Notice};
use crate::transport::{WsConnectRequest, WsTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiveState {
    Disconnected,
    Connecting,
    Subscribed,
    /// Forwarding one message to the engine.
    Updating,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveFeedStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub map_messages: u64,
    pub spat_messages: u64,
    pub bsm_messages: u64,
    pub decode_failures: u64,
    pub protocol_errors: u64,
    pub heartbeats: u64,
    pub last_disconnect_reason: Option<String>,
}

impl LiveFeedStats {
    pub fn messages_forwarded(&self) -> u64 {
        self.map_messages + self.spat_messages + self.bsm_messages
    }

    fn record_forwarded(&mut self, topic: LiveTopic) {
        let counter = match topic {
            LiveTopic::Map => &mut self.map_messages,
            LiveTopic::Spat => &mut self.spat_messages,
            LiveTopic::Bsm => &mut self.bsm_messages,
        };
        *counter = counter.saturating_add(1);
    }
}

pub struct LiveFeedArgs<T: WsTransport> {
    pub transport: T,
    pub config: LiveFeedConfig,
    /// Cadence of the live-window ticker; also the engine's advance throttle.
    pub advance_interval: Duration,
    pub engine: ActorRef<FusionActor>,
}

pub struct LiveFeedActor<T: WsTransport> {
    transport: T,
    config: LiveFeedConfig,
    advance_interval: Duration,
    engine: ActorRef<FusionActor>,
    actor_ref: ActorRef<Self>,
    state: LiveState,
    target: Option<LiveTarget>,
    epoch: u64,
    writer_ref: Option<ActorRef<LiveWriterActor<T::Writer>>>,
    reader_task: Option<JoinHandle<()>>,
    ticker_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// Frames queued until the broker acknowledges CONNECT.
    pending_outbound: VecDeque<WsFrame>,
    stats: LiveFeedStats,
}

impl<T: WsTransport> Actor for LiveFeedActor<T> {
    type Args = LiveFeedArgs<T>;
    type Error = FusionError;

    fn name() -> &'static str {
        "LiveFeedActor"
    }

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> FusionResult<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let outbound_capacity = args.config.outbound_capacity;
        Ok(Self {
            transport: args.transport,
            config: args.config,
            advance_interval: args.advance_interval,
            engine: args.engine,
            actor_ref,
            state: LiveState::Disconnected,
            target: None,
            epoch: 0,
            writer_ref: None,
            reader_task: None,
            ticker_task: None,
            shutdown_tx,
            shutdown_rx,
            pending_outbound: VecDeque::with_capacity(outbound_capacity),
            stats: LiveFeedStats::default(),
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        reason: kameo::error::ActorStopReason,
    ) -> FusionResult<()> {
        debug!(reason = ?reason, "live feed actor stopping");
        if self.state != LiveState::Disconnected {
            self.teardown("actor stopped", true).await;
        }
        Ok(())
    }
}

/// Open the live session for an intersection. Idempotent for the current target.
#[derive(Debug, Clone)]
pub struct LiveConnect {
    pub target: LiveTarget,
    pub token: Option<String>,
}

impl<T: WsTransport> KameoMessage<LiveConnect> for LiveFeedActor<T> {
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        msg: LiveConnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.handle_connect(msg.target, msg.token).await
    }
}

/// Close the live session. Idempotent.
#[derive(Debug, Clone, Copy)]
pub struct LiveDisconnect;

impl<T: WsTransport> KameoMessage<LiveDisconnect> for LiveFeedActor<T> {
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        _msg: LiveDisconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state == LiveState::Disconnected {
            debug!("live feed already disconnected");
            return Ok(());
        }
        self.teardown("client disconnect", true).await;
        Ok(())
    }
}

/// Events raised by the connection's own tasks.
#[derive(Debug)]
pub enum LiveEvent {
    Inbound { epoch: u64, frame: WsFrame },
    Closed { epoch: u64, reason: String },
    Tick { epoch: u64 },
}

impl<T: WsTransport> KameoMessage<LiveEvent> for LiveFeedActor<T> {
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        event: LiveEvent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match event {
            LiveEvent::Inbound { epoch, frame } if epoch == self.epoch => {
                self.process_inbound(frame).await;
            }
            LiveEvent::Closed { epoch, reason } if epoch == self.epoch => {
                if self.state != LiveState::Disconnected {
                    warn!(reason = %reason, "live connection closed by peer");
                    self.notify_engine(Notice::error(format!("Live connection closed: {reason}")))
                        .await;
                    self.teardown(&reason, false).await;
                }
            }
            LiveEvent::Tick { epoch } if epoch == self.epoch => {
                if self.state == LiveState::Subscribed {
                    self.advance_engine_window().await;
                }
            }
            stale => debug!(event = ?stale, current = self.epoch, "ignoring event from stale connection"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveStatus {
    pub state: LiveState,
    pub target: Option<LiveTarget>,
    pub stats: LiveFeedStats,
}

#[derive(Debug, Clone, Copy)]
pub struct GetLiveStatus;

impl<T: WsTransport> KameoMessage<GetLiveStatus> for LiveFeedActor<T> {
    type Reply = FusionResult<LiveStatus>;

    async fn handle(
        &mut self,
        _msg: GetLiveStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(LiveStatus {
            state: self.state,
            target: self.target,
            stats: self.stats.clone(),
        })
    }
}

fn flatten_send<M>(result: Result<(), SendError<M, FusionError>>) -> FusionResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(SendError::HandlerError(err)) => Err(err),
        Err(err) => Err(FusionError::Actor(err.to_string())),
    }
}

/// Authority of the broker URL, sent as the STOMP `host` header.
fn host_of(url: &str) -> String {
    url.into_client_request()
        .ok()
        .and_then(|request| request.uri().authority().map(ToString::to_string))
        .unwrap_or_else(|| url.to_string())
}

impl<T: WsTransport> LiveFeedActor<T> {
    async fn handle_connect(&mut self, target: LiveTarget, token: Option<String>) -> FusionResult<()> {
        if self.state != LiveState::Disconnected {
            if self.target == Some(target) {
                debug!(?target, state = ?self.state, "live feed already connected");
                return Ok(());
            }
            self.teardown("switching intersection", true).await;
        }

        self.epoch = self.epoch.wrapping_add(1);
        self.state = LiveState::Connecting;
        self.target = Some(target);
        self.stats.connect_attempts = self.stats.connect_attempts.saturating_add(1);

        let mut protocols: Vec<String> = STOMP_PROTOCOLS.iter().map(|p| p.to_string()).collect();
        if let Some(token) = token {
            protocols.push(token);
        }
        let request = WsConnectRequest {
            url: self.config.url.clone(),
            protocols,
        };
        info!(
            url = %self.config.url,
            road_regulator_id = target.road_regulator_id,
            intersection_id = target.intersection_id,
            "connecting live feed"
        );

        let timeout = self.config.connect_timeout();
        let connected = match tokio::time::timeout(timeout, self.transport.connect(request)).await {
            Ok(result) => result,
            Err(_) => Err(FusionError::ConnectionFailed(format!(
                "connect timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        let (reader, writer) = match connected {
            Ok(pair) => pair,
            Err(err) => return Err(self.connect_failed(err).await),
        };

        self.on_connection_established(reader, writer);

        for topic in LiveTopic::ALL {
            let frame = subscribe_frame(topic.subscription_id(), &target.destination(topic));
            if let Err(err) = self.enqueue(frame) {
                self.teardown("outbound queue full", false).await;
                return Err(self.connect_failed(err).await);
            }
        }

        let connect = connect_frame(&host_of(&self.config.url));
        if let Err(err) = self.write(connect).await {
            self.teardown("CONNECT send failed", false).await;
            return Err(self.connect_failed(err).await);
        }
        Ok(())
    }

    async fn connect_failed(&mut self, err: FusionError) -> FusionError {
        warn!(error = %err, "live feed connect failed");
        self.stats.connect_failures = self.stats.connect_failures.saturating_add(1);
        self.state = LiveState::Disconnected;
        self.target = None;
        self.notify_engine(Notice::error(format!("Live connection failed: {err}")))
            .await;
        err
    }

    fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        let writer = LiveWriterActor::spawn(LiveWriterActor::new(writer, self.shutdown_rx.clone()));
        self.writer_ref = Some(writer);

        let mut reader_shutdown = self.shutdown_rx.clone();
        let actor_ref = self.actor_ref.clone();
        let epoch = self.epoch;
        let mut read = reader;
        self.reader_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = reader_shutdown.changed() => {
                        if res.is_err() || *reader_shutdown.borrow_and_update() { break; }
                    }
                    message = read.next() => {
                        let event = match message {
                            Some(Ok(frame)) => match frame.close_reason() {
                                Some(reason) => LiveEvent::Closed { epoch, reason },
                                None => LiveEvent::Inbound { epoch, frame },
                            },
                            Some(Err(err)) => LiveEvent::Closed {
                                epoch,
                                reason: format!("read error: {err}"),
                            },
                            None => LiveEvent::Closed {
                                epoch,
                                reason: "stream ended".to_string(),
                            },
                        };
                        let terminal = matches!(event, LiveEvent::Closed { .. });
                        if actor_ref.tell(event).send().await.is_err() || terminal {
                            break;
                        }
                    }
                }
            }
        }));
    }

    fn start_ticker(&mut self) {
        if let Some(handle) = self.ticker_task.take() {
            handle.abort();
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        // Ticks at half the throttle period; the engine throttle sets the cadence.
        let interval = (self.advance_interval / 2).max(Duration::from_millis(1));
        let actor_ref = self.actor_ref.clone();
        let epoch = self.epoch;

        self.ticker_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        if actor_ref.tell(LiveEvent::Tick { epoch }).send().await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    async fn process_inbound(&mut self, frame: WsFrame) {
        let Some(data) = frame.data() else {
            return;
        };
        let stomp = match decode_frame(data) {
            Ok(Some(stomp)) => stomp,
            Ok(None) => {
                self.stats.heartbeats = self.stats.heartbeats.saturating_add(1);
                return;
            }
            Err(err) => {
                self.stats.protocol_errors = self.stats.protocol_errors.saturating_add(1);
                warn!(error = %err, "dropping undecodable STOMP frame");
                return;
            }
        };

        match stomp.command {
            StompCommand::Connected => self.on_stomp_connected(&stomp).await,
            StompCommand::Message => self.on_stomp_message(stomp).await,
            StompCommand::Error => {
                let message = stomp.get("message").unwrap_or("broker error").to_string();
                warn!(
                    message = %message,
                    body = %String::from_utf8_lossy(&stomp.body),
                    "STOMP error frame"
                );
                self.notify_engine(Notice::error(format!("Live feed error: {message}")))
                    .await;
                self.teardown(&message, false).await;
            }
            StompCommand::Receipt => {
                debug!(receipt = ?stomp.get("receipt-id"), "STOMP receipt");
            }
            other => debug!(command = %other, "ignoring STOMP frame"),
        }
    }

    async fn on_stomp_connected(&mut self, stomp: &StompFrame) {
        if self.state != LiveState::Connecting {
            debug!(state = ?self.state, "duplicate CONNECTED frame");
            return;
        }
        info!(version = ?stomp.get("version"), "STOMP session established");

        if let Err(err) = self.drain_pending_outbound().await {
            warn!(error = %err, "subscribe failed");
            self.notify_engine(Notice::error(format!("Live subscribe failed: {err}")))
                .await;
            self.teardown("subscribe failed", false).await;
            return;
        }
        self.state = LiveState::Subscribed;

        if self
            .engine
            .tell(FusionEvent::EnterLiveMode { now_ms: now_epoch_ms() })
            .send()
            .await
            .is_err()
        {
            warn!("fusion engine unavailable, live mode not entered");
        }
        self.start_ticker();
    }

    async fn on_stomp_message(&mut self, stomp: StompFrame) {
        if self.state != LiveState::Subscribed {
            debug!(state = ?self.state, "MESSAGE outside an active subscription");
            return;
        }
        let topic = stomp
            .get("subscription")
            .and_then(LiveTopic::from_subscription_id)
            .or_else(|| stomp.get("destination").and_then(LiveTopic::from_destination));
        let Some(topic) = topic else {
            self.stats.protocol_errors = self.stats.protocol_errors.saturating_add(1);
            warn!(destination = ?stomp.get("destination"), "MESSAGE for unknown topic");
            return;
        };

        let event = match topic {
            LiveTopic::Map => decode_map(&stomp.body).map(|map| FusionEvent::IngestMap(vec![map])),
            LiveTopic::Spat => {
                decode_spat(&stomp.body).map(|spat| FusionEvent::IngestSpat(vec![spat]))
            }
            LiveTopic::Bsm => decode_bsm(&stomp.body).map(|bsm| FusionEvent::IngestBsm(vec![bsm])),
        };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                self.stats.decode_failures = self.stats.decode_failures.saturating_add(1);
                warn!(topic = %topic, error = %err, "skipping malformed live message");
                return;
            }
        };

        self.state = LiveState::Updating;
        if self.engine.tell(event).send().await.is_err() {
            warn!(topic = %topic, "fusion engine unavailable, live message dropped");
        } else {
            self.stats.record_forwarded(topic);
            self.advance_engine_window().await;
        }
        self.state = LiveState::Subscribed;
    }

    async fn advance_engine_window(&self) {
        let _ = self
            .engine
            .tell(FusionEvent::AdvanceLiveWindow { now_ms: now_epoch_ms() })
            .send()
            .await;
    }

    async fn notify_engine(&self, notice: Notice) {
        let _ = self.engine.tell(FusionEvent::Notify(notice)).send().await;
    }

    fn enqueue(&mut self, frame: StompFrame) -> FusionResult<()> {
        if self.pending_outbound.len() >= self.config.outbound_capacity {
            return Err(FusionError::InvalidState(format!(
                "outbound queue full ({})",
                self.config.outbound_capacity
            )));
        }
        self.pending_outbound.push_back(WsFrame::Text(frame.encode()));
        Ok(())
    }

    async fn drain_pending_outbound(&mut self) -> FusionResult<()> {
        if self.pending_outbound.is_empty() {
            return Ok(());
        }
        let writer = self
            .writer_ref
            .clone()
            .ok_or_else(|| FusionError::InvalidState("writer not ready".to_string()))?;
        let frames: Vec<WsFrame> = self.pending_outbound.drain(..).collect();
        debug!(frames = frames.len(), "draining pending outbound frames");
        flatten_send(writer.ask(WriterWriteBatch { frames }).await)
    }

    async fn write(&mut self, frame: StompFrame) -> FusionResult<()> {
        let writer = self
            .writer_ref
            .clone()
            .ok_or_else(|| FusionError::InvalidState("writer not ready".to_string()))?;
        flatten_send(
            writer
                .ask(WriterWrite {
                    frame: WsFrame::Text(frame.encode()),
                })
                .await,
        )
    }

    /// Stop IO tasks, drop the handle and leave live mode. `graceful` sends a STOMP DISCONNECT first.
    async fn teardown(&mut self, reason: &str, graceful: bool) {
        let was_live = matches!(self.state, LiveState::Subscribed | LiveState::Updating);
        info!(reason = %reason, graceful, "tearing down live feed");

        if graceful && self.writer_ref.is_some() {
            let receipt = format!("disconnect-{}", self.epoch);
            if let Err(err) = self.write(disconnect_frame(&receipt)).await {
                debug!(error = %err, "STOMP DISCONNECT not delivered");
            }
        }
        if let Some(writer) = self.writer_ref.as_ref() {
            if let Err(err) = flatten_send(writer.ask(WriterClose).await) {
                debug!(error = %err, "websocket close not delivered");
            }
        }

        let _ = self.shutdown_tx.send(true);
        Self::await_task(&mut self.reader_task).await;
        Self::await_task(&mut self.ticker_task).await;
        if let Some(writer) = self.writer_ref.take() {
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
        }
        self.reset_channels();

        self.state = LiveState::Disconnected;
        self.target = None;
        self.stats.last_disconnect_reason = Some(reason.to_string());

        if was_live {
            let _ = self.engine.tell(FusionEvent::ExitLiveMode).send().await;
        }
    }

    // The reader may be parked on a full mailbox; abort rather than wait on it.
    async fn await_task(handle: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = handle.take() {
            handle.abort();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("live task terminated with error: {err}");
                }
            }
        }
    }

    fn reset_channels(&mut self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;
        self.shutdown_rx = shutdown_rx;
        self.pending_outbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_taken_from_the_url_authority() {
        assert_eq!(host_of("ws://localhost:8081/stomp"), "localhost:8081");
        assert_eq!(host_of("wss://cv.example.org/stomp"), "cv.example.org");
        assert_eq!(host_of("ws://[::1]:61614/ws"), "[::1]:61614");
        assert_eq!(host_of("broker"), "broker");
    }

    #[test]
    fn forwarded_counter_sums_topics() {
        let mut stats = LiveFeedStats::default();
        stats.record_forwarded(LiveTopic::Map);
        stats.record_forwarded(LiveTopic::Bsm);
        stats.record_forwarded(LiveTopic::Bsm);
        assert_eq!(stats.messages_forwarded(), 3);
        assert_eq!(stats.bsm_messages, 2);
    }
}

use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::watch;
use tracing::debug;

use crate::core::{FusionError, FusionResult, WsFrame};

/// Owns the websocket sink and serializes writes for one connection.
pub struct LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
}

impl<W> LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    pub fn new(writer: W, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            writer,
            shutdown_rx,
        }
    }

    fn ensure_running(&self) -> FusionResult<()> {
        if *self.shutdown_rx.borrow() {
            return Err(FusionError::InvalidState("writer stopped".to_string()));
        }
        Ok(())
    }
}

impl<W> Actor for LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    type Args = Self;
    type Error = FusionError;

    fn name() -> &'static str {
        "LiveWriterActor"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> FusionResult<Self> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "LiveWriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_running()?;
        debug!(target: "live-writer", "sending frame to wire");
        self.writer.send(msg.frame).await
    }
}

/// Feed several frames and flush once.
#[derive(Debug, Clone)]
pub struct WriterWriteBatch {
    pub frames: Vec<WsFrame>,
}

impl<W> KameoMessage<WriterWriteBatch> for LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWriteBatch,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_running()?;
        debug!(target: "live-writer", frames = msg.frames.len(), "sending frame batch to wire");
        for frame in msg.frames {
            self.writer.feed(frame).await?;
        }
        self.writer.flush().await
    }
}

/// Close the sink. Later writes are rejected by the transport.
#[derive(Debug, Clone, Copy)]
pub struct WriterClose;

impl<W> KameoMessage<WriterClose> for LiveWriterActor<W>
where
    W: Sink<WsFrame, Error = FusionError> + Send + Unpin + 'static,
{
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        _msg: WriterClose,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.writer.close().await
    }
}

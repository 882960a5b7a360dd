//! Mailbox front-end for [`FusionEngine`].
//!
//! The actor is the single owner of engine state. Historical loads run in spawned
//! tasks that report back with their generation; everything else is handled inline.

use std::sync::Arc;

use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use tracing::{debug, info};

use super::{
    FeatureRef, FusionEngine, InitialData, MapLayer, MapSpatTimes, Notice, RenderSnapshot,
    RsuSelection, SourceData, ViewState, fetch_initial,
};
use crate::core::{
    EpochMillis, FusionError, FusionResult, OdeBsmData, ProcessedMap, ProcessedSpat, QueryUpdate,
    QueryWindow, SliderState,
};
use crate::export::{ExportArchive, read_archive};
use crate::history::HistoricalSource;

pub struct FusionActorArgs {
    pub engine: FusionEngine,
    pub source: Option<Arc<dyn HistoricalSource>>,
}

pub struct FusionActor {
    engine: FusionEngine,
    source: Option<Arc<dyn HistoricalSource>>,
    actor_ref: ActorRef<Self>,
}

impl Actor for FusionActor {
    type Args = FusionActorArgs;
    type Error = FusionError;

    fn name() -> &'static str {
        "FusionActor"
    }

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> FusionResult<Self> {
        Ok(Self {
            engine: args.engine,
            source: args.source,
            actor_ref,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        reason: kameo::error::ActorStopReason,
    ) -> FusionResult<()> {
        debug!(reason = ?reason, "fusion actor stopped");
        Ok(())
    }

    // Errors from `tell` land here; the engine keeps running.
    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "FusionActor handler failed");
            Ok(std::ops::ControlFlow::Continue(()))
        }
    }
}

/// Commands that mutate engine state.
#[derive(Debug)]
pub enum FusionEvent {
    IngestMap(Vec<ProcessedMap>),
    IngestSpat(Vec<ProcessedSpat>),
    IngestBsm(Vec<OdeBsmData>),
    /// Throttled live-window check.
    AdvanceLiveWindow { now_ms: EpochMillis },
    EnterLiveMode { now_ms: EpochMillis },
    ExitLiveMode,
    SetSliderValue(i64),
    SetTimeWindowSeconds(i64),
    SetBsmTrailLength(usize),
    UpdateQueryParams(QueryUpdate),
    TimeQueryChanged {
        event_ms: Option<EpochMillis>,
        seconds_before: i64,
        seconds_after: i64,
        window_secs: Option<i64>,
    },
    SetAuthToken(Option<String>),
    SetSourceData {
        data: Option<SourceData>,
        load_on_null: bool,
    },
    SetViewState(ViewState),
    SetLayerVisible { layer: MapLayer, visible: bool },
    HoverFeature(Option<FeatureRef>),
    SelectFeature(Option<FeatureRef>),
    Notify(Notice),
    /// Stop replaying an imported archive; later loads fetch again.
    ClearImported,
    /// Begin a historical load in the background.
    LoadInitial,
}

impl KameoMessage<FusionEvent> for FusionActor {
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        event: FusionEvent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match event {
            FusionEvent::IngestMap(records) => {
                self.engine.ingest_map(records);
            }
            FusionEvent::IngestSpat(records) => {
                self.engine.ingest_spat(records);
            }
            FusionEvent::IngestBsm(records) => {
                self.engine.ingest_bsm(records);
            }
            FusionEvent::AdvanceLiveWindow { now_ms } => {
                self.engine.maybe_advance_live_window(now_ms);
            }
            FusionEvent::EnterLiveMode { now_ms } => self.engine.enter_live_mode(now_ms),
            FusionEvent::ExitLiveMode => self.engine.exit_live_mode(),
            FusionEvent::SetSliderValue(value) => self.engine.set_slider_value(value),
            FusionEvent::SetTimeWindowSeconds(window) => self.engine.set_time_window_seconds(window),
            FusionEvent::SetBsmTrailLength(length) => self.engine.set_bsm_trail_length(length),
            FusionEvent::UpdateQueryParams(update) => {
                self.engine.update_query_params(update);
            }
            FusionEvent::TimeQueryChanged {
                event_ms,
                seconds_before,
                seconds_after,
                window_secs,
            } => {
                self.engine
                    .on_time_query_changed(event_ms, seconds_before, seconds_after, window_secs);
            }
            FusionEvent::SetAuthToken(token) => self.engine.set_auth_token(token),
            FusionEvent::SetSourceData { data, load_on_null } => {
                self.engine.set_source_data(data, load_on_null)
            }
            FusionEvent::SetViewState(view) => self.engine.set_view_state(view),
            FusionEvent::SetLayerVisible { layer, visible } => {
                self.engine.set_layer_visible(layer, visible)
            }
            FusionEvent::HoverFeature(feature) => self.engine.hover_feature(feature),
            FusionEvent::SelectFeature(feature) => self.engine.select_feature(feature),
            FusionEvent::Notify(notice) => self.engine.notify(notice),
            FusionEvent::ClearImported => self.engine.clear_imported(),
            FusionEvent::LoadInitial => self.start_load()?,
        }
        Ok(())
    }
}

impl FusionActor {
    fn start_load(&mut self) -> FusionResult<()> {
        let Some(request) = self.engine.begin_load() else {
            return Ok(());
        };
        if let Some(replay) = request.replay() {
            self.engine.complete_load(request.generation, Ok(replay));
            return Ok(());
        }
        let Some(source) = self.source.clone() else {
            return Err(FusionError::InvalidState(
                "no historical source configured".to_string(),
            ));
        };

        let actor_ref = self.actor_ref.clone();
        let generation = request.generation;
        info!(
            generation,
            intersection_id = request.query.intersection_id,
            "spawning initial load"
        );
        tokio::spawn(async move {
            let result = fetch_initial(source.as_ref(), &request).await;
            let _ = actor_ref
                .tell(InitialDataLoaded { generation, result })
                .send()
                .await;
        });
        Ok(())
    }
}

/// Completion of a spawned historical load.
#[derive(Debug)]
pub struct InitialDataLoaded {
    pub generation: u64,
    pub result: FusionResult<InitialData>,
}

impl KameoMessage<InitialDataLoaded> for FusionActor {
    type Reply = FusionResult<bool>;

    async fn handle(
        &mut self,
        msg: InitialDataLoaded,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.engine.complete_load(msg.generation, msg.result))
    }
}

#[derive(Debug)]
pub struct GetRenderSnapshot;

impl KameoMessage<GetRenderSnapshot> for FusionActor {
    type Reply = FusionResult<RenderSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetRenderSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.engine.snapshot().clone())
    }
}

/// Point-in-time copy of the engine's control state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub query: QueryWindow,
    pub slider: SliderState,
    pub live_active: bool,
    pub load_generation: u64,
    pub view_state: ViewState,
    pub times: MapSpatTimes,
    pub map_records: usize,
    pub spat_records: usize,
    pub bsm_records: usize,
}

#[derive(Debug)]
pub struct GetEngineStatus;

impl KameoMessage<GetEngineStatus> for FusionActor {
    type Reply = FusionResult<EngineStatus>;

    async fn handle(
        &mut self,
        _msg: GetEngineStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let engine = &self.engine;
        Ok(EngineStatus {
            query: engine.query().clone(),
            slider: engine.slider(),
            live_active: engine.is_live_active(),
            load_generation: engine.load_generation(),
            view_state: engine.view_state(),
            times: engine.map_spat_times(),
            map_records: engine.map_history().len(),
            spat_records: engine.spat_history().len(),
            bsm_records: engine.bsm_features().len(),
        })
    }
}

#[derive(Debug)]
pub struct DrainNotices;

impl KameoMessage<DrainNotices> for FusionActor {
    type Reply = FusionResult<Vec<Notice>>;

    async fn handle(
        &mut self,
        _msg: DrainNotices,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.engine.drain_notices())
    }
}

/// Build the export archive for the current intersection.
#[derive(Debug)]
pub struct ExportData;

impl KameoMessage<ExportData> for FusionActor {
    type Reply = FusionResult<Option<ExportArchive>>;

    async fn handle(
        &mut self,
        _msg: ExportData,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(intersection_id) = self.engine.query().intersection_id else {
            debug!("export skipped, no intersection selected");
            return Ok(None);
        };
        self.engine.export().write_archive(intersection_id)
    }
}

/// Replay a previously exported archive.
#[derive(Debug)]
pub struct ImportArchive {
    pub bytes: Vec<u8>,
}

impl KameoMessage<ImportArchive> for FusionActor {
    type Reply = FusionResult<()>;

    async fn handle(
        &mut self,
        msg: ImportArchive,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let data = match read_archive(&msg.bytes) {
            Ok(data) => data,
            Err(err) => {
                self.engine
                    .notify(Notice::error(format!("Failed to import archive: {err}")));
                return Err(err);
            }
        };
        self.engine.load_imported(data)
    }
}

/// RSU the last full render asked the host to focus, if any. Taking it clears it.
#[derive(Debug)]
pub struct TakeRsuSelection;

impl KameoMessage<TakeRsuSelection> for FusionActor {
    type Reply = FusionResult<Option<RsuSelection>>;

    async fn handle(
        &mut self,
        _msg: TakeRsuSelection,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.engine.take_rsu_selection())
    }
}

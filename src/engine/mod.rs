//! Fusion engine: owns every buffer and all derived render state.
//!
//! Nothing here is shared. All mutation goes through `&mut self` methods, and the
//! [`actor::FusionActor`] serialises callers through its mailbox. Identical command
//! sequences produce identical state.

pub mod actor;
pub mod notices;
pub mod snapshot;
pub mod source;

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use crate::config::FusionConfig;
use crate::core::{
    BsmFeature, EpochMillis, FusionError, FusionResult, IntersectionEvent, LaneSignalGroup,
    Notification, OdeBsmData, ProcessedMap, ProcessedSpat, QueryUpdate, QueryWindow,
    RenderInterval, SliderState, SpatSnapshot, StreamBuffer, Timestamped, derive_lane_states,
    parse_map_signal_groups, parse_spat_signal_groups, slider_position, vehicle_legend,
};
use crate::export::{ExportCollector, ImportedMessageData};
use crate::history::{BsmQuery, HistoricalSource, IntersectionQuery};

pub use actor::{
    DrainNotices, EngineStatus, ExportData, FusionActor, FusionActorArgs, FusionEvent,
    GetEngineStatus, GetRenderSnapshot, ImportArchive, InitialDataLoaded, TakeRsuSelection,
};
pub use notices::{Notice, NoticeLevel, NoticeQueue};
pub use snapshot::{FeatureRef, MapLayer, MapSpatTimes, RenderSnapshot, ViewState};
pub use source::{RsuInfo, RsuSelection, SourceApi, SourceData};

const MS_PER_SEC: i64 = 1000;

/// Everything a historical load needs, captured when the load begins.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub generation: u64,
    pub query: IntersectionQuery,
    pub vehicle_id: Option<String>,
    pub bsm_radius_m: f64,
    pub imported: Option<ImportedMessageData>,
}

impl LoadRequest {
    /// Data for a load that replays an imported archive instead of fetching.
    pub fn replay(&self) -> Option<InitialData> {
        let imported = self.imported.as_ref()?;
        Some(InitialData {
            maps: imported.map_data.clone(),
            spats: imported.spat_data.clone(),
            bsms: imported.bsm_data.clone(),
            events: None,
            notifications: None,
            warnings: Vec::new(),
        })
    }
}

/// Result of a historical pull.
///
/// `events`/`notifications` are `None` when not fetched; fetch failures for those two
/// land in `warnings` instead of failing the load.
#[derive(Debug, Clone, Default)]
pub struct InitialData {
    pub maps: Vec<ProcessedMap>,
    pub spats: Vec<ProcessedSpat>,
    pub bsms: Vec<OdeBsmData>,
    pub events: Option<Vec<IntersectionEvent>>,
    pub notifications: Option<Vec<Notification>>,
    pub warnings: Vec<String>,
}

fn categorize(category: &'static str, err: FusionError) -> FusionError {
    match err {
        FusionError::Fetch { .. } => err,
        other => FusionError::fetch(category, other),
    }
}

/// Pull MAP, SPAT, BSM, events and notifications for `request`.
///
/// Runs without access to the engine so it can be spawned; the outcome is handed
/// back through [`FusionEngine::complete_load`].
pub async fn fetch_initial(
    source: &dyn HistoricalSource,
    request: &LoadRequest,
) -> FusionResult<InitialData> {
    if let Some(replay) = request.replay() {
        return Ok(replay);
    }

    let mut maps = source
        .map_messages(request.query.clone())
        .await
        .map_err(|err| categorize("MAP", err))?;
    maps.sort_by_key(Timestamped::timestamp_ms);

    let mut spats = source
        .spat_messages(request.query.clone())
        .await
        .map_err(|err| categorize("SPAT", err))?;
    spats.sort_by_key(Timestamped::timestamp_ms);

    let mut warnings = Vec::new();
    let events = match source.events(request.query.clone()).await {
        Ok(events) => Some(events),
        Err(err) => {
            warnings.push(format!("Failed to get Event data: {err}"));
            None
        }
    };
    let notifications = match source.notifications(request.query.clone()).await {
        Ok(notifications) => Some(notifications),
        Err(err) => {
            warnings.push(format!("Failed to get Notification data: {err}"));
            None
        }
    };

    // BSMs are searched around the MAP reference point; without a MAP there is nothing to render.
    let bsms = match maps.last() {
        Some(map) => source
            .bsm_messages(BsmQuery {
                token: request.query.token.clone(),
                vehicle_id: request.vehicle_id.clone(),
                start_ms: request.query.start_ms,
                end_ms: request.query.end_ms,
                center: map.ref_point(),
                radius_m: request.bsm_radius_m,
            })
            .await
            .map_err(|err| categorize("BSM", err))?,
        None => Vec::new(),
    };

    Ok(InitialData {
        maps,
        spats,
        bsms,
        events,
        notifications,
        warnings,
    })
}

/// Newest-first trail of the reports inside `interval`, at most `trail_length` long.
pub fn bsm_trail<'a, I>(features: I, interval: RenderInterval, trail_length: usize) -> Vec<BsmFeature>
where
    I: IntoIterator<Item = &'a BsmFeature>,
{
    let mut visible: Vec<&BsmFeature> = features
        .into_iter()
        .filter(|feature| interval.contains(feature.received_at_ms))
        .collect();
    visible.sort_by(|a, b| b.received_at_ms.cmp(&a.received_at_ms));
    visible.into_iter().take(trail_length).cloned().collect()
}

pub struct FusionEngine {
    config: FusionConfig,
    source_api: SourceApi,
    auth_token: Option<String>,
    source_data: Option<SourceData>,
    load_on_null: bool,
    imported: Option<ImportedMessageData>,
    load_generation: u64,

    query: QueryWindow,
    slider: SliderState,
    bsm_trail_length: usize,
    live_active: bool,
    last_live_advance_ms: Option<EpochMillis>,

    current_map: Option<ProcessedMap>,
    map_signal_groups: Vec<LaneSignalGroup>,
    map_history: StreamBuffer<ProcessedMap>,
    spat_history: StreamBuffer<ProcessedSpat>,
    spat_series: StreamBuffer<SpatSnapshot>,
    bsm_features: StreamBuffer<BsmFeature>,
    surrounding_events: Vec<IntersectionEvent>,
    surrounding_notifications: Vec<Notification>,

    snapshot: RenderSnapshot,
    times: MapSpatTimes,
    view_state: ViewState,
    layers_visible: BTreeMap<MapLayer, bool>,
    hovered: Option<FeatureRef>,
    selected: Option<FeatureRef>,
    rsu_selection: Option<RsuSelection>,

    export: ExportCollector,
    notices: NoticeQueue,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, source_api: SourceApi) -> Self {
        Self::starting_at(config, source_api, crate::core::now_epoch_ms())
    }

    /// Engine whose initial query is centred on `now_ms`.
    pub fn starting_at(config: FusionConfig, source_api: SourceApi, now_ms: EpochMillis) -> Self {
        let query = QueryWindow::around(now_ms);
        let slider = SliderState::new(
            slider_position(query.start_ms, query.end_ms),
            config.time_window_seconds,
        );
        let cap = config.max_buffer_records;
        let mut engine = Self {
            source_api,
            auth_token: None,
            source_data: None,
            load_on_null: true,
            imported: None,
            load_generation: 0,
            query,
            slider,
            bsm_trail_length: config.bsm_trail_length,
            live_active: false,
            last_live_advance_ms: None,
            current_map: None,
            map_signal_groups: Vec::new(),
            map_history: StreamBuffer::new(cap),
            spat_history: StreamBuffer::new(cap),
            spat_series: StreamBuffer::new(cap),
            bsm_features: StreamBuffer::new(cap),
            surrounding_events: Vec::new(),
            surrounding_notifications: Vec::new(),
            snapshot: RenderSnapshot::default(),
            times: MapSpatTimes::default(),
            view_state: ViewState::from(config.view),
            layers_visible: MapLayer::ALL.into_iter().map(|layer| (layer, true)).collect(),
            hovered: None,
            selected: None,
            rsu_selection: None,
            export: ExportCollector::default(),
            notices: NoticeQueue::new(config.notice_capacity),
            config,
        };
        engine.recompute_render_snapshot();
        engine
    }

    // ------------------------------------------------------------------
    // Historical loads

    /// Start a load if every precondition holds; otherwise a silent no-op.
    ///
    /// Each call supersedes any load still in flight.
    pub fn begin_load(&mut self) -> Option<LoadRequest> {
        let (Some(intersection_id), Some(road_regulator_id)) =
            (self.query.intersection_id, self.query.road_regulator_id)
        else {
            debug!("load skipped, no intersection selected");
            return None;
        };
        if self.auth_token.is_none() && self.imported.is_none() {
            debug!(intersection_id, "load skipped, no auth token");
            return None;
        }
        if self.source_data.is_none() && !self.load_on_null {
            debug!(intersection_id, "load skipped, no source data");
            return None;
        }

        self.load_generation += 1;
        debug!(
            intersection_id,
            generation = self.load_generation,
            imported = self.imported.is_some(),
            "beginning initial load"
        );
        Some(LoadRequest {
            generation: self.load_generation,
            query: IntersectionQuery {
                token: self.auth_token.clone().unwrap_or_default(),
                intersection_id,
                road_regulator_id,
                start_ms: self.query.start_ms,
                end_ms: self.query.end_ms,
            },
            vehicle_id: self.query.vehicle_id.clone(),
            bsm_radius_m: self.config.bsm_search_radius,
            imported: self.imported.clone(),
        })
    }

    /// Apply the outcome of a load. Returns `true` when state changed.
    ///
    /// Results from a superseded generation are dropped. A failed load leaves state
    /// untouched and queues an error notice.
    pub fn complete_load(&mut self, generation: u64, result: FusionResult<InitialData>) -> bool {
        if generation != self.load_generation {
            debug!(
                generation,
                current = self.load_generation,
                "dropping stale load result"
            );
            return false;
        }
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                warn!(generation, error = %err, "initial load failed");
                self.notices.push(Notice::error(err.to_string()));
                return false;
            }
        };

        for warning in data.warnings {
            warn!(generation, %warning, "side-channel fetch failed");
            self.notices.push(Notice::error(warning));
        }
        if let Some(events) = data.events {
            self.surrounding_events = events;
        }
        if let Some(notifications) = data.notifications {
            self.surrounding_notifications = notifications;
        }

        self.notices.push(Notice::info(format!(
            "Loaded {} MAP, {} SPAT and {} BSM messages",
            data.maps.len(),
            data.spats.len(),
            data.bsms.len()
        )));

        let mut features: Vec<BsmFeature> = data
            .bsms
            .into_iter()
            .filter_map(|report| match BsmFeature::from_report(report) {
                Ok(feature) => Some(feature),
                Err(err) => {
                    warn!(error = %err, "skipping BSM with unreadable receipt time");
                    None
                }
            })
            .collect();
        features.sort_by_key(Timestamped::timestamp_ms);

        self.render_entire_map(data.maps, data.spats, features);
        true
    }

    /// Begin, fetch and complete in one call.
    pub async fn load_initial(&mut self, source: &dyn HistoricalSource) -> bool {
        let Some(request) = self.begin_load() else {
            return false;
        };
        let result = fetch_initial(source, &request).await;
        self.complete_load(request.generation, result)
    }

    /// Replace all buffers with a full load and recompute.
    ///
    /// Inputs must be ascending in time. No-op when `maps` is empty.
    pub fn render_entire_map(
        &mut self,
        maps: Vec<ProcessedMap>,
        spats: Vec<ProcessedSpat>,
        bsms: Vec<BsmFeature>,
    ) {
        let Some(latest) = maps.last().cloned() else {
            info!("no MAP messages within time range");
            return;
        };

        self.map_signal_groups = parse_map_signal_groups(&latest);
        self.times.map_time_ms = Some(latest.timestamp_ms());
        self.view_state = ViewState::centered_on(latest.ref_point(), self.config.view.zoom);
        info!(
            intersection_id = latest.intersection_id(),
            maps = maps.len(),
            spats = spats.len(),
            bsms = bsms.len(),
            "rendering full map"
        );
        self.current_map = Some(latest);

        self.spat_series.replace(parse_spat_signal_groups(&spats));
        self.export.set_map(maps.clone());
        self.export.set_spat(spats.clone());
        self.export
            .set_bsm(bsms.iter().map(|feature| feature.report.clone()).collect());
        self.map_history.replace(maps);
        self.spat_history.replace(spats);
        self.bsm_features.replace(bsms);

        self.rsu_selection = self
            .source_api
            .derive_additional_raw_data(self.source_data.as_ref(), &mut self.export);

        let to_event = slider_position(self.query.start_ms, self.query.event_ms);
        let to_end = slider_position(self.query.start_ms, self.query.end_ms);
        self.slider.value_secs = to_event.min(to_end);

        self.recompute_render_snapshot();
    }

    // ------------------------------------------------------------------
    // Incremental ingest

    pub fn ingest_map(&mut self, mut records: Vec<ProcessedMap>) -> &VecDeque<ProcessedMap> {
        if records.is_empty() {
            return self.map_history.records();
        }
        records.sort_by_key(Timestamped::timestamp_ms);
        let retention = self.query.retention_ms();
        self.map_history.ingest(records, retention);

        if let Some(latest) = self.map_history.latest().cloned() {
            let moved = self
                .current_map
                .as_ref()
                .is_none_or(|current| current.ref_point() != latest.ref_point());
            if moved {
                self.view_state = ViewState::centered_on(latest.ref_point(), self.config.view.zoom);
            }
            self.map_signal_groups = parse_map_signal_groups(&latest);
            self.times.map_time_ms = Some(latest.timestamp_ms());
            self.current_map = Some(latest);
        }
        self.export.set_map(self.map_history.to_vec());
        self.recompute_render_snapshot();
        self.map_history.records()
    }

    pub fn ingest_spat(&mut self, mut records: Vec<ProcessedSpat>) -> &VecDeque<ProcessedSpat> {
        if records.is_empty() {
            return self.spat_history.records();
        }
        records.sort_by_key(Timestamped::timestamp_ms);
        let retention = self.query.retention_ms();
        let series = parse_spat_signal_groups(&records);
        self.spat_series.ingest(series, retention);
        self.spat_history.ingest(records, retention);

        self.export.set_spat(self.spat_history.to_vec());
        self.recompute_render_snapshot();
        self.spat_history.records()
    }

    /// Reports whose receipt time cannot be parsed are skipped.
    pub fn ingest_bsm(&mut self, records: Vec<OdeBsmData>) -> &VecDeque<BsmFeature> {
        let mut features: Vec<BsmFeature> = records
            .into_iter()
            .filter_map(|report| match BsmFeature::from_report(report) {
                Ok(feature) => Some(feature),
                Err(err) => {
                    warn!(error = %err, "skipping BSM with unreadable receipt time");
                    None
                }
            })
            .collect();
        if features.is_empty() {
            return self.bsm_features.records();
        }
        features.sort_by_key(Timestamped::timestamp_ms);
        let retention = self.query.retention_ms();
        self.bsm_features.ingest(features, retention);

        self.export.set_bsm(
            self.bsm_features
                .iter()
                .map(|feature| feature.report.clone())
                .collect(),
        );
        self.recompute_render_snapshot();
        self.bsm_features.records()
    }

    // ------------------------------------------------------------------
    // Derived state

    /// Rebuild the snapshot for the current interval. Buffers are not touched.
    pub fn recompute_render_snapshot(&mut self) {
        let interval = self.render_interval();

        if let Some(resolved) =
            derive_lane_states(&self.map_signal_groups, self.spat_series.iter(), interval)
        {
            self.snapshot.lane_states = resolved.lane_states;
            self.snapshot.signal_groups = resolved.signal_groups;
            self.snapshot.spat_time_ms = Some(resolved.chosen_timestamp_ms);
            self.times.spat_time_ms = Some(resolved.chosen_timestamp_ms);
        }

        self.snapshot.legend = vehicle_legend(
            self.bsm_features
                .iter()
                .filter(|feature| interval.contains(feature.received_at_ms))
                .map(|feature| feature.vehicle_id.as_str()),
        );
        self.snapshot.bsm_trail =
            bsm_trail(self.bsm_features.iter(), interval, self.bsm_trail_length);
        self.snapshot.events = self
            .surrounding_events
            .iter()
            .filter(|event| interval.contains(event.event_generated_at))
            .cloned()
            .collect();
        self.snapshot.notifications = self
            .surrounding_notifications
            .iter()
            .filter(|notification| interval.contains(notification.notification_generated_at))
            .cloned()
            .collect();
        self.snapshot.interval = interval;
    }

    // ------------------------------------------------------------------
    // Slider, window and query

    /// Move the scrubber. Leaves live mode.
    pub fn set_slider_value(&mut self, value_secs: i64) {
        self.slider.value_secs = value_secs;
        self.live_active = false;
        self.recompute_render_snapshot();
    }

    pub fn set_time_window_seconds(&mut self, window_secs: i64) {
        self.slider = SliderState::new(self.slider.value_secs, window_secs);
        self.recompute_render_snapshot();
    }

    pub fn set_bsm_trail_length(&mut self, trail_length: usize) {
        self.bsm_trail_length = trail_length;
        self.recompute_render_snapshot();
    }

    /// Merge `update` into the query. Returns whether the query changed.
    pub fn update_query_params(&mut self, update: QueryUpdate) -> bool {
        let next = update.apply_to(&self.query);
        let changed = next != self.query;
        if changed {
            debug!(
                start_ms = next.start_ms,
                end_ms = next.end_ms,
                intersection_id = ?next.intersection_id,
                "query changed"
            );
            let retarget = next.intersection_id != self.query.intersection_id
                || next.road_regulator_id != self.query.road_regulator_id;
            self.query = next;
            if retarget {
                self.clear_imported();
            }
        }
        if update.reset_time_window {
            self.slider = SliderState::new(self.slider.value_secs, self.config.time_window_seconds);
        }
        if update.update_slider {
            self.slider.value_secs = slider_position(self.query.start_ms, self.query.end_ms);
        }
        self.recompute_render_snapshot();
        changed
    }

    /// Re-centre the query on `event_ms` (default now) with the given margins in seconds.
    pub fn on_time_query_changed(
        &mut self,
        event_ms: Option<EpochMillis>,
        seconds_before: i64,
        seconds_after: i64,
        window_secs: Option<i64>,
    ) -> bool {
        let event_ms = event_ms.unwrap_or_else(crate::core::now_epoch_ms);
        let next = QueryWindow {
            start_ms: event_ms - seconds_before * MS_PER_SEC,
            end_ms: event_ms + seconds_after * MS_PER_SEC,
            event_ms,
            vehicle_id: None,
            intersection_id: self.query.intersection_id,
            road_regulator_id: self.query.road_regulator_id,
        };
        let changed = next != self.query;
        if changed {
            self.query = next;
        }
        if let Some(window_secs) = window_secs {
            self.slider = SliderState::new(self.slider.value_secs, window_secs);
        }
        self.recompute_render_snapshot();
        changed
    }

    // ------------------------------------------------------------------
    // Live mode

    pub fn set_live_active(&mut self, active: bool) {
        self.live_active = active;
        if !active {
            self.last_live_advance_ms = None;
        }
    }

    /// Switch to the short trailing query used while streaming.
    pub fn enter_live_mode(&mut self, now_ms: EpochMillis) {
        let live = self.config.live;
        self.on_time_query_changed(
            Some(now_ms),
            live.seconds_before,
            live.seconds_after,
            Some(live.window_seconds),
        );
        self.live_active = true;
        self.last_live_advance_ms = None;
        self.advance_live_window(now_ms);
    }

    /// Leave streaming and restore the default window width.
    pub fn exit_live_mode(&mut self) {
        self.set_live_active(false);
        self.slider = SliderState::new(self.slider.value_secs, self.config.time_window_seconds);
        self.recompute_render_snapshot();
    }

    /// Advance to `now_ms` when live and at least one interval has passed since the last advance.
    ///
    /// Returns whether the window moved.
    pub fn maybe_advance_live_window(&mut self, now_ms: EpochMillis) -> bool {
        if !self.live_active {
            return false;
        }
        let interval_ms = self.config.live_advance_interval_ms as i64;
        let due = self
            .last_live_advance_ms
            .is_none_or(|last| now_ms - last >= interval_ms);
        if due {
            self.advance_live_window(now_ms);
        }
        due
    }

    /// Shift the query to end at `now_ms`, keeping its span, and park the slider at the end.
    pub fn advance_live_window(&mut self, now_ms: EpochMillis) {
        let span = self.query.span_ms();
        self.query = QueryWindow {
            start_ms: now_ms - span,
            end_ms: now_ms,
            event_ms: now_ms,
            vehicle_id: None,
            intersection_id: self.query.intersection_id,
            road_regulator_id: self.query.road_regulator_id,
        };
        self.slider.value_secs = slider_position(self.query.start_ms, self.query.end_ms);
        self.last_live_advance_ms = Some(now_ms);
        self.recompute_render_snapshot();
    }

    // ------------------------------------------------------------------
    // Session inputs

    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    pub fn set_source_data(&mut self, source_data: Option<SourceData>, load_on_null: bool) {
        self.source_data = source_data;
        self.load_on_null = load_on_null;
    }

    /// Replay an exported archive: the query spans its SPAT range and the data is
    /// rendered immediately. Later loads replay the same data instead of fetching.
    pub fn load_imported(&mut self, data: ImportedMessageData) -> FusionResult<()> {
        let Some(first_map) = data.map_data.first() else {
            return Err(FusionError::InvalidState(
                "imported data has no MAP messages".to_string(),
            ));
        };
        let (Some(start_ms), Some(end_ms)) = (
            data.spat_data.iter().map(Timestamped::timestamp_ms).min(),
            data.spat_data.iter().map(Timestamped::timestamp_ms).max(),
        ) else {
            return Err(FusionError::InvalidState(
                "imported data has no SPAT messages".to_string(),
            ));
        };

        self.query = QueryWindow {
            start_ms,
            end_ms,
            event_ms: start_ms,
            vehicle_id: None,
            intersection_id: Some(first_map.intersection_id()),
            road_regulator_id: Some(-1),
        };
        self.slider = SliderState::new(self.slider.value_secs, self.config.time_window_seconds);
        self.live_active = false;
        self.surrounding_events.clear();
        self.surrounding_notifications.clear();
        info!(
            intersection_id = first_map.intersection_id(),
            start_ms, end_ms, "importing archived messages"
        );
        self.imported = Some(data);

        let Some(request) = self.begin_load() else {
            return Ok(());
        };
        let replay = request.replay().unwrap_or_default();
        self.complete_load(request.generation, Ok(replay));
        Ok(())
    }

    pub fn clear_imported(&mut self) {
        if self.imported.take().is_some() {
            debug!("imported archive cleared");
        }
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    // ------------------------------------------------------------------
    // View and selection

    pub fn set_view_state(&mut self, view_state: ViewState) {
        self.view_state = view_state;
    }

    pub fn set_layer_visible(&mut self, layer: MapLayer, visible: bool) {
        self.layers_visible.insert(layer, visible);
    }

    /// Hover a feature. Non-interactive layers clear the hover.
    pub fn hover_feature(&mut self, feature: Option<FeatureRef>) {
        self.hovered = feature.filter(|f| f.layer.is_interactive());
    }

    /// Click a feature. Non-interactive layers clear the selection.
    pub fn select_feature(&mut self, feature: Option<FeatureRef>) {
        self.selected = feature.filter(|f| f.layer.is_interactive());
    }

    pub fn take_rsu_selection(&mut self) -> Option<RsuSelection> {
        self.rsu_selection.take()
    }

    // ------------------------------------------------------------------
    // Accessors

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &RenderSnapshot {
        &self.snapshot
    }

    pub fn query(&self) -> &QueryWindow {
        &self.query
    }

    pub fn slider(&self) -> SliderState {
        self.slider
    }

    pub fn render_interval(&self) -> RenderInterval {
        self.slider.interval(self.query.start_ms)
    }

    pub fn bsm_trail_length(&self) -> usize {
        self.bsm_trail_length
    }

    pub fn view_state(&self) -> ViewState {
        self.view_state
    }

    pub fn layer_visible(&self, layer: MapLayer) -> bool {
        self.layers_visible.get(&layer).copied().unwrap_or(false)
    }

    pub fn current_map(&self) -> Option<&ProcessedMap> {
        self.current_map.as_ref()
    }

    pub fn map_signal_groups(&self) -> &[LaneSignalGroup] {
        &self.map_signal_groups
    }

    pub fn map_spat_times(&self) -> MapSpatTimes {
        self.times
    }

    pub fn hovered_feature(&self) -> Option<&FeatureRef> {
        self.hovered.as_ref()
    }

    pub fn selected_feature(&self) -> Option<&FeatureRef> {
        self.selected.as_ref()
    }

    pub fn is_live_active(&self) -> bool {
        self.live_active
    }

    pub fn load_generation(&self) -> u64 {
        self.load_generation
    }

    pub fn export(&self) -> &ExportCollector {
        &self.export
    }

    pub fn map_history(&self) -> &StreamBuffer<ProcessedMap> {
        &self.map_history
    }

    pub fn spat_history(&self) -> &StreamBuffer<ProcessedSpat> {
        &self.spat_history
    }

    pub fn spat_series(&self) -> &StreamBuffer<SpatSnapshot> {
        &self.spat_series
    }

    pub fn bsm_features(&self) -> &StreamBuffer<BsmFeature> {
        &self.bsm_features
    }

    pub fn surrounding_events(&self) -> &[IntersectionEvent] {
        &self.surrounding_events
    }

    pub fn surrounding_notifications(&self) -> &[Notification] {
        &self.surrounding_notifications
    }
}

//! Wire records for MAP, SPAT, BSM and the monitoring side channels.
//!
//! Field names follow the JSON produced by the message monitor (camelCase), so the
//! same types decode live STOMP bodies, historical pulls and exported archives.

use serde::{Deserialize, Serialize};

use super::types::{EpochMillis, FusionResult, Timestamped, parse_epoch_millis};

fn feature_kind() -> String {
    "Feature".to_string()
}

fn feature_collection_kind() -> String {
    "FeatureCollection".to_string()
}

fn line_string_kind() -> String {
    "LineString".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    #[serde(rename = "type", default = "line_string_kind")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl LineString {
    pub fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            kind: line_string_kind(),
            coordinates,
        }
    }
}

// ---------------------------------------------------------------------------
// MAP

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapProperties {
    pub intersection_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_regulator_id: Option<i64>,
    pub ref_point: RefPoint,
    pub ode_received_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectingLane {
    pub lane: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maneuver: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneConnection {
    pub connecting_lane: ConnectingLane,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_group: Option<i32>,
    #[serde(rename = "connectionID", default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneProperties {
    pub lane_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_approach: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_approach: Option<i64>,
    #[serde(default)]
    pub ingress_path: bool,
    #[serde(default)]
    pub egress_path: bool,
    #[serde(default)]
    pub connects_to: Vec<LaneConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneFeature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    pub id: i64,
    pub geometry: LineString,
    pub properties: LaneProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectingLaneProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_group_id: Option<i32>,
    pub ingress_lane_id: i64,
    pub egress_lane_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectingLaneFeature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    pub id: String,
    pub geometry: LineString,
    pub properties: ConnectingLaneProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection<F> {
    #[serde(rename = "type", default = "feature_collection_kind")]
    pub kind: String,
    #[serde(default = "Vec::new")]
    pub features: Vec<F>,
}

impl<F> FeatureCollection<F> {
    pub fn new(features: Vec<F>) -> Self {
        Self {
            kind: feature_collection_kind(),
            features,
        }
    }
}

impl<F> Default for FeatureCollection<F> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Intersection geometry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMap {
    pub properties: MapProperties,
    #[serde(default)]
    pub map_feature_collection: FeatureCollection<LaneFeature>,
    #[serde(default)]
    pub connecting_lanes_feature_collection: FeatureCollection<ConnectingLaneFeature>,
    #[serde(skip)]
    received_at_ms: EpochMillis,
}

impl ProcessedMap {
    pub fn new(
        properties: MapProperties,
        lanes: Vec<LaneFeature>,
        connecting_lanes: Vec<ConnectingLaneFeature>,
    ) -> FusionResult<Self> {
        let mut map = Self {
            properties,
            map_feature_collection: FeatureCollection::new(lanes),
            connecting_lanes_feature_collection: FeatureCollection::new(connecting_lanes),
            received_at_ms: 0,
        };
        map.index_time()?;
        Ok(map)
    }

    /// Cache the parsed receipt time. Must run after deserializing.
    pub fn index_time(&mut self) -> FusionResult<()> {
        self.received_at_ms = parse_epoch_millis(&self.properties.ode_received_at)?;
        Ok(())
    }

    pub fn intersection_id(&self) -> i64 {
        self.properties.intersection_id
    }

    pub fn ref_point(&self) -> RefPoint {
        self.properties.ref_point
    }
}

impl Timestamped for ProcessedMap {
    fn timestamp_ms(&self) -> EpochMillis {
        self.received_at_ms
    }
}

// ---------------------------------------------------------------------------
// SPAT

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_end_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementEvent {
    pub event_state: MovementPhaseState,
    #[serde(default)]
    pub timing: PhaseTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementState {
    pub signal_group: i32,
    #[serde(default)]
    pub state_time_speed: Vec<MovementEvent>,
}

/// Signal phase and timing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSpat {
    pub intersection_id: i64,
    pub utc_time_stamp: String,
    #[serde(default)]
    pub states: Vec<MovementState>,
    #[serde(skip)]
    utc_ms: EpochMillis,
}

impl ProcessedSpat {
    pub fn new(
        intersection_id: i64,
        utc_time_stamp: impl Into<String>,
        states: Vec<MovementState>,
    ) -> FusionResult<Self> {
        let mut spat = Self {
            intersection_id,
            utc_time_stamp: utc_time_stamp.into(),
            states,
            utc_ms: 0,
        };
        spat.index_time()?;
        Ok(spat)
    }

    pub fn index_time(&mut self) -> FusionResult<()> {
        self.utc_ms = parse_epoch_millis(&self.utc_time_stamp)?;
        Ok(())
    }
}

impl Timestamped for ProcessedSpat {
    fn timestamp_ms(&self) -> EpochMillis {
        self.utc_ms
    }
}

/// J2735 movement phase state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementPhaseState {
    Unavailable,
    Dark,
    StopThenProceed,
    StopAndRemain,
    PreMovement,
    PermissiveMovementAllowed,
    ProtectedMovementAllowed,
    PermissiveClearance,
    ProtectedClearance,
    CautionConflictingTraffic,
}

// ---------------------------------------------------------------------------
// BSM

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmMetadata {
    pub ode_received_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmCoreData {
    pub id: String,
    pub position: RefPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_mark: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmData {
    pub core_data: BsmCoreData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BsmPayload {
    pub data: BsmData,
}

/// Vehicle basic safety message as delivered by the ODE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeBsmData {
    pub metadata: BsmMetadata,
    pub payload: BsmPayload,
}

impl OdeBsmData {
    pub fn vehicle_id(&self) -> &str {
        &self.payload.data.core_data.id
    }
}

/// One vehicle report positioned for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BsmFeature {
    pub vehicle_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub received_at_ms: EpochMillis,
    pub report: OdeBsmData,
}

impl BsmFeature {
    pub fn from_report(report: OdeBsmData) -> FusionResult<Self> {
        let received_at_ms = parse_epoch_millis(&report.metadata.ode_received_at)?;
        let position = report.payload.data.core_data.position;
        Ok(Self {
            vehicle_id: report.vehicle_id().to_string(),
            longitude: position.longitude,
            latitude: position.latitude,
            received_at_ms,
            report,
        })
    }
}

impl Timestamped for BsmFeature {
    fn timestamp_ms(&self) -> EpochMillis {
        self.received_at_ms
    }
}

// ---------------------------------------------------------------------------
// Monitoring side channels

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionEvent {
    pub event_type: String,
    #[serde(rename = "intersectionID")]
    pub intersection_id: i64,
    #[serde(rename = "roadRegulatorID")]
    pub road_regulator_id: i64,
    pub event_generated_at: EpochMillis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_heading: Option<String>,
    pub notification_generated_at: EpochMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub assessment_type: String,
    #[serde(rename = "intersectionID")]
    pub intersection_id: i64,
    #[serde(rename = "roadRegulatorID")]
    pub road_regulator_id: i64,
    pub assessment_generated_at: EpochMillis,
}

/// Decode a MAP record and index its receipt time.
pub fn decode_map(bytes: &[u8]) -> FusionResult<ProcessedMap> {
    let mut map: ProcessedMap =
        sonic_rs::from_slice(bytes).map_err(|err| super::FusionError::decode("map", err))?;
    map.index_time()?;
    Ok(map)
}

/// Decode a SPAT record and index its timestamp.
pub fn decode_spat(bytes: &[u8]) -> FusionResult<ProcessedSpat> {
    let mut spat: ProcessedSpat =
        sonic_rs::from_slice(bytes).map_err(|err| super::FusionError::decode("spat", err))?;
    spat.index_time()?;
    Ok(spat)
}

/// Decode a BSM record; the receipt time is validated eagerly.
pub fn decode_bsm(bytes: &[u8]) -> FusionResult<OdeBsmData> {
    let bsm: OdeBsmData =
        sonic_rs::from_slice(bytes).map_err(|err| super::FusionError::decode("bsm", err))?;
    parse_epoch_millis(&bsm.metadata.ode_received_at)?;
    Ok(bsm)
}

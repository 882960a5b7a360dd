//! Read-only render state handed to the visualisation layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ViewDefaults;
use crate::core::{
    BsmFeature, EpochMillis, IntersectionEvent, LaneSignalState, Notification, RefPoint,
    RenderInterval, SpatSignalGroup,
};

/// Everything needed to draw one frame of the intersection view.
///
/// The signal fields are sticky: when no SPAT falls inside the interval they keep
/// the last resolved values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    pub interval: RenderInterval,
    pub lane_states: Vec<LaneSignalState>,
    pub signal_groups: Vec<SpatSignalGroup>,
    pub spat_time_ms: Option<EpochMillis>,
    /// Newest first.
    pub bsm_trail: Vec<BsmFeature>,
    pub legend: BTreeMap<String, String>,
    pub events: Vec<IntersectionEvent>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
}

impl ViewState {
    pub fn centered_on(point: RefPoint, zoom: f64) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            zoom,
        }
    }
}

impl From<ViewDefaults> for ViewState {
    fn from(defaults: ViewDefaults) -> Self {
        Self {
            latitude: defaults.latitude,
            longitude: defaults.longitude,
            zoom: defaults.zoom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MapLayer {
    MapMessage,
    MapMessageLabels,
    ConnectingLanes,
    ConnectingLanesLabels,
    SignalStates,
    Bsm,
}

impl MapLayer {
    pub const ALL: [MapLayer; 6] = [
        MapLayer::MapMessage,
        MapLayer::MapMessageLabels,
        MapLayer::ConnectingLanes,
        MapLayer::ConnectingLanesLabels,
        MapLayer::SignalStates,
        MapLayer::Bsm,
    ];

    /// Layers that respond to hover and click.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            MapLayer::MapMessage | MapLayer::ConnectingLanes | MapLayer::SignalStates | MapLayer::Bsm
        )
    }
}

/// A feature the pointer is over or has clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRef {
    pub layer: MapLayer,
    pub feature_id: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// Receipt time of the current MAP and timestamp of the SPAT on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSpatTimes {
    pub map_time_ms: Option<EpochMillis>,
    pub spat_time_ms: Option<EpochMillis>,
}

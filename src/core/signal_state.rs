//! MAP geometry joined with the SPAT series: which colour each ingress lane shows.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::messages::{MovementPhaseState, ProcessedMap, ProcessedSpat};
use super::time_window::RenderInterval;
use super::types::{EpochMillis, Timestamped};

/// Semantic light colour. Paint styling is left to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalColor {
    Red,
    Yellow,
    Green,
    Dark,
    Unknown,
}

impl From<MovementPhaseState> for SignalColor {
    fn from(phase: MovementPhaseState) -> Self {
        use MovementPhaseState::*;
        match phase {
            Dark => SignalColor::Dark,
            StopThenProceed | StopAndRemain => SignalColor::Red,
            PreMovement | PermissiveClearance | ProtectedClearance => SignalColor::Yellow,
            PermissiveMovementAllowed | ProtectedMovementAllowed => SignalColor::Green,
            CautionConflictingTraffic => SignalColor::Yellow,
            Unavailable => SignalColor::Unknown,
        }
    }
}

/// One ingress lane governed by a signal group, with the two coordinates
/// closest to the stop bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSignalGroup {
    pub lane_id: i64,
    pub signal_group: i32,
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatSignalGroup {
    pub signal_group: i32,
    pub phase: MovementPhaseState,
    pub min_end_time: Option<f64>,
    pub max_end_time: Option<f64>,
}

/// Reduced SPAT record: every signal group's current phase at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatSnapshot {
    pub timestamp_ms: EpochMillis,
    pub groups: Vec<SpatSignalGroup>,
}

impl Timestamped for SpatSnapshot {
    fn timestamp_ms(&self) -> EpochMillis {
        self.timestamp_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSignalState {
    pub lane_id: i64,
    pub signal_group: i32,
    pub phase: MovementPhaseState,
    pub color: SignalColor,
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSignalState {
    pub chosen_timestamp_ms: EpochMillis,
    pub signal_groups: Vec<SpatSignalGroup>,
    pub lane_states: Vec<LaneSignalState>,
}

/// Distinct `(lane, signal group)` pairs over the ingress lanes of `map`.
pub fn parse_map_signal_groups(map: &ProcessedMap) -> Vec<LaneSignalGroup> {
    let mut seen = BTreeSet::new();
    let mut groups = Vec::new();
    for lane in &map.map_feature_collection.features {
        for connection in &lane.properties.connects_to {
            let Some(signal_group) = connection.signal_group else {
                continue;
            };
            if !seen.insert((lane.properties.lane_id, signal_group)) {
                continue;
            }
            groups.push(LaneSignalGroup {
                lane_id: lane.properties.lane_id,
                signal_group,
                coordinates: lane.geometry.coordinates.iter().take(2).copied().collect(),
            });
        }
    }
    groups
}

/// Reduce raw SPAT messages to a series keyed by timestamp.
///
/// A later message with the same timestamp replaces the earlier one; the
/// result is ascending by timestamp.
pub fn parse_spat_signal_groups<'a, I>(spats: I) -> Vec<SpatSnapshot>
where
    I: IntoIterator<Item = &'a ProcessedSpat>,
{
    let mut series: BTreeMap<EpochMillis, Vec<SpatSignalGroup>> = BTreeMap::new();
    for spat in spats {
        let groups = spat
            .states
            .iter()
            .filter_map(|state| {
                let event = state.state_time_speed.first()?;
                Some(SpatSignalGroup {
                    signal_group: state.signal_group,
                    phase: event.event_state,
                    min_end_time: event.timing.min_end_time,
                    max_end_time: event.timing.max_end_time,
                })
            })
            .collect();
        series.insert(spat.timestamp_ms(), groups);
    }
    series
        .into_iter()
        .map(|(timestamp_ms, groups)| SpatSnapshot {
            timestamp_ms,
            groups,
        })
        .collect()
}

/// Pick the series entry closest to `interval.end_ms` within the closed interval.
///
/// Every candidate is at or before the end, so the closest is the latest; among
/// equal timestamps the last one scanned wins.
pub fn closest_snapshot<'a, I>(series: I, interval: RenderInterval) -> Option<&'a SpatSnapshot>
where
    I: IntoIterator<Item = &'a SpatSnapshot>,
{
    series
        .into_iter()
        .filter(|snapshot| interval.contains(snapshot.timestamp_ms))
        .fold(None, |best: Option<&SpatSnapshot>, candidate| match best {
            Some(current) if current.timestamp_ms > candidate.timestamp_ms => Some(current),
            _ => Some(candidate),
        })
}

/// Join MAP lanes with the SPAT snapshot chosen for `interval`.
///
/// `None` means no SPAT falls inside the interval; callers keep what they showed last.
/// Lanes whose signal group is absent from the chosen snapshot are left out.
pub fn derive_lane_states<'a, I>(
    map_groups: &[LaneSignalGroup],
    series: I,
    interval: RenderInterval,
) -> Option<ResolvedSignalState>
where
    I: IntoIterator<Item = &'a SpatSnapshot>,
{
    let chosen = closest_snapshot(series, interval)?;
    let by_group: BTreeMap<i32, &SpatSignalGroup> = chosen
        .groups
        .iter()
        .map(|group| (group.signal_group, group))
        .collect();

    let lane_states = map_groups
        .iter()
        .filter_map(|lane| {
            let group = by_group.get(&lane.signal_group)?;
            Some(LaneSignalState {
                lane_id: lane.lane_id,
                signal_group: lane.signal_group,
                phase: group.phase,
                color: SignalColor::from(group.phase),
                coordinates: lane.coordinates.clone(),
            })
        })
        .collect();

    Some(ResolvedSignalState {
        chosen_timestamp_ms: chosen.timestamp_ms,
        signal_groups: chosen.groups.clone(),
        lane_states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::messages::{
        ConnectingLane, LaneConnection, LaneFeature, LaneProperties, LineString, MapProperties,
        MovementEvent, MovementState, PhaseTiming, RefPoint,
    };
    use crate::core::types::format_epoch_millis;

    fn group(signal_group: i32, phase: MovementPhaseState) -> SpatSignalGroup {
        SpatSignalGroup {
            signal_group,
            phase,
            min_end_time: None,
            max_end_time: None,
        }
    }

    fn snapshot(ts: EpochMillis, groups: Vec<SpatSignalGroup>) -> SpatSnapshot {
        SpatSnapshot {
            timestamp_ms: ts,
            groups,
        }
    }

    fn lane(lane_id: i64, groups: &[i32]) -> LaneFeature {
        LaneFeature {
            kind: "Feature".to_string(),
            id: lane_id,
            geometry: LineString::new(vec![[0.0, lane_id as f64], [1.0, 1.0], [2.0, 2.0]]),
            properties: LaneProperties {
                lane_id,
                ingress_approach: Some(1),
                egress_approach: None,
                ingress_path: true,
                egress_path: false,
                connects_to: groups
                    .iter()
                    .map(|g| LaneConnection {
                        connecting_lane: ConnectingLane {
                            lane: 100 + lane_id,
                            maneuver: None,
                        },
                        signal_group: Some(*g),
                        connection_id: None,
                    })
                    .collect(),
            },
        }
    }

    fn map_with(lanes: Vec<LaneFeature>) -> ProcessedMap {
        ProcessedMap::new(
            MapProperties {
                intersection_id: 1,
                road_regulator_id: None,
                ref_point: RefPoint {
                    latitude: 0.0,
                    longitude: 0.0,
                    elevation: None,
                },
                ode_received_at: format_epoch_millis(0),
                origin_ip: None,
            },
            lanes,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn picks_latest_snapshot_inside_interval() {
        let series = vec![
            snapshot(100_000, vec![group(1, MovementPhaseState::StopAndRemain)]),
            snapshot(105_000, vec![group(1, MovementPhaseState::ProtectedMovementAllowed)]),
            snapshot(110_000, vec![group(1, MovementPhaseState::ProtectedClearance)]),
        ];
        let chosen = closest_snapshot(&series, RenderInterval::new(102_000, 108_000)).unwrap();
        assert_eq!(chosen.timestamp_ms, 105_000);
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let series = vec![snapshot(100_000, vec![]), snapshot(110_000, vec![])];
        let chosen = closest_snapshot(&series, RenderInterval::new(100_000, 110_000)).unwrap();
        assert_eq!(chosen.timestamp_ms, 110_000);
        assert!(closest_snapshot(&series, RenderInterval::new(100_001, 109_999)).is_none());
    }

    #[test]
    fn duplicate_keys_take_last_scanned() {
        let series = vec![
            snapshot(5, vec![group(1, MovementPhaseState::Dark)]),
            snapshot(5, vec![group(1, MovementPhaseState::StopAndRemain)]),
        ];
        let chosen = closest_snapshot(&series, RenderInterval::new(0, 10)).unwrap();
        assert_eq!(chosen.groups[0].phase, MovementPhaseState::StopAndRemain);
    }

    #[test]
    fn lanes_without_matching_group_are_omitted() {
        let map = map_with(vec![lane(1, &[2]), lane(2, &[4]), lane(3, &[9])]);
        let map_groups = parse_map_signal_groups(&map);
        let series = vec![snapshot(
            50,
            vec![
                group(2, MovementPhaseState::ProtectedMovementAllowed),
                group(4, MovementPhaseState::StopAndRemain),
            ],
        )];

        let resolved = derive_lane_states(&map_groups, &series, RenderInterval::new(0, 60)).unwrap();
        let colors: Vec<_> = resolved
            .lane_states
            .iter()
            .map(|l| (l.lane_id, l.color))
            .collect();
        assert_eq!(colors, vec![(1, SignalColor::Green), (2, SignalColor::Red)]);
        assert_eq!(resolved.chosen_timestamp_ms, 50);
        assert!(resolved.lane_states.iter().all(|l| l.coordinates.len() == 2));
    }

    #[test]
    fn no_snapshot_in_interval_yields_none() {
        let map_groups = parse_map_signal_groups(&map_with(vec![lane(1, &[2])]));
        let series = vec![snapshot(500, vec![group(2, MovementPhaseState::Dark)])];
        assert!(derive_lane_states(&map_groups, &series, RenderInterval::new(0, 100)).is_none());
    }

    #[test]
    fn map_pairs_are_distinct() {
        let map = map_with(vec![lane(1, &[2, 2, 3])]);
        let pairs: Vec<_> = parse_map_signal_groups(&map)
            .iter()
            .map(|g| (g.lane_id, g.signal_group))
            .collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3)]);
    }

    #[test]
    fn spat_series_overwrites_equal_timestamps_and_sorts() {
        let spat = |ts: EpochMillis, phase| {
            ProcessedSpat::new(
                1,
                format_epoch_millis(ts),
                vec![MovementState {
                    signal_group: 1,
                    state_time_speed: vec![MovementEvent {
                        event_state: phase,
                        timing: PhaseTiming::default(),
                    }],
                }],
            )
            .unwrap()
        };
        let raw = [
            spat(2_000, MovementPhaseState::Dark),
            spat(1_000, MovementPhaseState::StopAndRemain),
            spat(2_000, MovementPhaseState::PermissiveMovementAllowed),
        ];
        let series = parse_spat_signal_groups(&raw);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp_ms, 1_000);
        assert_eq!(
            series[1].groups[0].phase,
            MovementPhaseState::PermissiveMovementAllowed
        );
    }
}

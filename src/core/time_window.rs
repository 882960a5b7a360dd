//! Slider and window arithmetic.
//!
//! Everything here is pure. Times are epoch milliseconds, slider offsets and window
//! widths are whole seconds, matching how the scrubber is driven.

use serde::{Deserialize, Serialize};

use super::types::EpochMillis;

const MS_PER_SEC: i64 = 1000;

/// Closed interval `[start_ms, end_ms]` currently being rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderInterval {
    pub start_ms: EpochMillis,
    pub end_ms: EpochMillis,
}

impl RenderInterval {
    pub fn new(start_ms: EpochMillis, end_ms: EpochMillis) -> Self {
        Self { start_ms, end_ms }
    }

    #[inline]
    pub fn contains(&self, ts_ms: EpochMillis) -> bool {
        ts_ms >= self.start_ms && ts_ms <= self.end_ms
    }

    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / MS_PER_SEC as f64
    }

    pub fn end_secs(&self) -> f64 {
        self.end_ms as f64 / MS_PER_SEC as f64
    }

    pub fn width_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Trailing window `[query_start + slider - window, query_start + slider]`.
///
/// Not clamped to the query range: with `window_secs > slider_secs` the start lies
/// before `query_start_ms`.
pub fn sliding_interval(
    query_start_ms: EpochMillis,
    slider_secs: i64,
    window_secs: i64,
) -> RenderInterval {
    let end_ms = query_start_ms + slider_secs * MS_PER_SEC;
    RenderInterval {
        start_ms: end_ms - window_secs * MS_PER_SEC,
        end_ms,
    }
}

/// Whole seconds between two instants; used to park the slider at the full range.
pub fn slider_position(query_start_ms: EpochMillis, query_end_ms: EpochMillis) -> i64 {
    (query_end_ms - query_start_ms) / MS_PER_SEC
}

/// Retrieval range for historical queries and the domain of the scrubber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub start_ms: EpochMillis,
    pub end_ms: EpochMillis,
    pub event_ms: EpochMillis,
    pub vehicle_id: Option<String>,
    pub intersection_id: Option<i64>,
    pub road_regulator_id: Option<i64>,
}

impl QueryWindow {
    /// One minute either side of `now`, no intersection selected.
    pub fn around(now_ms: EpochMillis) -> Self {
        Self {
            start_ms: now_ms - 60 * MS_PER_SEC,
            end_ms: now_ms + 60 * MS_PER_SEC,
            event_ms: now_ms,
            vehicle_id: None,
            intersection_id: None,
            road_regulator_id: None,
        }
    }

    /// Retention applied to every buffer: `event - start`, never negative.
    pub fn retention_ms(&self) -> i64 {
        (self.event_ms - self.start_ms).max(0)
    }

    pub fn span_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn has_target(&self) -> bool {
        self.intersection_id.is_some() && self.road_regulator_id.is_some()
    }
}

/// Partial update of a [`QueryWindow`]; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct QueryUpdate {
    pub start_ms: Option<EpochMillis>,
    pub end_ms: Option<EpochMillis>,
    pub event_ms: Option<EpochMillis>,
    pub vehicle_id: Option<String>,
    pub intersection_id: Option<i64>,
    pub road_regulator_id: Option<i64>,
    pub reset_time_window: bool,
    pub update_slider: bool,
}

impl QueryUpdate {
    pub fn apply_to(&self, current: &QueryWindow) -> QueryWindow {
        QueryWindow {
            start_ms: self.start_ms.unwrap_or(current.start_ms),
            end_ms: self.end_ms.unwrap_or(current.end_ms),
            event_ms: self.event_ms.unwrap_or(current.event_ms),
            vehicle_id: self
                .vehicle_id
                .clone()
                .or_else(|| current.vehicle_id.clone()),
            intersection_id: self.intersection_id.or(current.intersection_id),
            road_regulator_id: self.road_regulator_id.or(current.road_regulator_id),
        }
    }
}

/// Scrubber position and trailing-window width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderState {
    pub value_secs: i64,
    pub window_secs: i64,
}

impl SliderState {
    pub fn new(value_secs: i64, window_secs: i64) -> Self {
        Self {
            value_secs,
            window_secs: window_secs.max(0),
        }
    }

    pub fn interval(&self, query_start_ms: EpochMillis) -> RenderInterval {
        sliding_interval(query_start_ms, self.value_secs, self.window_secs)
    }

    /// Time range shown next to the scrubber. Same arithmetic as the render interval.
    pub fn time_value(&self, query_start_ms: EpochMillis) -> RenderInterval {
        self.interval(query_start_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_interval_is_exact() {
        for (t, s, w) in [(0, 0, 0), (1_700_000_000_000, 45, 60), (-5_000, 3, 1), (10, 7, 7)] {
            let interval = sliding_interval(t, s, w);
            assert_eq!(interval.start_ms, t + (s - w) * 1000);
            assert_eq!(interval.end_ms, t + s * 1000);
            assert_eq!(interval.width_ms(), w * 1000);
        }
    }

    #[test]
    fn window_wider_than_slider_is_not_clamped() {
        let interval = sliding_interval(100_000, 10, 60);
        assert_eq!(interval.start_ms, 50_000);
        assert!(interval.start_ms < 100_000);
    }

    #[test]
    fn slider_position_counts_whole_seconds() {
        assert_eq!(slider_position(1_000, 121_000), 120);
        assert_eq!(slider_position(0, 999), 0);
    }

    #[test]
    fn slider_never_produces_inverted_interval() {
        let slider = SliderState::new(5, -30);
        let interval = slider.interval(0);
        assert!(interval.start_ms <= interval.end_ms);
    }

    #[test]
    fn query_update_keeps_unset_fields() {
        let current = QueryWindow {
            intersection_id: Some(12),
            road_regulator_id: Some(-1),
            ..QueryWindow::around(1_000_000)
        };
        let next = QueryUpdate {
            end_ms: Some(2_000_000),
            ..Default::default()
        }
        .apply_to(&current);
        assert_eq!(next.start_ms, current.start_ms);
        assert_eq!(next.end_ms, 2_000_000);
        assert_eq!(next.intersection_id, Some(12));
    }

    #[test]
    fn retention_is_event_minus_start() {
        let q = QueryWindow {
            start_ms: 10_000,
            end_ms: 30_000,
            event_ms: 25_000,
            vehicle_id: None,
            intersection_id: None,
            road_regulator_id: None,
        };
        assert_eq!(q.retention_ms(), 15_000);
    }
}

//! Batch retrieval of past messages.
//!
//! The engine never talks to a REST API directly; a [`HistoricalSource`] is handed
//! to it and each category is fetched through one of these futures.

use std::future::Future;
use std::pin::Pin;

use crate::core::{
    EpochMillis, FusionResult, IntersectionEvent, Notification, OdeBsmData, ProcessedMap,
    ProcessedSpat, RefPoint,
};

pub type HistoryFuture<T> = Pin<Box<dyn Future<Output = FusionResult<Vec<T>>> + Send>>;

/// Common selector for intersection-scoped pulls.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionQuery {
    pub token: String,
    pub intersection_id: i64,
    pub road_regulator_id: i64,
    pub start_ms: EpochMillis,
    pub end_ms: EpochMillis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BsmQuery {
    pub token: String,
    pub vehicle_id: Option<String>,
    pub start_ms: EpochMillis,
    pub end_ms: EpochMillis,
    pub center: RefPoint,
    pub radius_m: f64,
}

pub trait HistoricalSource: Send + Sync + 'static {
    /// Only the newest MAP up to `end_ms` is needed; implementations may return more.
    fn map_messages(&self, query: IntersectionQuery) -> HistoryFuture<ProcessedMap>;

    fn spat_messages(&self, query: IntersectionQuery) -> HistoryFuture<ProcessedSpat>;

    fn bsm_messages(&self, query: BsmQuery) -> HistoryFuture<OdeBsmData>;

    fn events(&self, query: IntersectionQuery) -> HistoryFuture<IntersectionEvent>;

    fn notifications(&self, query: IntersectionQuery) -> HistoryFuture<Notification>;
}

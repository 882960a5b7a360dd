use signal_fusion::config::FusionConfig;
use signal_fusion::core::{MovementPhaseState, QueryUpdate, RefPoint, SignalColor};
use signal_fusion::engine::{FusionEngine, NoticeLevel, SourceApi};
use signal_fusion::export::read_archive;
use signal_fusion::testing::{InMemoryHistory, sample_bsm, sample_map, sample_spat};

const T0: i64 = 1_700_000_000_000;
const INTERSECTION: i64 = 12109;

fn ref_point() -> RefPoint {
    RefPoint {
        latitude: 39.5881,
        longitude: -105.0910,
        elevation: None,
    }
}

fn history() -> InMemoryHistory {
    use MovementPhaseState::*;
    InMemoryHistory::new(
        vec![sample_map(INTERSECTION, T0 - 120_000, ref_point()).unwrap()],
        vec![
            sample_spat(INTERSECTION, T0 - 10_000, &[(2, ProtectedMovementAllowed)]).unwrap(),
            sample_spat(
                INTERSECTION,
                T0 - 5_000,
                &[(2, StopAndRemain), (4, ProtectedMovementAllowed)],
            )
            .unwrap(),
        ],
        vec![
            sample_bsm("veh-1", T0 - 3_000, -105.0911, 39.5880),
            sample_bsm("veh-1", T0 - 2_000, -105.0912, 39.5881),
            sample_bsm("veh-2", T0 - 1_000, -105.0909, 39.5882),
        ],
    )
}

fn ready_engine() -> FusionEngine {
    let mut engine = FusionEngine::starting_at(
        FusionConfig::default(),
        SourceApi::ConflictVisualizer,
        T0,
    );
    engine.set_auth_token(Some("token".to_string()));
    engine.update_query_params(QueryUpdate {
        intersection_id: Some(INTERSECTION),
        road_regulator_id: Some(-1),
        ..QueryUpdate::default()
    });
    engine
}

#[tokio::test]
async fn initial_load_renders_signal_states_and_trail() {
    let mut engine = ready_engine();
    assert!(engine.load_initial(&history()).await);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.interval.start_ms, T0 - 60_000);
    assert_eq!(snapshot.interval.end_ms, T0);
    assert_eq!(snapshot.spat_time_ms, Some(T0 - 5_000));

    let lane = |id: i64| {
        snapshot
            .lane_states
            .iter()
            .find(|state| state.lane_id == id)
            .unwrap()
    };
    assert_eq!(lane(1).color, SignalColor::Red);
    assert_eq!(lane(3).color, SignalColor::Green);

    let trail: Vec<i64> = snapshot
        .bsm_trail
        .iter()
        .map(|feature| feature.received_at_ms)
        .collect();
    assert_eq!(trail, vec![T0 - 1_000, T0 - 2_000, T0 - 3_000]);
    assert_eq!(snapshot.legend.len(), 2);

    let view = engine.view_state();
    assert_eq!(view.latitude, ref_point().latitude);
    assert_eq!(view.longitude, ref_point().longitude);
    assert_eq!(engine.map_spat_times().map_time_ms, Some(T0 - 120_000));

    let notices = engine.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
}

#[tokio::test]
async fn load_without_token_or_intersection_is_skipped() {
    let source = history();
    let mut engine = FusionEngine::starting_at(
        FusionConfig::default(),
        SourceApi::ConflictVisualizer,
        T0,
    );
    assert!(!engine.load_initial(&source).await);

    engine.update_query_params(QueryUpdate {
        intersection_id: Some(INTERSECTION),
        road_regulator_id: Some(-1),
        ..QueryUpdate::default()
    });
    assert!(!engine.load_initial(&source).await);
    assert_eq!(source.request_count(), 0);
    assert_eq!(engine.load_generation(), 0);
}

#[tokio::test]
async fn failed_fetch_leaves_state_untouched() {
    let mut engine = ready_engine();
    assert!(engine.load_initial(&history()).await);
    engine.drain_notices();
    let before = engine.snapshot().clone();
    let spats_before = engine.spat_history().len();

    assert!(!engine.load_initial(&history().failing("spat")).await);

    assert_eq!(engine.snapshot(), &before);
    assert_eq!(engine.spat_history().len(), spats_before);
    let notices = engine.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(notices[0].message.contains("SPAT") || notices[0].message.contains("spat"));
}

#[tokio::test]
async fn side_channel_failure_is_reported_but_load_succeeds() {
    let mut engine = ready_engine();
    assert!(engine.load_initial(&history().failing("event")).await);

    assert_eq!(engine.spat_history().len(), 2);
    let notices = engine.drain_notices();
    assert!(
        notices
            .iter()
            .any(|notice| notice.level == NoticeLevel::Error && notice.message.contains("Event"))
    );
    assert!(notices.iter().any(|notice| notice.level == NoticeLevel::Info));
}

#[tokio::test]
async fn superseded_generation_is_ignored() {
    let mut engine = ready_engine();
    let source = history();

    let first = engine.begin_load().unwrap();
    let second = engine.begin_load().unwrap();
    assert!(second.generation > first.generation);

    let stale = signal_fusion::engine::fetch_initial(&source, &first).await;
    assert!(!engine.complete_load(first.generation, stale));
    assert!(engine.current_map().is_none());

    let fresh = signal_fusion::engine::fetch_initial(&source, &second).await;
    assert!(engine.complete_load(second.generation, fresh));
    assert!(engine.current_map().is_some());
}

#[tokio::test]
async fn export_then_import_reproduces_snapshot() {
    let mut original = ready_engine();
    assert!(original.load_initial(&history()).await);

    let archive = original
        .export()
        .write_archive(INTERSECTION)
        .unwrap()
        .unwrap();
    assert_eq!(archive.file_name, "intersection_12109_data.zip");

    let mut replayed = FusionEngine::starting_at(
        FusionConfig::default(),
        SourceApi::ConflictVisualizer,
        T0 + 3_600_000,
    );
    replayed
        .load_imported(read_archive(&archive.bytes).unwrap())
        .unwrap();
    assert_eq!(replayed.query().start_ms, T0 - 10_000);
    assert_eq!(replayed.query().end_ms, T0 - 5_000);
    assert_eq!(replayed.query().intersection_id, Some(INTERSECTION));

    // Same query window on both sides.
    let window = QueryUpdate {
        start_ms: Some(original.query().start_ms),
        end_ms: Some(original.query().end_ms),
        event_ms: Some(original.query().event_ms),
        ..QueryUpdate::default()
    };
    replayed.update_query_params(window);
    replayed.set_slider_value(original.slider().value_secs);

    assert_eq!(replayed.snapshot(), original.snapshot());
}

#[tokio::test]
async fn changing_intersection_drops_imported_archive() {
    let mut original = ready_engine();
    assert!(original.load_initial(&history()).await);
    let archive = original
        .export()
        .write_archive(INTERSECTION)
        .unwrap()
        .unwrap();

    let mut replayed = FusionEngine::starting_at(
        FusionConfig::default(),
        SourceApi::ConflictVisualizer,
        T0,
    );
    replayed
        .load_imported(read_archive(&archive.bytes).unwrap())
        .unwrap();
    assert!(replayed.begin_load().unwrap().imported.is_some());

    // Same intersection: the archive stays.
    replayed.update_query_params(QueryUpdate {
        start_ms: Some(T0 - 20_000),
        ..QueryUpdate::default()
    });
    assert!(replayed.begin_load().unwrap().imported.is_some());

    replayed.update_query_params(QueryUpdate {
        intersection_id: Some(INTERSECTION + 1),
        ..QueryUpdate::default()
    });
    assert!(replayed.begin_load().is_none());
    replayed.set_auth_token(Some("token".to_string()));
    assert!(replayed.begin_load().unwrap().imported.is_none());
}

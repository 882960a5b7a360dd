use std::time::{Duration, Instant};

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef};
use signal_fusion::config::{FusionConfig, LiveFeedConfig};
use signal_fusion::core::{FusionError, MovementPhaseState, QueryUpdate, RefPoint, now_epoch_ms};
use signal_fusion::engine::{
    DrainNotices, EngineStatus, FusionActor, FusionActorArgs, FusionEngine, FusionEvent,
    GetEngineStatus, NoticeLevel, SourceApi,
};
use signal_fusion::live::{
    GetLiveStatus, LiveConnect, LiveDisconnect, LiveFeedActor, LiveFeedArgs, LiveState,
    LiveStatus, LiveTarget, StompCommand, StompFrame,
};
use signal_fusion::testing::{MockServer, MockTransport, sample_bsm, sample_map, sample_spat};

type LiveRef = ActorRef<LiveFeedActor<MockTransport>>;

const INTERSECTION: i64 = 12109;
const STEP: Duration = Duration::from_secs(2);

fn target() -> LiveTarget {
    LiveTarget::new(-1, INTERSECTION)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_pair(transport: MockTransport) -> (ActorRef<FusionActor>, LiveRef) {
    init_tracing();
    let engine = FusionActor::spawn(FusionActorArgs {
        engine: FusionEngine::new(FusionConfig::default(), SourceApi::ConflictVisualizer),
        source: None,
    });
    engine
        .ask(FusionEvent::UpdateQueryParams(QueryUpdate {
            intersection_id: Some(INTERSECTION),
            road_regulator_id: Some(-1),
            ..QueryUpdate::default()
        }))
        .await
        .expect("select intersection");

    let live = LiveFeedActor::spawn(LiveFeedArgs {
        transport,
        config: LiveFeedConfig {
            url: "ws://mock/stomp".to_string(),
            ..LiveFeedConfig::default()
        },
        advance_interval: Duration::from_secs(1),
        engine: engine.clone(),
    });
    (engine, live)
}

async fn wait_for_live(
    live: &LiveRef,
    predicate: impl Fn(&LiveStatus) -> bool,
) -> LiveStatus {
    let deadline = Instant::now() + STEP;
    loop {
        let status = live.ask(GetLiveStatus).await.expect("live status");
        if predicate(&status) {
            return status;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for live status, last: {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_engine(
    engine: &ActorRef<FusionActor>,
    predicate: impl Fn(&EngineStatus) -> bool,
) -> EngineStatus {
    let deadline = Instant::now() + STEP;
    loop {
        let status = engine.ask(GetEngineStatus).await.expect("engine status");
        if predicate(&status) {
            return status;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for engine status, last: {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Connect and complete the STOMP handshake; returns the three SUBSCRIBE frames.
async fn connect_and_subscribe(live: &LiveRef, server: &mut MockServer) -> Vec<StompFrame> {
    live.ask(LiveConnect {
        target: target(),
        token: Some("session-token".to_string()),
    })
    .await
    .expect("connect");

    let connect = server.recv_stomp(STEP).await.expect("CONNECT frame");
    assert_eq!(connect.command, StompCommand::Connect);
    assert_eq!(connect.get("accept-version"), Some("1.0,1.1"));

    server
        .send_stomp(&StompFrame::new(StompCommand::Connected).header("version", "1.1"))
        .expect("send CONNECTED");

    let mut subscribes = Vec::new();
    for _ in 0..3 {
        subscribes.push(server.recv_stomp(STEP).await.expect("SUBSCRIBE frame"));
    }
    wait_for_live(live, |status| status.state == LiveState::Subscribed).await;
    subscribes
}

fn message(subscription: &str, destination: &str, body: String) -> StompFrame {
    StompFrame::new(StompCommand::Message)
        .header("subscription", subscription)
        .header("destination", destination)
        .header("content-type", "application/json")
        .with_body(body)
}

fn ref_point() -> RefPoint {
    RefPoint {
        latitude: 39.5881,
        longitude: -105.0910,
        elevation: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribes_to_all_three_topics_after_connected() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;

    let subscribes = connect_and_subscribe(&live, &mut server).await;

    let request = server.try_recv_connect_request().expect("handshake request");
    assert_eq!(request.url, "ws://mock/stomp");
    assert_eq!(
        request.protocols,
        vec!["v10.stomp", "v11.stomp", "session-token"]
    );

    let mut destinations: Vec<&str> = subscribes
        .iter()
        .map(|frame| {
            assert_eq!(frame.command, StompCommand::Subscribe);
            frame.get("destination").unwrap()
        })
        .collect();
    destinations.sort_unstable();
    assert_eq!(
        destinations,
        vec![
            "/live/-1/12109/bsm",
            "/live/-1/12109/map",
            "/live/-1/12109/spat"
        ]
    );

    let status = wait_for_engine(&engine, |status| status.live_active).await;
    assert_eq!(status.slider.window_secs, 2);
    assert_eq!(status.query.end_ms - status.query.start_ms, 10_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forwards_each_message_as_single_ingest() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;

    let now = now_epoch_ms();
    let map = sample_map(INTERSECTION, now, ref_point()).unwrap();
    let spat = sample_spat(
        INTERSECTION,
        now,
        &[(2, MovementPhaseState::ProtectedMovementAllowed)],
    )
    .unwrap();
    let bsm = sample_bsm("veh-1", now, -105.0911, 39.5880);

    server
        .send_stomp(&message(
            "sub-map",
            "/live/-1/12109/map",
            sonic_rs::to_string(&map).unwrap(),
        ))
        .unwrap();
    server
        .send_stomp(&message(
            "sub-spat",
            "/live/-1/12109/spat",
            sonic_rs::to_string(&spat).unwrap(),
        ))
        .unwrap();
    server
        .send_stomp(&message(
            "sub-bsm",
            "/live/-1/12109/bsm",
            sonic_rs::to_string(&bsm).unwrap(),
        ))
        .unwrap();

    let status = wait_for_live(&live, |status| status.stats.messages_forwarded() == 3).await;
    assert_eq!(status.stats.map_messages, 1);
    assert_eq!(status.stats.spat_messages, 1);
    assert_eq!(status.stats.bsm_messages, 1);
    assert_eq!(status.stats.decode_failures, 0);

    let engine_status = wait_for_engine(&engine, |status| status.bsm_records == 1).await;
    assert_eq!(engine_status.map_records, 1);
    assert_eq!(engine_status.spat_records, 1);
    assert_eq!(
        engine_status.view_state.latitude,
        ref_point().latitude
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_messages_are_skipped() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;

    server
        .send_stomp(&message(
            "sub-map",
            "/live/-1/12109/map",
            "{\"properties\": 42".to_string(),
        ))
        .unwrap();
    server.send_text("not a stomp frame").unwrap();
    server.send_text("\n").unwrap();
    let bsm = sample_bsm("veh-9", now_epoch_ms(), -105.0911, 39.5880);
    server
        .send_stomp(&message(
            "sub-bsm",
            "/live/-1/12109/bsm",
            sonic_rs::to_string(&bsm).unwrap(),
        ))
        .unwrap();

    let status = wait_for_live(&live, |status| status.stats.bsm_messages == 1).await;
    assert_eq!(status.state, LiveState::Subscribed);
    assert_eq!(status.stats.decode_failures, 1);
    assert_eq!(status.stats.protocol_errors, 1);
    assert_eq!(status.stats.heartbeats, 1);
    assert_eq!(status.stats.map_messages, 0);

    let engine_status = wait_for_engine(&engine, |status| status.bsm_records == 1).await;
    assert_eq!(engine_status.map_records, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_is_idempotent_and_leaves_live_mode() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;
    wait_for_engine(&engine, |status| status.live_active).await;

    live.ask(LiveDisconnect).await.expect("disconnect");
    let frame = server.recv_stomp(STEP).await.expect("DISCONNECT frame");
    assert_eq!(frame.command, StompCommand::Disconnect);
    assert!(frame.get("receipt").is_some());

    let status = live.ask(GetLiveStatus).await.expect("live status");
    assert_eq!(status.state, LiveState::Disconnected);
    assert_eq!(status.target, None);

    let engine_status = wait_for_engine(&engine, |status| !status.live_active).await;
    assert_eq!(engine_status.slider.window_secs, 60);

    live.ask(LiveDisconnect).await.expect("second disconnect");
    assert!(
        server
            .recv_stomp(Duration::from_millis(100))
            .await
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_connect_for_same_target_is_a_no_op() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (_engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;

    live.ask(LiveConnect {
        target: target(),
        token: None,
    })
    .await
    .expect("second connect");

    let status = live.ask(GetLiveStatus).await.expect("live status");
    assert_eq!(status.state, LiveState::Subscribed);
    assert_eq!(status.stats.connect_attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_failure_is_reported_without_retry() {
    let (transport, mut server) = MockTransport::refusing("broker unreachable");
    let (engine, live) = spawn_pair(transport).await;

    let err = live
        .ask(LiveConnect {
            target: target(),
            token: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(FusionError::ConnectionFailed(_))
    ));

    let status = live.ask(GetLiveStatus).await.expect("live status");
    assert_eq!(status.state, LiveState::Disconnected);
    assert_eq!(status.stats.connect_attempts, 1);
    assert_eq!(status.stats.connect_failures, 1);

    let notices = engine.ask(DrainNotices).await.expect("notices");
    assert!(
        notices
            .iter()
            .any(|notice| notice.level == NoticeLevel::Error
                && notice.message.contains("broker unreachable"))
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.try_recv_connect_request().is_some());
    assert!(server.try_recv_connect_request().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_close_ends_the_session() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;
    wait_for_engine(&engine, |status| status.live_active).await;

    server.drop_socket();

    let status = wait_for_live(&live, |status| status.state == LiveState::Disconnected).await;
    assert_eq!(
        status.stats.last_disconnect_reason.as_deref(),
        Some("stream ended")
    );
    wait_for_engine(&engine, |status| !status.live_active).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broker_error_frame_ends_the_session() {
    let (transport, mut server) = MockTransport::channel_pair();
    let (engine, live) = spawn_pair(transport).await;
    connect_and_subscribe(&live, &mut server).await;

    server
        .send_stomp(
            &StompFrame::new(StompCommand::Error)
                .header("message", "subscription rejected")
                .with_body("no access"),
        )
        .unwrap();

    let status = wait_for_live(&live, |status| status.state == LiveState::Disconnected).await;
    assert_eq!(
        status.stats.last_disconnect_reason.as_deref(),
        Some("subscription rejected")
    );

    let notices = engine.ask(DrainNotices).await.expect("notices");
    assert!(
        notices
            .iter()
            .any(|notice| notice.message.contains("subscription rejected"))
    );
}

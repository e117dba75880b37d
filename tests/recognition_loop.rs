mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{matched, model_not_ready, Answer, FailingSource, FakeService, GatedSource};
use facelink::common::config::{RecognitionConfig, ServiceConfig};
use facelink::core::recognition::{
    LABEL_WAITING, STATUS_AWAITING_TRAIN, STATUS_CAMERA_ERROR, STATUS_CONFIRMED,
    STATUS_CONNECTION_LOST, STATUS_FEED_ACTIVE,
};
use facelink::{CameraSession, FaceLinkError, RecognitionLoop};

const WAIT: Duration = Duration::from_secs(5);

fn fast() -> RecognitionConfig {
    RecognitionConfig { interval_ms: 20, ..RecognitionConfig::default() }
}

fn start(service: Arc<FakeService>, ready: bool) -> (RecognitionLoop, common::Flags) {
    let (source, ready_flag, released) = GatedSource::new(ready);
    let camera = CameraSession::from_source(Box::new(source));
    let recognition = RecognitionLoop::start(camera, service, &fast(), &ServiceConfig::default());
    (recognition, common::Flags { ready: ready_flag, released })
}

#[tokio::test]
async fn confirmed_identity_is_displayed() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 93)));
    let (recognition, _flags) = start(service.clone(), true);

    let mut display = recognition.subscribe();
    let shown = tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence > 0))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert!(shown.matched);
    assert_eq!(shown.label, "alice");
    assert_eq!(shown.confidence, 93);
    assert_eq!(shown.status, STATUS_CONFIRMED);
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn untrained_model_zeroes_confidence() {
    let service = Arc::new(FakeService::new().answering(model_not_ready()));
    let (recognition, _flags) = start(service, true);

    let mut display = recognition.subscribe();
    let shown = tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence > 0))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert!(!shown.model_ready);
    assert!(!shown.matched);
    assert_eq!(shown.confidence, 0);
    assert_eq!(shown.label, LABEL_WAITING);
    assert_eq!(shown.status, STATUS_AWAITING_TRAIN);
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_service_degrades_status_and_keeps_polling() {
    let service = Arc::new(FakeService::new().answering(Answer::Unreachable));
    let (recognition, _flags) = start(service.clone(), true);

    let mut display = recognition.subscribe();
    let shown = tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence >= 3))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(shown.status, STATUS_CONNECTION_LOST);
    assert!(!recognition.is_stopped());
    assert!(service.recognize_count() >= 3);
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn unready_source_skips_ticks_without_requests() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 80)));
    let (recognition, flags) = start(service.clone(), false);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(service.recognize_count(), 0);
    assert_eq!(recognition.snapshot().sequence, 0);

    flags.ready.store(true, Ordering::SeqCst);
    let mut display = recognition.subscribe();
    tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence > 0))
        .await
        .unwrap()
        .unwrap();
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_camera_and_stops_requests() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 90)));
    let (recognition, flags) = start(service.clone(), true);

    let mut display = recognition.subscribe();
    tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence > 0))
        .await
        .unwrap()
        .unwrap();

    recognition.shutdown().await.unwrap();
    assert!(flags.released.load(Ordering::SeqCst));

    let calls = service.recognize_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.recognize_count(), calls);
}

#[tokio::test]
async fn stopped_loop_publishes_nothing_further() {
    let service = Arc::new(FakeService::new().answering(Answer::Unreachable));
    let (recognition, _flags) = start(service.clone(), true);

    let mut display = recognition.subscribe();
    tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence > 0))
        .await
        .unwrap()
        .unwrap();

    recognition.stop();
    assert!(recognition.is_stopped());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frozen = recognition.snapshot();

    *service.answer.lock().unwrap() = matched("mallory", 99);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recognition.snapshot(), frozen);
    assert_ne!(frozen.label, "mallory");
}

#[tokio::test]
async fn shutdown_right_after_start_still_releases_camera() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 90)));
    for _ in 0..5 {
        let (recognition, flags) = start(service.clone(), true);
        tokio::time::sleep(Duration::from_millis(5)).await;
        recognition.shutdown().await.unwrap();
        assert!(flags.released.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn hung_request_times_out_into_connection_lost() {
    let service = Arc::new(FakeService::new().answering(Answer::Hang));
    let (source, _ready, _released) = GatedSource::new(true);
    let service_config = ServiceConfig { request_timeout_ms: 100, ..ServiceConfig::default() };
    let recognition = RecognitionLoop::start(
        CameraSession::from_source(Box::new(source)),
        service.clone(),
        &fast(),
        &service_config,
    );

    let mut display = recognition.subscribe();
    let shown = tokio::time::timeout(WAIT, display.wait_for(|d| d.sequence >= 2))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert_eq!(shown.status, STATUS_CONNECTION_LOST);
    assert!(!recognition.is_stopped());
    assert!(service.recognize_count() >= 2);
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn streaming_camera_reports_feed_active_before_first_result() {
    let service = Arc::new(FakeService::new().answering(Answer::Hang));
    let (recognition, _flags) = start(service, true);

    let mut display = recognition.subscribe();
    let shown = tokio::time::timeout(WAIT, display.wait_for(|d| d.status == STATUS_FEED_ACTIVE))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(shown.sequence, 0);
    recognition.shutdown().await.unwrap();
}

#[tokio::test]
async fn denied_camera_is_surfaced_and_stops_the_loop() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 90)));
    let (source, released) = FailingSource::new(|| FaceLinkError::PermissionDenied("/dev/video0".into()));
    let recognition = RecognitionLoop::start(
        CameraSession::from_source(Box::new(source)),
        service.clone(),
        &fast(),
        &ServiceConfig::default(),
    );

    let mut display = recognition.subscribe();
    tokio::time::timeout(WAIT, display.wait_for(|d| d.status == STATUS_CAMERA_ERROR))
        .await
        .unwrap()
        .unwrap();

    assert!(recognition.is_stopped());
    recognition.shutdown().await.unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(service.recognize_count(), 0);
}

#[tokio::test]
async fn camera_fault_is_shown_while_polling_continues() {
    let service = Arc::new(FakeService::new().answering(matched("alice", 90)));
    let (source, _released) = FailingSource::new(|| FaceLinkError::Camera("dequeue failed".into()));
    let recognition = RecognitionLoop::start(
        CameraSession::from_source(Box::new(source)),
        service.clone(),
        &fast(),
        &ServiceConfig::default(),
    );

    let mut display = recognition.subscribe();
    tokio::time::timeout(WAIT, display.wait_for(|d| d.status == STATUS_CAMERA_ERROR))
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!recognition.is_stopped());
    assert_eq!(service.recognize_count(), 0);
    recognition.shutdown().await.unwrap();
}

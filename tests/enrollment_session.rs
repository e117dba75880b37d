mod common;

use common::FakeService;
use facelink::camera::{StillSource, SyntheticSource};
use facelink::common::config::EnrollmentConfig;
use facelink::{CameraSession, EnrollmentSession, EnrollmentState, FaceLinkError};
use image::RgbaImage;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn synthetic_session() -> EnrollmentSession {
    let camera = CameraSession::from_source(Box::new(SyntheticSource::new("enroll", 640, 480)));
    EnrollmentSession::new(camera, &EnrollmentConfig::default())
}

fn capture_all(session: &mut EnrollmentSession) {
    for _ in 0..session.max_samples() {
        session.capture().unwrap();
    }
}

#[test]
fn fills_after_five_captures_and_rejects_a_sixth() {
    let mut session = synthetic_session();
    session.set_label("alice");
    assert_eq!(session.state(), EnrollmentState::Empty);

    session.capture().unwrap();
    assert_eq!(session.state(), EnrollmentState::Capturing);
    for _ in 1..5 {
        session.capture().unwrap();
    }
    assert_eq!(session.state(), EnrollmentState::Full);

    let sixth = session.capture();
    assert!(matches!(sixth, Err(FaceLinkError::Rejected(_))));
    assert_eq!(session.samples().len(), 5);
}

#[test]
fn capture_needs_a_label() {
    let mut session = synthetic_session();
    session.set_label("   ");
    assert!(matches!(session.capture(), Err(FaceLinkError::Rejected(_))));
    assert!(session.samples().is_empty());
}

#[test]
fn samples_are_portrait_crops_with_previews() {
    let mut session = synthetic_session();
    session.set_label("alice");
    let sample = session.capture().unwrap().clone();

    assert_eq!(sample.original.decode().unwrap().dimensions(), (240, 320));
    assert_eq!(sample.filtered_view.decode().unwrap().dimensions(), (240, 320));
    assert_ne!(sample.original, sample.filtered_view);
    assert!(sample.original.as_str().starts_with("data:image/jpeg;base64,"));
}

#[test]
fn unready_camera_is_not_fatal() {
    let camera = CameraSession::from_source(Box::new(StillSource::from_image(RgbaImage::new(0, 0))));
    let mut session = EnrollmentSession::new(camera, &EnrollmentConfig::default());
    session.set_label("alice");

    let result = session.capture();
    assert!(matches!(result, Err(FaceLinkError::SourceNotReady)));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(session.state(), EnrollmentState::Empty);
}

#[tokio::test]
async fn submit_sends_originals_in_capture_order() {
    let service = FakeService::new();
    let mut session = synthetic_session();
    session.set_label("alice");
    capture_all(&mut session);
    let originals: Vec<_> = session.samples().iter().map(|s| s.original.clone()).collect();

    session.submit(&service).await.unwrap();
    assert_eq!(session.state(), EnrollmentState::Enrolled);

    let enrolls = service.enrolls.lock().unwrap();
    assert_eq!(enrolls.len(), 1);
    assert_eq!(enrolls[0].0, "alice");
    assert_eq!(enrolls[0].1, originals);
}

#[tokio::test]
async fn submit_before_full_is_rejected_without_a_request() {
    let service = FakeService::new();
    let mut session = synthetic_session();
    session.set_label("alice");
    session.capture().unwrap();

    let result = session.submit(&service).await;
    assert!(matches!(result, Err(FaceLinkError::Rejected(_))));
    assert!(service.enrolls.lock().unwrap().is_empty());
    assert_eq!(session.state(), EnrollmentState::Capturing);
}

#[tokio::test]
async fn failed_submit_keeps_samples_for_retry() {
    let service = FakeService::new();
    service.enroll_failures.store(1, Ordering::SeqCst);
    let mut session = synthetic_session();
    session.set_label("bob");
    capture_all(&mut session);
    let ids: Vec<_> = session.samples().iter().map(|s| s.id.clone()).collect();

    let first = session.submit(&service).await;
    assert!(first.unwrap_err().is_retryable());
    assert_eq!(session.state(), EnrollmentState::Full);
    let kept: Vec<_> = session.samples().iter().map(|s| s.id.clone()).collect();
    assert_eq!(kept, ids);

    session.submit(&service).await.unwrap();
    assert_eq!(session.state(), EnrollmentState::Enrolled);

    let enrolls = service.enrolls.lock().unwrap();
    assert_eq!(enrolls.len(), 2);
    assert_eq!(enrolls[0], enrolls[1]);
}

#[tokio::test]
async fn reset_starts_over() {
    let service = FakeService::new();
    let mut session = synthetic_session();
    session.set_label("carol");
    capture_all(&mut session);
    session.submit(&service).await.unwrap();

    session.reset();
    assert_eq!(session.state(), EnrollmentState::Empty);
    assert!(session.samples().is_empty());
    assert!(session.label().is_empty());
    assert!(session.capture().is_err());
}

#[tokio::test]
async fn abandoned_submit_returns_to_full() {
    let service = FakeService::new();
    service.enroll_hangs.store(true, Ordering::SeqCst);
    let mut session = synthetic_session();
    session.set_label("dave");
    capture_all(&mut session);

    let abandoned = tokio::time::timeout(Duration::from_millis(50), session.submit(&service)).await;
    assert!(abandoned.is_err());
    assert_eq!(session.state(), EnrollmentState::Full);
    assert_eq!(session.samples().len(), 5);

    service.enroll_hangs.store(false, Ordering::SeqCst);
    session.submit(&service).await.unwrap();
    assert_eq!(session.state(), EnrollmentState::Enrolled);
    assert_eq!(service.enrolls.lock().unwrap().len(), 2);
}

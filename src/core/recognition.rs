//! Fixed-interval recognition polling.
//!
//! Each tick samples the camera, crops to the inference size and awaits one
//! recognition request before the next tick can start, so requests never
//! overlap. Results additionally carry a tick sequence number and are only
//! applied if newer than what is displayed and the loop is still running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::CameraSession;
use crate::common::config::{RecognitionConfig, ServiceConfig};
use crate::common::{FaceLinkError, Result};
use crate::core::crop::AspectCropper;
use crate::core::frame::EncodedImage;
use crate::service::protocol::RecognitionResult;
use crate::service::RecognitionService;

pub const LABEL_WAITING: &str = "WAITING FOR TRAIN";
pub const LABEL_SEARCHING: &str = "SEARCHING";
pub const STATUS_CONNECTING: &str = "CONNECTING TO CORE...";
pub const STATUS_CONFIRMED: &str = "IDENTITY CONFIRMED";
pub const STATUS_SCANNING: &str = "SCANNING FACES...";
pub const STATUS_AWAITING_TRAIN: &str = "AWAITING GLOBAL TRAIN";
pub const STATUS_CONNECTION_LOST: &str = "CONNECTION LOST";
pub const STATUS_FEED_ACTIVE: &str = "VIDEO FEED ACTIVE";
pub const STATUS_CAMERA_ERROR: &str = "CAMERA ERROR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionDisplay {
    pub model_ready: bool,
    pub matched: bool,
    pub confidence: u8,
    pub label: String,
    pub status: String,
    /// Tick that produced this state; 0 before any result.
    pub sequence: u64,
}

impl Default for RecognitionDisplay {
    fn default() -> Self {
        Self {
            model_ready: true,
            matched: false,
            confidence: 0,
            label: LABEL_SEARCHING.to_string(),
            status: STATUS_CONNECTING.to_string(),
            sequence: 0,
        }
    }
}

impl RecognitionDisplay {
    /// Fold one tick's outcome into the display state.
    pub fn reduce(&self, sequence: u64, outcome: &Result<RecognitionResult>) -> Self {
        match outcome {
            Ok(result) if !result.model_ready => Self {
                model_ready: false,
                matched: false,
                confidence: 0,
                label: LABEL_WAITING.to_string(),
                status: STATUS_AWAITING_TRAIN.to_string(),
                sequence,
            },
            Ok(result) => Self {
                model_ready: true,
                matched: result.matched,
                confidence: result.confidence,
                label: if result.matched { result.subject_label.clone() } else { LABEL_SEARCHING.to_string() },
                status: if result.matched { STATUS_CONFIRMED } else { STATUS_SCANNING }.to_string(),
                sequence,
            },
            Err(_) => Self {
                status: STATUS_CONNECTION_LOST.to_string(),
                sequence,
                ..self.clone()
            },
        }
    }
}

/// Handle on a running polling loop.
pub struct RecognitionLoop {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    display: watch::Receiver<RecognitionDisplay>,
}

impl RecognitionLoop {
    /// Start polling on the current runtime. The loop owns `camera` and
    /// releases it when stopped.
    pub fn start<S: RecognitionService>(
        camera: CameraSession,
        service: Arc<S>,
        recognition: &RecognitionConfig,
        service_config: &ServiceConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (display_tx, display) = watch::channel(RecognitionDisplay::default());
        let settings = LoopSettings {
            interval: Duration::from_millis(recognition.interval_ms),
            request_timeout: Duration::from_millis(service_config.request_timeout_ms),
            cropper: AspectCropper::new(recognition.frame_width, recognition.frame_height),
            quality: recognition.quality,
        };

        let handle = tokio::spawn(polling_loop(camera, service, settings, display_tx, cancel.clone()));
        info!("Recognition loop started ({}ms interval)", recognition.interval_ms);

        Self { cancel, handle: Some(handle), display }
    }

    /// Subscribe to display state changes.
    pub fn subscribe(&self) -> watch::Receiver<RecognitionDisplay> {
        self.display.clone()
    }

    pub fn snapshot(&self) -> RecognitionDisplay {
        self.display.borrow().clone()
    }

    /// Stop ticking and abandon any in-flight request. No result is applied
    /// after this returns. The loop also stops itself when camera access is denied.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait until the loop has released the camera.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| FaceLinkError::Other(anyhow::anyhow!("recognition loop failed to join: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for RecognitionLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct LoopSettings {
    interval: Duration,
    request_timeout: Duration,
    cropper: AspectCropper,
    quality: u8,
}

async fn polling_loop<S: RecognitionService>(
    camera: CameraSession,
    service: Arc<S>,
    settings: LoopSettings,
    display: watch::Sender<RecognitionDisplay>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut camera = Some(camera);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(mut session) = camera.take() else { break };
        if !session.is_ready() {
            debug!("Tick skipped: video source not ready");
            camera = Some(session);
            continue;
        }

        let cropper = settings.cropper;
        let quality = settings.quality;
        let sampled = tokio::task::spawn_blocking(move || {
            let encoded = session
                .sample_cropped(&cropper)
                .and_then(|frame| EncodedImage::encode(&frame, quality));
            (session, encoded)
        });

        // Sampling is bounded local work; wait for it even when stopping so
        // the session comes back and is released here.
        let (session, encoded) = match sampled.await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Frame sampling worker failed, stopping loop: {}", e);
                break;
            }
        };
        camera = Some(session);
        if cancel.is_cancelled() {
            break;
        }

        let image = match encoded {
            Ok(image) => image,
            Err(FaceLinkError::SourceNotReady) => {
                debug!("Tick skipped: frame has no dimensions yet");
                continue;
            }
            Err(e @ FaceLinkError::PermissionDenied(_)) => {
                error!("Camera access lost, stopping recognition: {}", e);
                set_status(&display, &cancel, STATUS_CAMERA_ERROR);
                cancel.cancel();
                break;
            }
            Err(e) => {
                warn!("Frame capture failed: {}", e);
                set_status(&display, &cancel, STATUS_CAMERA_ERROR);
                continue;
            }
        };
        mark_feed_active(&display, &cancel);

        sequence += 1;
        let request = tokio::time::timeout(settings.request_timeout, service.recognize(&image));
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = request => match outcome {
                Ok(result) => result,
                Err(_) => Err(FaceLinkError::Transport(format!(
                    "recognition timed out after {:?}", settings.request_timeout
                ))),
            },
        };

        if let Err(e) = &outcome {
            debug!("Recognition tick {} failed: {}", sequence, e);
        }
        apply(&display, &cancel, sequence, &outcome);
    }

    if let Some(mut session) = camera.take() {
        session.release();
    }
    info!("Recognition loop stopped after {} requests", sequence);
}

/// Publish a tick's outcome unless the loop was stopped or a newer tick
/// already updated the display.
fn apply(
    display: &watch::Sender<RecognitionDisplay>,
    cancel: &CancellationToken,
    sequence: u64,
    outcome: &Result<RecognitionResult>,
) -> bool {
    display.send_if_modified(|current| {
        if cancel.is_cancelled() || sequence <= current.sequence {
            return false;
        }
        *current = current.reduce(sequence, outcome);
        true
    })
}

/// Replace the status line without touching the recognition fields.
fn set_status(display: &watch::Sender<RecognitionDisplay>, cancel: &CancellationToken, status: &str) -> bool {
    display.send_if_modified(|current| {
        if cancel.is_cancelled() || current.status == status {
            return false;
        }
        current.status = status.to_string();
        true
    })
}

/// Frames are flowing again: leave the connecting or camera-error status.
/// Statuses produced by recognition results are kept.
fn mark_feed_active(display: &watch::Sender<RecognitionDisplay>, cancel: &CancellationToken) -> bool {
    let waiting = {
        let current = display.borrow();
        current.status == STATUS_CONNECTING || current.status == STATUS_CAMERA_ERROR
    };
    waiting && set_status(display, cancel, STATUS_FEED_ACTIVE)
}

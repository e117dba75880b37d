use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::camera::CameraSession;
use crate::common::config::EnrollmentConfig;
use crate::common::{FaceLinkError, Result};
use crate::core::crop::AspectCropper;
use crate::core::frame::EncodedImage;
use crate::core::texture;
use crate::service::RecognitionService;

/// One captured sample and its texture preview. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSample {
    pub id: String,
    pub original: EncodedImage,
    pub filtered_view: EncodedImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    Empty,
    Capturing,
    Full,
    /// Held only while a `submit` future runs. That future borrows the session
    /// mutably, so other callers never observe this state; a submit that is
    /// dropped mid-request puts the session back to `Full`.
    Submitting,
    Enrolled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Submitting,
    Enrolled,
}

/// Marks a submit in flight and falls back to collecting if the submit
/// future is dropped before it finishes.
struct SubmitGuard<'a> {
    phase: &'a mut Phase,
}

impl<'a> SubmitGuard<'a> {
    fn enter(phase: &'a mut Phase) -> Self {
        *phase = Phase::Submitting;
        Self { phase }
    }

    fn finish(self, outcome: Phase) {
        *self.phase = outcome;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if *self.phase == Phase::Submitting {
            *self.phase = Phase::Collecting;
        }
    }
}

/// Bounded multi-sample capture for one subject. Owns its camera.
pub struct EnrollmentSession {
    camera: CameraSession,
    cropper: AspectCropper,
    config: EnrollmentConfig,
    label: String,
    samples: Vec<CapturedSample>,
    phase: Phase,
}

impl EnrollmentSession {
    pub fn new(camera: CameraSession, config: &EnrollmentConfig) -> Self {
        Self {
            camera,
            cropper: AspectCropper::new(config.capture_width, config.capture_height),
            config: config.clone(),
            label: String::new(),
            samples: Vec::with_capacity(config.max_samples),
            phase: Phase::Collecting,
        }
    }

    pub fn state(&self) -> EnrollmentState {
        match self.phase {
            Phase::Submitting => EnrollmentState::Submitting,
            Phase::Enrolled => EnrollmentState::Enrolled,
            Phase::Collecting if self.samples.is_empty() => EnrollmentState::Empty,
            Phase::Collecting if self.samples.len() < self.config.max_samples => EnrollmentState::Capturing,
            Phase::Collecting => EnrollmentState::Full,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.trim().to_string();
    }

    pub fn samples(&self) -> &[CapturedSample] {
        &self.samples
    }

    pub fn max_samples(&self) -> usize {
        self.config.max_samples
    }

    pub fn camera_mut(&mut self) -> &mut CameraSession {
        &mut self.camera
    }

    /// Sample the camera, crop to the portrait capture size and append the
    /// sample with its texture preview.
    pub fn capture(&mut self) -> Result<&CapturedSample> {
        if self.label.is_empty() {
            return Err(FaceLinkError::Rejected("subject label is not set".into()));
        }
        match self.state() {
            EnrollmentState::Empty | EnrollmentState::Capturing => {}
            other => {
                return Err(FaceLinkError::Rejected(format!("cannot capture while {:?}", other)));
            }
        }

        let cropped = self.camera.sample_cropped(&self.cropper)?;
        let original = EncodedImage::encode(&cropped, self.config.original_quality)?;
        let filtered_view = texture::visualize(&cropped, self.config.filtered_quality)?;

        self.samples.push(CapturedSample {
            id: Uuid::new_v4().to_string(),
            original,
            filtered_view,
        });
        debug!("Captured sample {}/{} for {}", self.samples.len(), self.config.max_samples, self.label);

        Ok(&self.samples[self.samples.len() - 1])
    }

    /// Send the ordered originals to the service. On failure every sample is
    /// kept and the session stays `Full`, so the call can be retried.
    pub async fn submit<S: RecognitionService>(&mut self, service: &S) -> Result<()> {
        if self.state() != EnrollmentState::Full {
            return Err(FaceLinkError::Rejected(format!(
                "submit requires {} samples, have {}", self.config.max_samples, self.samples.len()
            )));
        }

        let originals: Vec<EncodedImage> = self.samples.iter().map(|s| s.original.clone()).collect();
        let guard = SubmitGuard::enter(&mut self.phase);
        match service.enroll(&self.label, &originals).await {
            Ok(()) => {
                guard.finish(Phase::Enrolled);
                info!("Enrollment for {} accepted", self.label);
                Ok(())
            }
            Err(e) => {
                guard.finish(Phase::Collecting);
                warn!("Enrollment for {} failed, keeping {} samples: {}", self.label, self.samples.len(), e);
                Err(e)
            }
        }
    }

    /// Drop every sample and the label.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.label.clear();
        self.phase = Phase::Collecting;
    }
}

// Core modules
pub mod core;
pub mod camera;
pub mod service;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use common::{Config, FaceLinkError, Result};
pub use core::{
    AspectCropper, CapturedSample, EncodedImage, EnrollmentSession, EnrollmentState, Frame,
    HighlightTracker, HistogramBin, LiveUpdateReconciler, RecognitionDisplay, RecognitionLoop,
    RosterSnapshot,
};
pub use camera::{CameraSession, FacingMode, FrameSource};
pub use service::{RecognitionService, ServiceClient, protocol};

pub mod crop;
pub mod enrollment;
pub mod frame;
pub mod highlight;
pub mod histogram;
pub mod recognition;
pub mod roster;
pub mod texture;

pub use crop::{AspectCropper, CropRect};
pub use enrollment::{CapturedSample, EnrollmentSession, EnrollmentState};
pub use frame::{EncodedImage, Frame};
pub use highlight::HighlightTracker;
pub use histogram::HistogramBin;
pub use recognition::{RecognitionDisplay, RecognitionLoop};
pub use roster::{LiveUpdateReconciler, RosterSnapshot, RosterView};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceLinkError {
    /// The video source has not produced a frame with real dimensions yet.
    #[error("Source not ready")]
    SourceNotReady,

    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Decode failure: {0}")]
    Decode(String),

    /// An operation was called in a session state that does not allow it.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceLinkError {
    /// Errors the next poll or refresh cycle is expected to recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaceLinkError::SourceNotReady | FaceLinkError::Transport(_))
    }
}

impl From<reqwest::Error> for FaceLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FaceLinkError::Transport(format!("request timed out: {}", err))
        } else {
            FaceLinkError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FaceLinkError {
    fn from(err: serde_json::Error) -> Self {
        FaceLinkError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaceLinkError>;

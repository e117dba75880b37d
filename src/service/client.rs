use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, info};

use crate::common::config::ServiceConfig;
use crate::common::{FaceLinkError, Result};
use crate::core::frame::EncodedImage;
use crate::service::protocol::{
    EnrollRequest, RecognitionResult, RecognizeRequest, RecognizeResponse, RosterEntry,
};

/// The remote enrollment/recognition service as seen by sessions and loops.
pub trait RecognitionService: Send + Sync + 'static {
    /// Submit an ordered sample set for `name`.
    fn enroll(&self, name: &str, images: &[EncodedImage]) -> impl Future<Output = Result<()>> + Send;

    /// Ask the service to retrain its global model.
    fn train(&self) -> impl Future<Output = Result<()>> + Send;

    fn recognize(&self, image: &EncodedImage) -> impl Future<Output = Result<RecognitionResult>> + Send;

    /// Full roster snapshot.
    fn users(&self) -> impl Future<Output = Result<Vec<RosterEntry>>> + Send;
}

/// HTTP client for the service. Every request carries the configured timeout.
#[derive(Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| FaceLinkError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// True when the service answers its root endpoint with a 2xx.
    pub async fn health(&self) -> bool {
        match self.http.get(self.url("/")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FaceLinkError::Transport(format!("{} rejected with HTTP {}", what, status)))
    }
}

impl RecognitionService for ServiceClient {
    async fn enroll(&self, name: &str, images: &[EncodedImage]) -> Result<()> {
        let request = EnrollRequest { name, images: images.iter().collect() };
        let response = self.http.post(self.url("/enroll")).json(&request).send().await?;
        check_status(response, "Enrollment")?;
        info!("Enrolled {} with {} samples", name, images.len());
        Ok(())
    }

    async fn train(&self) -> Result<()> {
        let response = self.http.post(self.url("/train")).send().await?;
        check_status(response, "Training request")?;
        info!("Training request accepted");
        Ok(())
    }

    async fn recognize(&self, image: &EncodedImage) -> Result<RecognitionResult> {
        let response = self
            .http
            .post(self.url("/recognize"))
            .json(&RecognizeRequest { image })
            .send()
            .await?;
        let body: RecognizeResponse = check_status(response, "Recognition")?.json().await?;
        Ok(body.into())
    }

    async fn users(&self) -> Result<Vec<RosterEntry>> {
        let response = self.http.get(self.url("/users")).send().await?;
        let entries: Vec<RosterEntry> = check_status(response, "Roster fetch")?.json().await?;
        debug!("Fetched roster with {} entries", entries.len());
        Ok(entries)
    }
}

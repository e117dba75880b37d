use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::config::{RosterConfig, ServiceConfig};
use crate::common::{FaceLinkError, Result};
use crate::core::crop::AspectCropper;
use crate::core::frame::EncodedImage;
use crate::core::highlight::HighlightTracker;
use crate::core::histogram::{self, HistogramBin};
use crate::core::texture;
use crate::service::protocol::{RosterEntry, UpdateEvent};
use crate::service::RecognitionService;

pub const STATUS_UPDATING: &str = "<< UPDATING >>";
pub const STATUS_SYNCED: &str = "SYNCED";

/// Display visuals derived from an entry's thumbnail.
#[derive(Debug, Clone)]
pub struct EntryVisuals {
    pub texture: EncodedImage,
    pub histogram: Vec<HistogramBin>,
}

#[derive(Debug, Clone)]
pub struct RosterView {
    pub entry: RosterEntry,
    /// `None` when the entry has no thumbnail or its visuals failed.
    pub visuals: Option<EntryVisuals>,
}

/// Whole roster as of the last completed refresh.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub entries: Vec<RosterView>,
    pub loading: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u64,
}

impl Default for RosterSnapshot {
    fn default() -> Self {
        Self { entries: Vec::new(), loading: true, refreshed_at: None, refresh_count: 0 }
    }
}

impl RosterSnapshot {
    pub fn find(&self, name: &str) -> Option<&RosterView> {
        self.entries.iter().find(|view| view.entry.name == name)
    }
}

#[derive(Clone, Copy)]
struct RefreshSettings {
    cropper: AspectCropper,
    timeout: Duration,
}

/// Keeps a roster snapshot in sync with push events and drives highlights.
pub struct LiveUpdateReconciler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    roster: watch::Receiver<RosterSnapshot>,
    highlights: HighlightTracker,
    refresh_requests: Arc<Notify>,
}

impl LiveUpdateReconciler {
    /// Mount: refresh once immediately, then on every event from `events`.
    pub fn start<S: RecognitionService>(
        service: Arc<S>,
        events: mpsc::Receiver<UpdateEvent>,
        roster_config: &RosterConfig,
        service_config: &ServiceConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (roster_tx, roster) = watch::channel(RosterSnapshot::default());
        let highlights = HighlightTracker::new(Duration::from_millis(roster_config.highlight_ms));
        let refresh_requests = Arc::new(Notify::new());
        let settings = RefreshSettings {
            cropper: AspectCropper::new(roster_config.thumb_width, roster_config.thumb_height),
            timeout: Duration::from_millis(service_config.request_timeout_ms),
        };

        let handle = tokio::spawn(reconcile_loop(
            service,
            events,
            Arc::new(roster_tx),
            highlights.clone(),
            refresh_requests.clone(),
            settings,
            cancel.clone(),
        ));

        Self { cancel, handle: Some(handle), roster, highlights, refresh_requests }
    }

    pub fn subscribe(&self) -> watch::Receiver<RosterSnapshot> {
        self.roster.clone()
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        self.roster.borrow().clone()
    }

    pub fn highlights(&self) -> &HighlightTracker {
        &self.highlights
    }

    pub fn status_of(&self, name: &str) -> &'static str {
        if self.highlights.is_highlighted(name) { STATUS_UPDATING } else { STATUS_SYNCED }
    }

    /// Pull a fresh roster without waiting for a push event.
    pub fn request_refresh(&self) {
        self.refresh_requests.notify_one();
    }

    /// Unmount: stop consuming events, abandon refreshes and clear highlights.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| FaceLinkError::Other(anyhow::anyhow!("reconciler failed to join: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for LiveUpdateReconciler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn reconcile_loop<S: RecognitionService>(
    service: Arc<S>,
    mut events: mpsc::Receiver<UpdateEvent>,
    roster: Arc<watch::Sender<RosterSnapshot>>,
    highlights: HighlightTracker,
    refresh_requests: Arc<Notify>,
    settings: RefreshSettings,
    cancel: CancellationToken,
) {
    let mut refreshes = JoinSet::new();
    refreshes.spawn(refresh(service.clone(), roster.clone(), settings));
    let mut events_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    debug!("Update event {:?}", event);
                    if let Some(subject) = &event.subject {
                        highlights.mark(subject);
                    }
                    refreshes.spawn(refresh(service.clone(), roster.clone(), settings));
                }
                None => {
                    info!("Update event stream ended; roster refresh still available on request");
                    events_open = false;
                }
            },
            _ = refresh_requests.notified() => {
                refreshes.spawn(refresh(service.clone(), roster.clone(), settings));
            }
            Some(joined) = refreshes.join_next(), if !refreshes.is_empty() => {
                if let Err(e) = joined {
                    warn!("Roster refresh task failed: {}", e);
                }
            }
        }
    }

    refreshes.abort_all();
    highlights.clear();
    info!("Live update reconciler stopped");
}

/// Fetch the roster, derive per-entry visuals and publish the whole snapshot.
/// Overlapping refreshes publish in completion order.
async fn refresh<S: RecognitionService>(
    service: Arc<S>,
    roster: Arc<watch::Sender<RosterSnapshot>>,
    settings: RefreshSettings,
) {
    let entries = match tokio::time::timeout(settings.timeout, service.users()).await {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            error!("Failed to fetch roster: {}", e);
            roster.send_if_modified(|snapshot| std::mem::replace(&mut snapshot.loading, false));
            return;
        }
        Err(_) => {
            error!("Roster fetch timed out after {:?}", settings.timeout);
            roster.send_if_modified(|snapshot| std::mem::replace(&mut snapshot.loading, false));
            return;
        }
    };

    let mut views = Vec::with_capacity(entries.len());
    for entry in entries {
        let visuals = match &entry.thumbnail {
            Some(thumbnail) => derive_visuals(&entry.name, thumbnail, settings.cropper).await,
            None => None,
        };
        views.push(RosterView { entry, visuals });
    }

    roster.send_modify(|snapshot| {
        snapshot.refresh_count += 1;
        snapshot.entries = views;
        snapshot.loading = false;
        snapshot.refreshed_at = Some(Utc::now());
        debug!("Roster refresh {} published {} entries", snapshot.refresh_count, snapshot.entries.len());
    });
}

async fn derive_visuals(name: &str, thumbnail: &EncodedImage, cropper: AspectCropper) -> Option<EntryVisuals> {
    let source = thumbnail.clone();
    // One decode feeds both the texture view and the histogram.
    let visuals = tokio::task::spawn_blocking(move || {
        let image = source.decode()?;
        let texture = texture::visualize_frame(&image, &cropper)?;
        Ok::<_, FaceLinkError>(EntryVisuals { texture, histogram: histogram::histogram_of(&image) })
    })
    .await;

    match visuals {
        Ok(Ok(visuals)) => Some(visuals),
        Ok(Err(e)) => {
            warn!("No visuals for {}: {}", name, e);
            None
        }
        Err(e) => {
            warn!("Visual worker for {} failed: {}", name, e);
            None
        }
    }
}

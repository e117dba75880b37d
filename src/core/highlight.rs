use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct Entries {
    expiries: HashMap<String, Instant>,
    timers: HashMap<String, JoinHandle<()>>,
}

/// Self-expiring per-label highlights. A label is highlighted while
/// `now < expiry`; marking it again moves the expiry and replaces its timer.
#[derive(Clone)]
pub struct HighlightTracker {
    hold: Duration,
    entries: Arc<Mutex<Entries>>,
    active: Arc<watch::Sender<BTreeSet<String>>>,
}

impl HighlightTracker {
    pub fn new(hold: Duration) -> Self {
        let (active, _) = watch::channel(BTreeSet::new());
        Self {
            hold,
            entries: Arc::new(Mutex::new(Entries::default())),
            active: Arc::new(active),
        }
    }

    /// Highlight `label` until `now + hold`. Must run inside a tokio runtime.
    pub fn mark(&self, label: &str) {
        let expiry = Instant::now() + self.hold;
        let mut entries = self.lock();

        if let Some(previous) = entries.timers.remove(label) {
            previous.abort();
        }
        entries.expiries.insert(label.to_string(), expiry);

        let tracker = self.clone();
        let owned = label.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(expiry).await;
            tracker.expire(&owned, expiry);
        });
        entries.timers.insert(label.to_string(), timer);

        self.publish(&entries);
        debug!("Highlighting {} for {:?}", label, self.hold);
    }

    pub fn is_highlighted(&self, label: &str) -> bool {
        self.lock()
            .expiries
            .get(label)
            .is_some_and(|expiry| Instant::now() < *expiry)
    }

    pub fn expiry(&self, label: &str) -> Option<Instant> {
        self.lock().expiries.get(label).copied()
    }

    /// Labels currently highlighted.
    pub fn active(&self) -> BTreeSet<String> {
        let now = Instant::now();
        self.lock()
            .expiries
            .iter()
            .filter(|(_, expiry)| now < **expiry)
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Number of armed expiry timers, one per highlighted label at most.
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.values().filter(|t| !t.is_finished()).count()
    }

    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<String>> {
        self.active.subscribe()
    }

    /// Cancel every timer and drop every highlight.
    pub fn clear(&self) {
        let mut entries = self.lock();
        for (_, timer) in entries.timers.drain() {
            timer.abort();
        }
        entries.expiries.clear();
        self.publish(&entries);
    }

    fn expire(&self, label: &str, expiry: Instant) {
        let mut entries = self.lock();
        // A newer mark owns the label now.
        if entries.expiries.get(label) != Some(&expiry) {
            return;
        }
        entries.expiries.remove(label);
        entries.timers.remove(label);
        self.publish(&entries);
        debug!("Highlight for {} expired", label);
    }

    fn publish(&self, entries: &Entries) {
        let labels: BTreeSet<String> = entries.expiries.keys().cloned().collect();
        self.active.send_if_modified(|current| {
            if *current == labels {
                return false;
            }
            *current = labels;
            true
        });
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries stay consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

use std::time::Duration;

use tracing::{debug, info};

use shiori_detect::{detect_site, PageSnapshot, SiteDatabase};

use crate::coordinator::Handle;
use crate::models::DetectionRecord;

/// Read-only access to the current page's rendered state.
///
/// Implemented by the embedding bridge in production; tests use canned
/// snapshots.
pub trait PageObserver: Send {
    /// Snapshot the page, or `None` when no observable page is open.
    fn observe(&mut self) -> Option<PageSnapshot>;
}

/// Timer-driven poller that detects watch state and suppresses duplicate
/// emissions.
pub struct DetectionLoop<O: PageObserver> {
    observer: O,
    sites: SiteDatabase,
    last_emitted: Option<(String, u32, bool)>,
}

impl<O: PageObserver> DetectionLoop<O> {
    pub fn new(observer: O, sites: SiteDatabase) -> Self {
        Self {
            observer,
            sites,
            last_emitted: None,
        }
    }

    /// Run one detection pass.
    ///
    /// Emits a record only when the `(title, episode, completed)` key differs
    /// from the previous emission. An unsupported page or a failed extraction
    /// emits nothing and leaves the previous key untouched, so the same
    /// episode is not re-emitted when the page recovers.
    pub fn tick(&mut self) -> Option<DetectionRecord> {
        let snapshot = self.observer.observe()?;
        let detection = detect_site(&snapshot, &self.sites)?;
        let record = DetectionRecord::from_detection(detection);

        let key = record.dedup_key();
        if self
            .last_emitted
            .as_ref()
            .map(|(t, e, c)| (t.as_str(), *e, *c))
            == Some(key)
        {
            return None;
        }
        self.last_emitted = Some((key.0.to_string(), key.1, key.2));

        debug!(
            title = %record.title,
            episode = record.episode,
            completed = record.completed,
            "detection changed"
        );
        Some(record)
    }

    /// Poll on a fixed interval, forwarding each emission to the coordinator.
    ///
    /// Runs until the coordinator goes away.
    pub async fn run(mut self, handle: Handle, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Some(record) = self.tick() {
                if handle.record_detection(record).await.is_err() {
                    info!("coordinator unavailable, stopping detection loop");
                    return;
                }
            }
        }
    }
}

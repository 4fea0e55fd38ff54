use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shiori_detect::{SiteDetection, Source};

/// The unit of inferred watch state, as held and broadcast by the
/// coordinator.
///
/// Only ever constructed from a [`SiteDetection`], so the title is never
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Site the detection came from.
    pub source: Source,
    /// Show title as scraped.
    pub title: String,
    /// Episode number; 0 is the "unknown" sentinel.
    pub episode: u32,
    /// Whether local playback indicates the episode reached its end.
    pub completed: bool,
    /// When the observation was captured.
    pub observed_at: DateTime<Utc>,
}

impl DetectionRecord {
    /// Build a record from a raw site detection, stamping the capture time.
    pub fn from_detection(detection: SiteDetection) -> Self {
        Self {
            source: detection.source,
            title: detection.title,
            episode: detection.episode,
            completed: detection.completed,
            observed_at: Utc::now(),
        }
    }

    /// Identity used to suppress duplicate emissions.
    ///
    /// `completed` is part of the key: a completion flip with an otherwise
    /// unchanged episode still propagates.
    pub fn dedup_key(&self) -> (&str, u32, bool) {
        (&self.title, self.episode, self.completed)
    }
}

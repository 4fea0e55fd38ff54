pub mod classifier;
pub mod episode;
pub mod playback;
pub mod site;

use serde::{Deserialize, Serialize};

pub use playback::{playback_completed, COMPLETION_THRESHOLD};
pub use site::{EpisodeFallback, SiteDatabase, SiteDef};

/// Supported streaming sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Crunchyroll,
    Netflix,
    Anicrush,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crunchyroll => "crunchyroll",
            Self::Netflix => "netflix",
            Self::Anicrush => "anicrush",
        }
    }
}

/// Text captured from one page element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementText {
    /// Selector the text was captured from.
    pub selector: String,
    /// Rendered text content.
    pub text: String,
}

/// Playback state of one media element on the page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaPlayback {
    /// Current position in seconds.
    pub position: f64,
    /// Total duration in seconds.
    pub duration: f64,
}

/// One observation of a rendered page, as shipped by the embedding bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Host name of the page (e.g., "www.crunchyroll.com").
    pub host: String,
    /// The document title, if any.
    pub page_title: Option<String>,
    /// Captured element texts, in capture order.
    #[serde(default)]
    pub elements: Vec<ElementText>,
    /// Playback state of all media elements on the page.
    #[serde(default)]
    pub media: Vec<MediaPlayback>,
}

impl PageSnapshot {
    /// First non-empty trimmed text captured for `selector`.
    pub fn text_of(&self, selector: &str) -> Option<&str> {
        self.elements.iter().find_map(|e| {
            if e.selector != selector {
                return None;
            }
            let text = e.text.trim();
            (!text.is_empty()).then_some(text)
        })
    }
}

/// A successful per-site detection. `title` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDetection {
    pub source: Source,
    pub title: String,
    /// Episode number; 0 is the "unknown" sentinel.
    pub episode: u32,
    /// Whether playback indicates the episode has reached its end.
    pub completed: bool,
}

/// Detect the anime being watched on the page, if any.
///
/// Resolves the site by host, extracts title and episode through the site's
/// prioritized selector lists (or its document-title pattern), and gates
/// general-purpose catalogs behind the title classifier. Every extraction
/// failure is reported as `None`; a detection always carries a non-empty
/// title.
pub fn detect_site(snapshot: &PageSnapshot, db: &SiteDatabase) -> Option<SiteDetection> {
    let idx = db.match_host(&snapshot.host)?;
    let def = db.site(idx)?;

    let (title, episode) = if def.page_title_pattern.is_some() {
        let page_title = snapshot.page_title.as_deref()?;
        let (title, raw_episode) = db.capture_page_title(idx, page_title)?;
        let episode = raw_episode
            .as_deref()
            .and_then(episode::extract)
            .unwrap_or_else(|| def.missing_episode.episode());
        (title, episode)
    } else {
        let title = def
            .title_selectors
            .iter()
            .find_map(|s| snapshot.text_of(s))?
            .to_string();
        let episode = def
            .episode_selectors
            .iter()
            .find_map(|s| snapshot.text_of(s))
            .and_then(episode::extract)
            .unwrap_or_else(|| def.missing_episode.episode());
        (title, episode)
    };

    if def.requires_classifier && !classifier::is_anime_title(&title) {
        tracing::debug!(site = %def.name, title = %title, "classifier rejected title");
        return None;
    }

    Some(SiteDetection {
        source: def.source,
        title,
        episode,
        completed: playback::playback_completed(&snapshot.media),
    })
}

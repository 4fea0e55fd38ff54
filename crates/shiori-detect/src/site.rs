use serde::{Deserialize, Serialize};

use crate::Source;

/// Embedded site database.
const EMBEDDED_DB: &str = include_str!("../data/sites.toml");

/// Definition of a streaming site and how to scrape it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDef {
    /// Display name (e.g., "Crunchyroll").
    pub name: String,
    /// Site identifier carried on every detection.
    pub source: Source,
    /// Regex patterns matched against the page host.
    #[serde(default)]
    pub host_patterns: Vec<String>,
    /// Candidate selectors for the show title, in priority order.
    #[serde(default)]
    pub title_selectors: Vec<String>,
    /// Candidate selectors for the episode text, in priority order.
    #[serde(default)]
    pub episode_selectors: Vec<String>,
    /// Regex over the document title; capture 1 is the show title,
    /// capture 2 (optional) the episode text. Used instead of selectors.
    #[serde(default)]
    pub page_title_pattern: Option<String>,
    /// Episode value reported when no episode text parses.
    #[serde(default)]
    pub missing_episode: EpisodeFallback,
    /// Whether detections must pass the anime-title classifier.
    #[serde(default)]
    pub requires_classifier: bool,
    /// Whether this site is enabled for detection.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Episode value to use when the page yields no parsable episode text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeFallback {
    /// Report the 0 "unknown" sentinel.
    #[default]
    Unknown,
    /// The site's convention implies a single episode; report 1.
    SingleImplied,
}

impl EpisodeFallback {
    pub fn episode(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::SingleImplied => 1,
        }
    }
}

/// Wrapper for TOML deserialization.
#[derive(Debug, Deserialize)]
struct SiteDbFile {
    #[serde(rename = "site")]
    sites: Vec<SiteDef>,
}

/// Database of known streaming sites.
#[derive(Debug, Clone)]
pub struct SiteDatabase {
    sites: Vec<SiteDef>,
    compiled_host: Vec<Vec<regex::Regex>>,
    compiled_page_title: Vec<Option<regex::Regex>>,
}

impl SiteDatabase {
    /// Load the embedded site database.
    pub fn embedded() -> Self {
        Self::from_toml(EMBEDDED_DB).expect("embedded sites.toml should be valid")
    }

    /// Load a site database from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let db: SiteDbFile = toml::from_str(toml_str)?;
        let compiled_host = db
            .sites
            .iter()
            .map(|s| {
                s.host_patterns
                    .iter()
                    .filter_map(|p| regex::Regex::new(p).ok())
                    .collect()
            })
            .collect();
        let compiled_page_title = db
            .sites
            .iter()
            .map(|s| {
                s.page_title_pattern
                    .as_deref()
                    .and_then(|p| regex::Regex::new(p).ok())
            })
            .collect();
        Ok(Self {
            sites: db.sites,
            compiled_host,
            compiled_page_title,
        })
    }

    /// Merge a user database into this one.
    /// Sites with matching names are replaced; new sites are appended.
    pub fn merge_user(&mut self, user_db: &SiteDatabase) {
        for (i, user_site) in user_db.sites.iter().enumerate() {
            if let Some(pos) = self.sites.iter().position(|s| s.name == user_site.name) {
                self.sites[pos] = user_site.clone();
                self.compiled_host[pos] = user_db.compiled_host[i].clone();
                self.compiled_page_title[pos] = user_db.compiled_page_title[i].clone();
            } else {
                self.sites.push(user_site.clone());
                self.compiled_host.push(user_db.compiled_host[i].clone());
                self.compiled_page_title
                    .push(user_db.compiled_page_title[i].clone());
            }
        }
    }

    /// Find the first enabled site whose host patterns match.
    pub fn match_host(&self, host: &str) -> Option<usize> {
        self.sites.iter().enumerate().find_map(|(i, s)| {
            if s.enabled && self.compiled_host[i].iter().any(|re| re.is_match(host)) {
                Some(i)
            } else {
                None
            }
        })
    }

    /// Get the site definition at `index`.
    pub fn site(&self, index: usize) -> Option<&SiteDef> {
        self.sites.get(index)
    }

    /// Apply the site's document-title pattern, returning the captured show
    /// title and raw episode text. `None` if the site has no pattern, the
    /// pattern does not match, or the captured title is empty.
    pub fn capture_page_title(
        &self,
        index: usize,
        page_title: &str,
    ) -> Option<(String, Option<String>)> {
        let re = self.compiled_page_title.get(index)?.as_ref()?;
        let caps = re.captures(page_title)?;
        let title = caps.get(1)?.as_str().trim().to_string();
        if title.is_empty() {
            return None;
        }
        let episode = caps.get(2).map(|m| m.as_str().to_string());
        Some((title, episode))
    }

    /// Number of site definitions.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

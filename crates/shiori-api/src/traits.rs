//! Trait definitions for the remote list-tracking service.
//!
//! The sync coordinator is written against this seam; the MAL client
//! implements it, and tests substitute scripted fakes.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Bearer credential for an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque access token, sent as a Bearer header.
    pub access_token: String,
    /// User-visible account name.
    pub display_name: String,
}

/// List status pushed on a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Watching,
    Completed,
}

impl WatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Completed => "completed",
        }
    }
}

/// A search result from the service's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeSearchResult {
    pub service_id: u64,
    pub title: String,
    pub title_english: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub episodes: Option<u32>,
}

/// A remote list-tracking service.
///
/// The credential is passed per call rather than held by the client: the
/// coordinator owns it and hands each operation a snapshot taken at call
/// start.
pub trait TrackerService: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run the service's interactive authorization flow.
    fn authenticate(&self) -> impl Future<Output = Result<Credential, Self::Error>> + Send;

    /// Search the catalog by title.
    fn search_anime(
        &self,
        credential: &Credential,
        query: &str,
    ) -> impl Future<Output = Result<Vec<AnimeSearchResult>, Self::Error>> + Send;

    /// Set status and watched-episode count on the user's list entry.
    fn update_status(
        &self,
        credential: &Credential,
        anime_id: u64,
        status: WatchStatus,
        episodes: u32,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

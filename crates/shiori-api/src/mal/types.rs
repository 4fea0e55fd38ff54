use serde::Deserialize;

use crate::traits::AnimeSearchResult;

// ── Search responses ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MalSearchResponse {
    pub data: Vec<MalSearchNode>,
}

#[derive(Debug, Deserialize)]
pub struct MalSearchNode {
    pub node: MalAnimeNode,
}

#[derive(Debug, Deserialize)]
pub struct MalAnimeNode {
    pub id: u64,
    pub title: String,
    pub alternative_titles: Option<MalAlternativeTitles>,
    pub num_episodes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MalAlternativeTitles {
    pub en: Option<String>,
    pub ja: Option<String>,
    pub synonyms: Option<Vec<String>>,
}

// ── User profile ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MalUser {
    pub id: u64,
    pub name: String,
}

// ── Conversions to shared trait types ───────────────────────────

impl MalAnimeNode {
    pub fn into_search_result(self) -> AnimeSearchResult {
        let (title_english, synonyms) = match self.alternative_titles {
            Some(alt) => (alt.en, alt.synonyms.unwrap_or_default()),
            None => (None, Vec::new()),
        };
        AnimeSearchResult {
            service_id: self.id,
            title: self.title,
            title_english,
            synonyms,
            episodes: self.num_episodes,
        }
    }
}

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use shiori_api::AnimeSearchResult;

/// Result of resolving a scraped title against remote search results.
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// Exact or normalized match.
    Matched(u64),
    /// Fuzzy match with confidence score (0.0–1.0).
    Fuzzy(u64, f64),
    /// No candidate was close enough.
    NoMatch,
}

/// Minimum fuzzy score (0.0–1.0) to consider a match valid.
const FUZZY_THRESHOLD: f64 = 0.6;

/// Resolve `query` to a remote catalog identifier, if any candidate matches.
pub fn resolve(query: &str, candidates: &[AnimeSearchResult]) -> Option<u64> {
    match match_title(query, candidates) {
        MatchResult::Matched(id) | MatchResult::Fuzzy(id, _) => Some(id),
        MatchResult::NoMatch => None,
    }
}

/// Attempt to match a scraped title against remote search results.
///
/// Strategy: exact → normalized → fuzzy (Skim) → NoMatch.
pub fn match_title(query: &str, candidates: &[AnimeSearchResult]) -> MatchResult {
    if query.is_empty() || candidates.is_empty() {
        return MatchResult::NoMatch;
    }

    let normalized_query = normalize(query);

    // Pass 1: Exact match against any title variant or synonym.
    for result in candidates {
        if all_titles(result).contains(&query) {
            return MatchResult::Matched(result.service_id);
        }
    }

    // Pass 2: Normalized match (case-folded, punctuation stripped).
    for result in candidates {
        if all_titles(result)
            .iter()
            .any(|t| normalize(t) == normalized_query)
        {
            return MatchResult::Matched(result.service_id);
        }
    }

    // Pass 3: Fuzzy match using the Skim algorithm.
    let matcher = SkimMatcherV2::default();
    let mut best_score: i64 = 0;
    let mut best_id: Option<u64> = None;
    let mut max_possible: i64 = 1;

    if let Some(self_score) = matcher.fuzzy_match(&normalized_query, &normalized_query) {
        max_possible = self_score.max(1);
    }

    for result in candidates {
        let score = all_titles(result)
            .iter()
            .filter_map(|t| matcher.fuzzy_match(&normalize(t), &normalized_query))
            .max()
            .unwrap_or(0);
        if score > best_score {
            best_score = score;
            best_id = Some(result.service_id);
        }
    }

    if let Some(id) = best_id {
        let confidence = best_score as f64 / max_possible as f64;
        if confidence >= FUZZY_THRESHOLD {
            return MatchResult::Fuzzy(id, confidence);
        }
    }

    MatchResult::NoMatch
}

/// Collect all title strings for a search result.
fn all_titles(result: &AnimeSearchResult) -> Vec<&str> {
    let mut titles = vec![result.title.as_str()];
    if let Some(e) = &result.title_english {
        titles.push(e.as_str());
    }
    for s in &result.synonyms {
        titles.push(s.as_str());
    }
    titles
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

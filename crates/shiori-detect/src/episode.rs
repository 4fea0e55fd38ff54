use std::sync::LazyLock;

use regex::Regex;

// ── Patterns, in priority order ─────────────────────────────────

static RE_EPISODE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Episode\s+(\d{1,4})").unwrap());

static RE_E_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bE(\d{1,4})\b").unwrap());

static RE_EP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEp\.?\s*(\d{1,4})\b").unwrap());

static RE_PLAIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d{1,4})\s*$").unwrap());

/// Extract an episode number from scraped episode text.
///
/// Strategies in priority order: "Episode 7", "E7", "Ep 7" (all
/// case-insensitive), then a bare number. Returns `None` when nothing
/// parses; the caller applies the per-site fallback policy.
pub fn extract(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for re in [&*RE_EPISODE_WORD, &*RE_E_PREFIX, &*RE_EP_PREFIX, &*RE_PLAIN] {
        if let Some(caps) = re.captures(text) {
            if let Ok(n) = caps[1].parse() {
                return Some(n);
            }
        }
    }

    None
}

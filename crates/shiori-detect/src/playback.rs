use crate::MediaPlayback;

/// Fraction of total duration past which an episode counts as finished.
/// Policy constant; tune here.
pub const COMPLETION_THRESHOLD: f64 = 0.9;

/// Whether any media element on the page has effectively finished playing.
///
/// An element counts only with a known positive duration and a position past
/// [`COMPLETION_THRESHOLD`] of it. Zero, negative, or NaN durations never
/// count as finished.
pub fn playback_completed(media: &[MediaPlayback]) -> bool {
    media.iter().any(|m| {
        m.duration.is_finite()
            && m.duration > 0.0
            && m.position > 0.0
            && m.position >= m.duration * COMPLETION_THRESHOLD
    })
}

pub mod mal;
pub mod traits;

pub use traits::{AnimeSearchResult, Credential, TrackerService, WatchStatus};

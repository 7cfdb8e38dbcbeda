//! Outbound HTTP integrations for the knowledge tracker.
//!
//! Every client here implements a `tracker_core` trait so the server can swap
//! them for stubs in tests.

pub mod oauth;
pub mod search;

pub use oauth::google::GoogleIdentityProvider;
pub use search::duckduckgo::DuckDuckGoSearch;
pub use search::wikipedia::WikipediaSearch;
pub use search::youtube::YoutubeSearch;

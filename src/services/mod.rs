//! Clients for third-party services used around the fetch engine.
//!
//! - [`flaresolverr`] - anti-bot bypass proxy, usable as an alternate
//!   content fetcher
//! - [`semantic_scholar`] - open-access PDF lookup by DOI or title

pub mod flaresolverr;
pub mod semantic_scholar;

pub use flaresolverr::FlareSolverrClient;
pub use semantic_scholar::SemanticScholarClient;

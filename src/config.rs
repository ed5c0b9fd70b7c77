//! Conference registry and run defaults.

use std::path::PathBuf;

/// Static description of one supported conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConferenceConfig {
    /// CLI key, e.g. `usenix`.
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Directory name under the data dir.
    pub dir_name: &'static str,
    /// Default years to crawl, newest first.
    pub years: &'static [u16],
    /// Whether papers are freely accessible without an anti-bot bypass.
    pub free_access: bool,
}

/// All supported conferences.
pub const CONFERENCES: &[ConferenceConfig] = &[
    ConferenceConfig {
        key: "usenix",
        name: "USENIX Security",
        dir_name: "USENIX_Security",
        years: &[2024, 2023, 2022, 2021, 2020],
        free_access: true,
    },
    ConferenceConfig {
        key: "ndss",
        name: "NDSS",
        dir_name: "NDSS",
        years: &[2024, 2023, 2022, 2021, 2020],
        free_access: true,
    },
    ConferenceConfig {
        key: "ieee_sp",
        name: "IEEE S&P",
        // 2024 papers sit behind the one-year embargo.
        dir_name: "IEEE_SP",
        years: &[2023, 2022, 2021, 2020],
        free_access: true,
    },
    ConferenceConfig {
        key: "acm_ccs",
        name: "ACM CCS",
        dir_name: "ACM_CCS",
        years: &[2024, 2023, 2022, 2021, 2020],
        free_access: false,
    },
];

/// Looks up a conference by its CLI key.
#[must_use]
pub fn conference_by_key(key: &str) -> Option<&'static ConferenceConfig> {
    CONFERENCES.iter().find(|c| c.key == key)
}

/// Default worker count for downloads.
pub const DEFAULT_WORKERS: usize = 5;

/// Default minimum delay between requests to the same host (milliseconds).
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Default data directory (current working directory).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Browser-like User-Agent. Several conference sites serve different
/// content to obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

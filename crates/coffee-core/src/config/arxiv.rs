//! Upstream listing source and update schedule configuration.

use serde::{Deserialize, Serialize};

/// arXiv listing fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArxivConfig {
    /// Whether the periodic update runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Atom query endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Categories treated as the home listing. Entries whose primary
    /// category starts with none of these are stored as cross-lists.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Maximum entries requested per fetch.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Nominal update period in seconds.
    #[serde(default = "default_period")]
    pub period_seconds: u64,
    /// Fractional jitter applied to each period, in `[0, 1)`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_url: default_api_url(),
            categories: default_categories(),
            max_results: default_max_results(),
            request_timeout_seconds: default_request_timeout(),
            period_seconds: default_period(),
            jitter: default_jitter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

fn default_categories() -> Vec<String> {
    [
        "astro-ph.CO",
        "astro-ph.EP",
        "astro-ph.GA",
        "astro-ph.HE",
        "astro-ph.IM",
        "astro-ph.SR",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_max_results() -> u32 {
    200
}

fn default_request_timeout() -> u64 {
    30
}

fn default_period() -> u64 {
    86_400
}

fn default_jitter() -> f64 {
    0.1
}

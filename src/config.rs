use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::model::Query;

pub const DEFAULT_OUTPUT: &str = "liste_annonces_v2.csv";
pub const DEFAULT_KEYWORD: &str = "minibus";
pub const DEFAULT_AVITO_URL: &str = "https://www.avito.ma/fr/maroc/fourgon_et_minibus";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.1234.56 Safari/537.36";

/// Runtime settings: defaults, then `annonces.toml` (optional), then `ANNONCES_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_path: PathBuf,
    pub request_timeout_secs: u64,
    /// Candidates per source and run; anything above `sources::MAX_CANDIDATES` is clamped.
    pub max_candidates: usize,
    pub pause_min_ms: u64,
    pub pause_max_ms: u64,
    pub keyword: String,
    pub avito_url: String,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            request_timeout_secs: 10,
            max_candidates: 10,
            pause_min_ms: 500,
            pause_max_ms: 1500,
            keyword: DEFAULT_KEYWORD.to_string(),
            avito_url: DEFAULT_AVITO_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(File::with_name("annonces").required(false))
            .add_source(Environment::with_prefix("ANNONCES"))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Random pause between two detail fetches of the same source.
    pub fn detail_pause(&self) -> Duration {
        if self.pause_max_ms == 0 {
            return Duration::ZERO;
        }
        let lo = self.pause_min_ms.min(self.pause_max_ms);
        Duration::from_millis(fastrand::u64(lo..=self.pause_max_ms))
    }

    pub fn default_query(&self) -> Query {
        Query {
            keyword: self.keyword.clone(),
            category_url: self.avito_url.clone(),
        }
    }
}

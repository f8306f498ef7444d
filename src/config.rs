use std::{env, path::PathBuf, time::Duration};

use tracing::warn;

/// SEC page listing every published Form 13F data set.
pub const DEFAULT_LISTING_URL: &str =
    "https://www.sec.gov/data-research/sec-markets-data/form-13f-data-sets";

/// The SEC refuses requests without a descriptive agent.
pub const DEFAULT_USER_AGENT: &str = "sec13f/0.1 (admin@example.com)";

pub const DEFAULT_DATA_DIR: &str = "sec_13f_data";
pub const DEFAULT_ANNUAL_DIR: &str = "sec_13f_annual";

const DEFAULT_LISTING_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

/// Runtime settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    pub listing_url: String,
    pub user_agent: String,
    /// Archives, per-archive scratch directories and per-archive CSVs.
    pub data_dir: PathBuf,
    /// Per-year CSVs.
    pub annual_dir: PathBuf,
    pub listing_timeout: Duration,
    /// Deadline for a whole archive download, headers through last byte.
    pub download_timeout: Duration,
    /// Pause after each successful download.
    pub cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            annual_dir: PathBuf::from(DEFAULT_ANNUAL_DIR),
            listing_timeout: DEFAULT_LISTING_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl Config {
    /// Defaults, overridden by any `SEC13F_*` variables that are set.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("SEC13F_LISTING_URL") {
            cfg.listing_url = v;
        }
        if let Ok(v) = env::var("SEC13F_USER_AGENT") {
            cfg.user_agent = v;
        }
        if let Ok(v) = env::var("SEC13F_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("SEC13F_ANNUAL_DIR") {
            cfg.annual_dir = PathBuf::from(v);
        }
        if let Some(secs) = parse_env_u64("SEC13F_LISTING_TIMEOUT_SECS") {
            cfg.listing_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env_u64("SEC13F_DOWNLOAD_TIMEOUT_SECS") {
            cfg.download_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_env_u64("SEC13F_COOLDOWN_MS") {
            cfg.cooldown = Duration::from_millis(ms);
        }
        cfg
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring unparsable setting");
            None
        }
    }
}

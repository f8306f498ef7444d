// src/fetch/mod.rs

use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::{PipelineError, Result};

pub mod urls;
pub mod zips;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One downloadable quarterly data set, as linked from the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    url: Url,
}

impl ArchiveRef {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Last path segment, e.g. `2023q1_form13f.zip`.
    pub fn file_name(&self) -> &str {
        self.url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("download.zip")
    }

    /// File name without the `.zip` extension; names the scratch dir and the output CSV.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.len().checked_sub(4) {
            Some(cut) if name.get(cut..).is_some_and(|ext| ext.eq_ignore_ascii_case(".zip")) => {
                &name[..cut]
            }
            _ => name,
        }
    }
}

impl std::fmt::Display for ArchiveRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Shared HTTP client carrying the configured user agent.
pub fn build_client(config: &Config) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(CONNECT_TIMEOUT)
        .gzip(true)
        .build()
        .map_err(|e| PipelineError::NetworkError {
            url: config.listing_url.clone(),
            reason: format!("building HTTP client: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_names_come_from_the_url_path() {
        let r = ArchiveRef::new(
            Url::parse("https://www.sec.gov/files/form13f/2023q1_form13f.zip").unwrap(),
        );
        assert_eq!(r.file_name(), "2023q1_form13f.zip");
        assert_eq!(r.stem(), "2023q1_form13f");

        let bare = ArchiveRef::new(Url::parse("https://www.sec.gov/").unwrap());
        assert_eq!(bare.file_name(), "download.zip");
        assert_eq!(bare.stem(), "download");
    }
}

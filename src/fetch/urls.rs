// src/fetch/urls.rs
use once_cell::sync::Lazy;
use reqwest::{
    header::{ACCEPT_LANGUAGE, REFERER},
    Client,
};
use scraper::{Html, Selector};
use std::{collections::HashSet, time::Duration};
use tracing::{debug, info, instrument};
use url::Url;

use super::ArchiveRef;
use crate::config::Config;
use crate::error::{PipelineError, Result};

static ZIP_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href$=".zip"]"#).expect("CSS selector for ZIP links should be valid")
});

/// Find every archive on the listing page whose path mentions a year in
/// `start_year..=end_year`. Never returns an empty list.
#[instrument(level = "info", skip(client, config))]
pub async fn discover(
    client: &Client,
    config: &Config,
    start_year: i32,
    end_year: i32,
) -> Result<Vec<ArchiveRef>> {
    if start_year > end_year {
        return Err(PipelineError::InvalidYearRange {
            start_year,
            end_year,
        });
    }

    let base = Url::parse(&config.listing_url).map_err(|e| PipelineError::SourceUnavailable {
        url: config.listing_url.clone(),
        reason: format!("invalid listing URL: {e}"),
    })?;

    let html = fetch_listing(client, &base, config.listing_timeout).await?;
    let archives = select_archive_links(&html, &base, start_year, end_year);

    if archives.is_empty() {
        return Err(PipelineError::NoArchivesFound {
            start_year,
            end_year,
        });
    }
    info!(count = archives.len(), "discovered archives");
    Ok(archives)
}

async fn fetch_listing(client: &Client, base: &Url, timeout: Duration) -> Result<String> {
    let unavailable = |e: reqwest::Error| PipelineError::SourceUnavailable {
        url: base.to_string(),
        reason: e.to_string(),
    };

    debug!(url = %base, "fetching listing page");
    client
        .get(base.clone())
        .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .header(REFERER, "https://www.sec.gov/")
        .timeout(timeout)
        .send()
        .await
        .map_err(unavailable)?
        .error_for_status()
        .map_err(unavailable)?
        .text()
        .await
        .map_err(unavailable)
}

/// Pull `.zip` anchors out of `html`, resolved against `base`, keeping those
/// whose path contains one of the years. Grouped by year, page order within a
/// year; a link naming two years in range is kept once.
pub fn select_archive_links(
    html: &str,
    base: &Url,
    start_year: i32,
    end_year: i32,
) -> Vec<ArchiveRef> {
    let links = Html::parse_document(html)
        .select(&ZIP_LINKS)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let mut archives = Vec::new();
    for year in start_year..=end_year {
        let needle = year.to_string();
        for link in &links {
            if link.path().contains(&needle) && seen.insert(link.as_str().to_owned()) {
                archives.push(ArchiveRef::new(link.clone()));
            }
        }
    }
    archives
}

use futures_util::StreamExt;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
    time::{sleep, timeout, Instant},
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::ArchiveRef;
use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Leading bytes of a ZIP package: local file header, empty archive, spanned archive.
const ZIP_SIGNATURES: [[u8; 4]; 3] = [*b"PK\x03\x04", *b"PK\x05\x06", *b"PK\x07\x08"];

/// Download `reference` into `dest_dir` under its original file name and
/// check it is actually a ZIP package. Anything else is deleted.
#[instrument(level = "info", skip(client, config, dest_dir), fields(archive = %reference.file_name()))]
pub async fn fetch(
    client: &Client,
    config: &Config,
    reference: &ArchiveRef,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    fs::create_dir_all(dest_dir).await?;
    let dest_path = dest_dir.join(reference.file_name());

    let start = Instant::now();
    let written = match timeout(
        config.download_timeout,
        stream_to_file(client, reference.url(), &dest_path),
    )
    .await
    {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            discard(&dest_path).await;
            return Err(e);
        }
        Err(_) => {
            discard(&dest_path).await;
            return Err(PipelineError::NetworkError {
                url: reference.url().to_string(),
                reason: format!("download timed out after {:?}", config.download_timeout),
            });
        }
    };

    if !has_zip_signature_on_disk(&dest_path).await? {
        warn!(path = %dest_path.display(), "download is not a zip package; removing");
        fs::remove_file(&dest_path).await?;
        return Err(PipelineError::CorruptDownload { path: dest_path });
    }

    info!(bytes = written, elapsed = ?start.elapsed(), "downloaded");
    sleep(config.cooldown).await;
    Ok(dest_path)
}

async fn stream_to_file(client: &Client, url: &Url, dest: &Path) -> Result<u64> {
    let network = |e: reqwest::Error| PipelineError::NetworkError {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(network)?
        .error_for_status()
        .map_err(network)?;

    let mut file = File::create(dest).await?;
    let mut body = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(network)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial download"),
    }
}

/// True when `head` starts with one of the ZIP signatures.
pub fn has_zip_signature(head: &[u8]) -> bool {
    head.len() >= 4 && ZIP_SIGNATURES.iter().any(|sig| head[..4] == sig[..])
}

async fn has_zip_signature_on_disk(path: &Path) -> Result<bool> {
    let mut head = [0u8; 4];
    let mut file = File::open(path).await?;
    match file.read_exact(&mut head).await {
        Ok(_) => Ok(has_zip_signature(&head)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

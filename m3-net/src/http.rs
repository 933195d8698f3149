// m3-net/src/http.rs
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use m3_common::error::{M3Error, Result};
use m3_common::model::ModpackSpec;
use m3_common::pipeline::TransferStats;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::fetch::{FetchRequest, Transport};
use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "m3 mod set manager (Rust)";

pub fn build_http_client(github_api_token: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    if let Some(token) = github_api_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| M3Error::Config(format!("Invalid GitHub API token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| M3Error::HttpError(format!("Failed to build HTTP client: {e}")))
}

/// GETs `url` and returns the body as text, failing on non-success status.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!("Fetching {}", url);
    let response = client.get(url).send().await.map_err(|e| {
        M3Error::HttpError(format!("HTTP request failed for {url}: {e}"))
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(M3Error::HttpError(format!(
            "HTTP error {status} for URL {url}"
        )));
    }
    Ok(response.text().await?)
}

/// Downloads a modpack definition from `url`.
pub async fn fetch_remote_spec(
    client: &Client,
    url: &str,
) -> Result<ModpackSpec> {
    let body = fetch_text(client, url).await?;
    ModpackSpec::from_json(&body)
}

/// Transfer engine backed by reqwest. Streams the response body into the
/// given path.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn transfer(&self, request: &FetchRequest, staging: &Path) -> Result<TransferStats> {
        validate_url(&request.url)?;
        if staging.exists() {
            if let Err(e) = fs::remove_file(staging) {
                warn!(
                    "Could not remove existing temporary file {}: {}",
                    staging.display(),
                    e
                );
            }
        }

        let response = self.client.get(&request.url).send().await.map_err(|e| {
            debug!("HTTP request failed for {}: {}", request.url, e);
            M3Error::HttpError(format!("HTTP request failed for {}: {e}", request.url))
        })?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, request.url);

        if !status.is_success() {
            let reason = match status {
                StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
                StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
                other => format!("HTTP error {other}"),
            };
            return Err(M3Error::DownloadError(
                request.filename.clone(),
                request.url.clone(),
                reason,
            ));
        }

        let total_size = response.content_length();
        let mut file = TokioFile::create(staging).await.map_err(|e| {
            M3Error::IoError(format!(
                "Failed to create temp file {}: {}",
                staging.display(),
                e
            ))
        })?;

        let mut bytes_transferred = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                M3Error::DownloadError(
                    request.filename.clone(),
                    request.url.clone(),
                    format!("Failed to read response body: {e}"),
                )
            })?;
            file.write_all(&chunk).await.map_err(|e| {
                M3Error::IoError(format!(
                    "Failed to write download stream to {}: {}",
                    staging.display(),
                    e
                ))
            })?;
            bytes_transferred += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        debug!(
            "Wrote {} bytes for {} to {}",
            bytes_transferred,
            request.filename,
            staging.display()
        );
        Ok(TransferStats {
            bytes_transferred,
            total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_token() {
        assert!(build_http_client(Some("abc123")).is_ok());
        assert!(matches!(
            build_http_client(Some("bad\ntoken")),
            Err(M3Error::Config(_))
        ));
    }
}

// m3-net/src/github.rs
//! Directory listings from the GitHub contents API.
use m3_common::error::{M3Error, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const CONTENTS_API_BASE: &str = "https://api.github.com/repos";

/// One item returned by the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// A public repository addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn parse(repository: &str) -> Result<Self> {
        match repository.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: (*owner).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(M3Error::ValidationError(format!(
                "invalid repository name '{repository}', expected 'owner/name'"
            ))),
        }
    }

    pub fn contents_url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{CONTENTS_API_BASE}/{}/{}/contents", self.owner, self.name)
        } else {
            format!(
                "{CONTENTS_API_BASE}/{}/{}/contents/{}",
                self.owner, self.name, path
            )
        }
    }

    /// Lists the immediate entries of `path`; an empty path is the
    /// repository root.
    pub async fn explore(&self, client: &Client, path: &str) -> Result<Vec<ContentEntry>> {
        let url = self.contents_url(path);
        debug!("Listing {}", url);
        let response = client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(M3Error::HttpError(format!(
                "HTTP error {status} listing {url}"
            )));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Flat list of every file under `path`, descending at most `max_depth`
    /// directory levels below it.
    pub async fn aggregate(
        &self,
        client: &Client,
        path: &str,
        max_depth: usize,
    ) -> Result<Vec<ContentEntry>> {
        let mut files = Vec::new();
        let mut pending = vec![(path.to_string(), 0usize)];
        while let Some((dir, depth)) = pending.pop() {
            for entry in self.explore(client, &dir).await? {
                if entry.is_dir() {
                    if depth >= max_depth {
                        return Err(M3Error::ValidationError(format!(
                            "{}/{}: directory '{}' exceeds the listing depth limit of {}",
                            self.owner, self.name, entry.path, max_depth
                        )));
                    }
                    pending.push((entry.path, depth + 1));
                } else {
                    files.push(entry);
                }
            }
        }
        debug!(
            "Aggregated {} entries under {}/{}:{}",
            files.len(),
            self.owner,
            self.name,
            path
        );
        Ok(files)
    }
}

// m3-core/src/artifact.rs
//! The three kinds of downloadable files a modpack is made of.
use std::path::{Component, Path};

use m3_common::error::{ResolutionError, Result};
use m3_net::checksum::{Checksum, HashAlgorithm, HashRegistry};
use m3_net::fetch::Fetchable;
use m3_net::github::ContentEntry;
use m3_net::http::fetch_text;
use regex::Regex;
use tracing::{debug, warn};

/// File extension shared by every mod artifact.
pub const MOD_EXTENSION: &str = "jar";

const URL_DIGEST_LEN: usize = 6;

// Curseforge download URL is url_head + {mod_name} + url_mid + {file_id} + url_tail
const CURSE_URL_HEAD: &str = "https://minecraft.curseforge.com/projects/";
const CURSE_URL_MID: &str = "/files/";
const CURSE_URL_TAIL: &str = "/download";

/// A mod hosted at an arbitrary URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectUrlArtifact {
    pub name: String,
    pub version: String,
    url: String,
    checksum: Checksum,
    filename: String,
}

impl DirectUrlArtifact {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
        checksum: Checksum,
        registry: &HashRegistry,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let url = url.into();
        let filename = Self::canonical_filename(&name, &version, &url, registry);
        Self {
            name,
            version,
            url,
            checksum,
            filename,
        }
    }

    /// `{name}-{version}-{d}.jar`, or `{name}-{d}.jar` without a version,
    /// where `d` is a short digest of the URL.
    pub fn canonical_filename(
        name: &str,
        version: &str,
        url: &str,
        registry: &HashRegistry,
    ) -> String {
        let digest = registry.digest(url, URL_DIGEST_LEN);
        if version.is_empty() {
            format!("{name}-{digest}.{MOD_EXTENSION}")
        } else {
            format!("{name}-{version}-{digest}.{MOD_EXTENSION}")
        }
    }
}

impl Fetchable for DirectUrlArtifact {
    fn url(&self) -> &str {
        &self.url
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn checksum(&self) -> &Checksum {
        &self.checksum
    }
}

/// A mod hosted on Curseforge, addressed by its numeric file id. Adds
/// update checking on top of [`DirectUrlArtifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedArtifact {
    base: DirectUrlArtifact,
    file_id: String,
}

impl CuratedArtifact {
    /// `identifier` is either the bare file id or the full download URL for
    /// this mod's name.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        identifier: &str,
        checksum: Checksum,
        registry: &HashRegistry,
    ) -> std::result::Result<Self, ResolutionError> {
        let name = name.into();
        let file_id = parse_file_id(&name, identifier)?;
        let url = download_url(&name, &file_id);
        Ok(Self {
            base: DirectUrlArtifact::new(name, version, url, checksum, registry),
            file_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn version(&self) -> &str {
        &self.base.version
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Points this artifact at another remote file. The checksum is kept;
    /// callers retargeting to a new file should replace it as well.
    pub fn set_target(
        &mut self,
        identifier: &str,
        registry: &HashRegistry,
    ) -> std::result::Result<(), ResolutionError> {
        let file_id = parse_file_id(&self.base.name, identifier)?;
        let url = download_url(&self.base.name, &file_id);
        self.base = DirectUrlArtifact::new(
            self.base.name.clone(),
            self.base.version.clone(),
            url,
            self.base.checksum.clone(),
            registry,
        );
        self.file_id = file_id;
        Ok(())
    }

    /// Newest file id listed on the project's file page, if one can be
    /// found. Best effort: the page layout is not a stable API.
    pub async fn latest_file_id(&self, client: &reqwest::Client) -> Result<Option<String>> {
        let url = format!("{CURSE_URL_HEAD}{}/files?sort=releasetype", self.base.name);
        let page = fetch_text(client, &url).await?;
        let latest = parse_latest_file_id(&page, &self.base.name);
        debug!(
            "Latest file id for {}: {:?} (current {})",
            self.base.name, latest, self.file_id
        );
        Ok(latest)
    }
}

impl Fetchable for CuratedArtifact {
    fn url(&self) -> &str {
        self.base.url()
    }

    fn filename(&self) -> &str {
        self.base.filename()
    }

    fn checksum(&self) -> &Checksum {
        self.base.checksum()
    }
}

pub fn download_url(name: &str, file_id: &str) -> String {
    format!("{CURSE_URL_HEAD}{name}{CURSE_URL_MID}{file_id}{CURSE_URL_TAIL}")
}

/// Normalizes a curated identifier to the bare file id.
pub fn parse_file_id(
    name: &str,
    identifier: &str,
) -> std::result::Result<String, ResolutionError> {
    let identifier = identifier.trim();
    if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(identifier.to_string());
    }
    let url_pattern = format!(
        "^{}{}{}([0-9]+){}$",
        regex::escape(CURSE_URL_HEAD),
        regex::escape(name),
        regex::escape(CURSE_URL_MID),
        regex::escape(CURSE_URL_TAIL)
    );
    let invalid = || ResolutionError::InvalidIdentifier {
        name: name.to_string(),
        identifier: identifier.to_string(),
    };
    let re = Regex::new(&url_pattern).map_err(|_| invalid())?;
    re.captures(identifier)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(invalid)
}

/// Extracts the first `/projects/{name}/files/{id}/download` link from a
/// project file listing page.
pub fn parse_latest_file_id(page: &str, name: &str) -> Option<String> {
    let pattern = format!(
        "href=\"/projects/{}/files/([0-9]+)/download",
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// A file listed by the GitHub contents API, checksummed with its git blob
/// id. Its filename is the path relative to the synced directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitContentArtifact {
    url: String,
    filename: String,
    checksum: Checksum,
}

impl GitContentArtifact {
    /// Builds an artifact from a listing entry, stripping `prefix` from its
    /// path. Entries without a download URL or with a path that would escape
    /// the target directory are rejected.
    pub fn from_entry(entry: &ContentEntry, prefix: &str) -> Option<Self> {
        let url = entry.download_url.clone()?;
        let prefix = prefix.trim_matches('/');
        let relative = if prefix.is_empty() {
            entry.path.as_str()
        } else {
            entry
                .path
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(&entry.path)
        };
        let safe = !relative.is_empty()
            && Path::new(relative)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            warn!("Skipping listing entry with unusable path '{}'", entry.path);
            return None;
        }
        Some(Self {
            url,
            filename: relative.to_string(),
            checksum: Checksum::new(HashAlgorithm::GitBlob, entry.sha.clone()),
        })
    }
}

impl Fetchable for GitContentArtifact {
    fn url(&self) -> &str {
        &self.url
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn checksum(&self) -> &Checksum {
        &self.checksum
    }
}

/// Closed set of fetchable variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    DirectUrl(DirectUrlArtifact),
    Curated(CuratedArtifact),
    GitContent(GitContentArtifact),
}

impl Artifact {
    /// Human name for mods, relative path for content files.
    pub fn name(&self) -> &str {
        match self {
            Artifact::DirectUrl(a) => &a.name,
            Artifact::Curated(a) => a.name(),
            Artifact::GitContent(a) => &a.filename,
        }
    }

    pub fn as_curated(&self) -> Option<&CuratedArtifact> {
        match self {
            Artifact::Curated(a) => Some(a),
            _ => None,
        }
    }
}

impl Fetchable for Artifact {
    fn url(&self) -> &str {
        match self {
            Artifact::DirectUrl(a) => a.url(),
            Artifact::Curated(a) => a.url(),
            Artifact::GitContent(a) => a.url(),
        }
    }

    fn filename(&self) -> &str {
        match self {
            Artifact::DirectUrl(a) => a.filename(),
            Artifact::Curated(a) => a.filename(),
            Artifact::GitContent(a) => a.filename(),
        }
    }

    fn checksum(&self) -> &Checksum {
        match self {
            Artifact::DirectUrl(a) => a.checksum(),
            Artifact::Curated(a) => a.checksum(),
            Artifact::GitContent(a) => a.checksum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HashRegistry {
        HashRegistry::standard()
    }

    #[test]
    fn direct_filename_embeds_url_digest() {
        let url = "https://example.org/jei.jar";
        let a = DirectUrlArtifact::new("jei", "4.15", url, Checksum::unverified(HashAlgorithm::Sha256), &registry());
        let digest = registry().digest(url, 6);
        assert_eq!(a.filename(), format!("jei-4.15-{digest}.jar"));

        let b = DirectUrlArtifact::new("jei", "", url, Checksum::unverified(HashAlgorithm::Sha256), &registry());
        assert_eq!(b.filename(), format!("jei-{digest}.jar"));
    }

    #[test]
    fn file_id_accepts_bare_id_and_canonical_url() {
        assert_eq!(parse_file_id("jei", "2747063").unwrap(), "2747063");
        assert_eq!(
            parse_file_id(
                "jei",
                "https://minecraft.curseforge.com/projects/jei/files/2747063/download"
            )
            .unwrap(),
            "2747063"
        );
    }

    #[test]
    fn file_id_rejects_foreign_urls_and_junk() {
        for bad in [
            "",
            "-5",
            "12a",
            "https://minecraft.curseforge.com/projects/other/files/2747063/download",
            "https://minecraft.curseforge.com/projects/jei/files/latest/download",
            "prefix https://minecraft.curseforge.com/projects/jei/files/1/download",
        ] {
            assert!(
                matches!(
                    parse_file_id("jei", bad),
                    Err(ResolutionError::InvalidIdentifier { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn curated_rebuilds_canonical_url() {
        let a = CuratedArtifact::new(
            "jei",
            "4.15",
            "https://minecraft.curseforge.com/projects/jei/files/2747063/download",
            Checksum::unverified(HashAlgorithm::Sha256),
            &registry(),
        )
        .unwrap();
        assert_eq!(a.file_id(), "2747063");
        assert_eq!(
            a.url(),
            "https://minecraft.curseforge.com/projects/jei/files/2747063/download"
        );
        let same = CuratedArtifact::new("jei", "4.15", "2747063", Checksum::unverified(HashAlgorithm::Sha256), &registry()).unwrap();
        assert_eq!(a.filename(), same.filename());
    }

    #[test]
    fn set_target_moves_url_and_filename() {
        let mut a = CuratedArtifact::new("jei", "", "1", Checksum::unverified(HashAlgorithm::Sha256), &registry()).unwrap();
        let before = a.filename().to_string();
        a.set_target("2", &registry()).unwrap();
        assert_eq!(a.file_id(), "2");
        assert!(a.url().ends_with("/files/2/download"));
        assert_ne!(a.filename(), before);
        assert!(a.set_target("nope", &registry()).is_err());
        assert_eq!(a.file_id(), "2");
    }

    #[test]
    fn latest_file_id_is_first_download_link() {
        let page = r#"
            <a href="/projects/jei/files/2803400/download">latest</a>
            <a href="/projects/jei/files/2747063/download">older</a>
            <a href="/projects/other/files/9999999/download">other</a>
        "#;
        assert_eq!(parse_latest_file_id(page, "jei").as_deref(), Some("2803400"));
        assert_eq!(parse_latest_file_id("<html></html>", "jei"), None);
    }

    #[test]
    fn git_content_strips_prefix() {
        let entry = ContentEntry {
            name: "jei.cfg".into(),
            path: "config/jei/jei.cfg".into(),
            kind: "file".into(),
            size: 6,
            sha: "ce013625030ba8dba906f756967f9e9ca394464a".into(),
            download_url: Some("https://raw.githubusercontent.com/s/p/master/config/jei/jei.cfg".into()),
        };
        let a = GitContentArtifact::from_entry(&entry, "config/").unwrap();
        assert_eq!(a.filename(), "jei/jei.cfg");
        assert_eq!(a.algorithm(), HashAlgorithm::GitBlob);

        let unprefixed = GitContentArtifact::from_entry(&entry, "").unwrap();
        assert_eq!(unprefixed.filename(), "config/jei/jei.cfg");
    }

    #[test]
    fn git_content_rejects_escaping_paths() {
        let entry = ContentEntry {
            name: "x".into(),
            path: "config/../x".into(),
            kind: "file".into(),
            size: 0,
            sha: String::new(),
            download_url: Some("https://example.org/x".into()),
        };
        assert!(GitContentArtifact::from_entry(&entry, "config").is_none());
        let no_url = ContentEntry {
            download_url: None,
            path: "config/y".into(),
            ..entry
        };
        assert!(GitContentArtifact::from_entry(&no_url, "config").is_none());
    }
}

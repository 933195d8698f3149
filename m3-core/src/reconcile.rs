// m3-core/src/reconcile.rs
//! Brings a mod directory in line with a declared set of fetchables.
//!
//! Files are never deleted just because they are no longer declared: such
//! files are disabled by renaming them with [`DISABLED_SUFFIX`] and
//! re-enabled when they are declared again. The only automatic deletion is
//! of a declared file whose checksum does not match, so that the fetch
//! pipeline replaces it.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use m3_common::error::{M3Error, Result};
use m3_net::checksum::{file_matches, verify_and_purge, Verification};
use m3_net::fetch::Fetchable;
use tracing::{debug, info, warn};

use crate::artifact::MOD_EXTENSION;

pub const DISABLED_SUFFIX: &str = ".disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Ignored,
    WantedActive,
    WantedDisabled,
    Orphaned,
    Untouched,
}

/// What a reconciliation pass did, by filename.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Declared files that passed verification (or had no checksum).
    pub verified: Vec<String>,
    /// Declared files deleted because their checksum did not match.
    pub purged: Vec<String>,
    /// Disabled copies linked back to their canonical name.
    pub enabled: Vec<String>,
    /// Undeclared files renamed with the disabled suffix.
    pub disabled: Vec<String>,
    /// Redundant disabled copies removed after their canonical file existed.
    pub cleaned: Vec<String>,
    /// Disabled copies of declared files left alone because their checksum
    /// did not match.
    pub preserved: Vec<String>,
    pub failures: Vec<(String, M3Error)>,
}

impl ReconcileReport {
    /// Number of filesystem changes made.
    pub fn mutations(&self) -> usize {
        self.purged.len() + self.enabled.len() + self.disabled.len() + self.cleaned.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    extension: String,
    disabled_suffix: String,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(MOD_EXTENSION)
    }
}

impl Reconciler {
    /// `extension` (without the dot) marks the files this reconciler owns;
    /// anything else in the directory is left alone.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            disabled_suffix: DISABLED_SUFFIX.to_string(),
        }
    }

    pub fn disabled_name(&self, filename: &str) -> String {
        format!("{filename}{}", self.disabled_suffix)
    }

    pub fn classify<F: Fetchable>(
        &self,
        name: &str,
        is_file: bool,
        ignore: &HashSet<&str>,
        wanted: &HashMap<&str, &F>,
    ) -> EntryClass {
        if ignore.contains(name) {
            EntryClass::Ignored
        } else if !is_file {
            EntryClass::Untouched
        } else if wanted.contains_key(name) {
            EntryClass::WantedActive
        } else if name
            .strip_suffix(self.disabled_suffix.as_str())
            .is_some_and(|canonical| wanted.contains_key(canonical))
        {
            EntryClass::WantedDisabled
        } else if Path::new(name)
            .extension()
            .is_some_and(|ext| ext == self.extension.as_str())
        {
            EntryClass::Orphaned
        } else {
            EntryClass::Untouched
        }
    }

    /// Reconciles `dir` against `wanted`. A missing directory is a no-op.
    /// Failures on individual entries are recorded in the report and do not
    /// stop the pass; only failing to list the directory is an error.
    pub fn reconcile<F: Fetchable>(
        &self,
        dir: &Path,
        ignore: &[String],
        wanted: &[F],
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        if !dir.exists() {
            debug!("{} does not exist, nothing to reconcile", dir.display());
            return Ok(report);
        }

        let ignore: HashSet<&str> = ignore.iter().map(String::as_str).collect();
        let wanted: HashMap<&str, &F> = wanted.iter().map(|f| (f.filename(), f)).collect();

        // Snapshot the listing first; renames below must not be revisited.
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| {
            M3Error::IoError(format!("Failed to list {}: {}", dir.display(), e))
        })? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push((name, entry.path().is_file()));
        }
        entries.sort();

        for (name, is_file) in entries {
            let class = self.classify(&name, is_file, &ignore, &wanted);
            let outcome = match class {
                EntryClass::Ignored => {
                    debug!("Ignoring {}", name);
                    Ok(())
                }
                EntryClass::Untouched => Ok(()),
                EntryClass::WantedActive => {
                    let item = wanted[name.as_str()];
                    self.verify_active(dir, item, &mut report)
                }
                EntryClass::WantedDisabled => {
                    let canonical = &name[..name.len() - self.disabled_suffix.len()];
                    let item = wanted[canonical];
                    self.enable(dir, &name, item, &mut report)
                }
                EntryClass::Orphaned => self.disable(dir, &name, &mut report),
            };
            if let Err(e) = outcome {
                warn!("Failed to reconcile {}: {}", name, e);
                report.failures.push((name, e));
            }
        }

        debug!(
            "Reconciled {}: {} verified, {} purged, {} enabled, {} disabled, {} failed",
            dir.display(),
            report.verified.len(),
            report.purged.len(),
            report.enabled.len(),
            report.disabled.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn verify_active<F: Fetchable>(
        &self,
        dir: &Path,
        item: &F,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let path = dir.join(item.filename());
        match verify_and_purge(&path, item.checksum())? {
            Verification::Matched | Verification::Unverified => {
                report.verified.push(item.filename().to_string());
            }
            Verification::Purged => {
                info!("Removed {} (checksum mismatch)", item.filename());
                report.purged.push(item.filename().to_string());
            }
        }
        Ok(())
    }

    /// Re-enables a disabled copy of a declared file. The disabled bytes are
    /// verified before anything is linked, so a corrupt copy never reaches
    /// the canonical name and stays where it is.
    fn enable<F: Fetchable>(
        &self,
        dir: &Path,
        disabled_name: &str,
        item: &F,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let disabled_path = dir.join(disabled_name);
        let canonical_path = dir.join(item.filename());

        if !file_matches(&disabled_path, item.checksum())? {
            warn!(
                "Disabled copy {} does not match its checksum; leaving it in place",
                disabled_name
            );
            report.preserved.push(disabled_name.to_string());
            return Ok(());
        }

        if canonical_path.exists() && !canonical_path.is_file() {
            return Err(M3Error::IoError(format!(
                "Cannot enable {}: {} is not a regular file",
                disabled_name,
                canonical_path.display()
            )));
        }

        if canonical_path.exists() {
            // A bad canonical file would shadow the good disabled copy.
            if verify_and_purge(&canonical_path, item.checksum())? == Verification::Purged {
                report.purged.push(item.filename().to_string());
            }
        }

        if !canonical_path.exists() {
            match fs::hard_link(&disabled_path, &canonical_path) {
                Ok(()) => {
                    info!("Enabled {}", item.filename());
                    report.enabled.push(item.filename().to_string());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} appeared while enabling", item.filename());
                }
                Err(e) => {
                    return Err(M3Error::IoError(format!(
                        "Failed to link {} to {}: {}",
                        disabled_path.display(),
                        canonical_path.display(),
                        e
                    )));
                }
            }
        }

        fs::remove_file(&disabled_path).map_err(|e| {
            M3Error::IoError(format!(
                "Failed to remove redundant {}: {}",
                disabled_path.display(),
                e
            ))
        })?;
        report.cleaned.push(disabled_name.to_string());
        Ok(())
    }

    /// Disables an undeclared file. An existing disabled copy of the same
    /// name is never overwritten: the link fails atomically and the entry is
    /// reported as a failure with both files left in place.
    fn disable(&self, dir: &Path, name: &str, report: &mut ReconcileReport) -> Result<()> {
        let from = dir.join(name);
        let to = dir.join(self.disabled_name(name));
        fs::hard_link(&from, &to).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                M3Error::IoError(format!(
                    "Cannot disable {}: {} already exists",
                    from.display(),
                    to.display()
                ))
            } else {
                M3Error::IoError(format!(
                    "Failed to disable {} as {}: {}",
                    from.display(),
                    to.display(),
                    e
                ))
            }
        })?;
        fs::remove_file(&from).map_err(|e| {
            M3Error::IoError(format!(
                "Disabled copy {} created but {} could not be removed: {}",
                to.display(),
                from.display(),
                e
            ))
        })?;
        info!("Disabled {}", name);
        report.disabled.push(name.to_string());
        Ok(())
    }

    /// Deletes every disabled file of this reconciler's type in `dir` and
    /// returns their names. Only run on explicit request.
    pub fn prune_disabled(&self, dir: &Path) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        if !dir.exists() {
            return Ok(removed);
        }
        let suffix = format!(".{}{}", self.extension, self.disabled_suffix);
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) && entry.path().is_file() {
                fs::remove_file(entry.path())?;
                debug!("Pruned {}", name);
                removed.push(name);
            }
        }
        removed.sort();
        Ok(removed)
    }
}

/// Reconciles with the default mod settings.
pub fn reconcile<F: Fetchable>(dir: &Path, ignore: &[String], wanted: &[F]) -> Result<ReconcileReport> {
    Reconciler::default().reconcile(dir, ignore, wanted)
}

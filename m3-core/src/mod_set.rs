// m3-core/src/mod_set.rs
use std::path::Path;
use std::sync::Arc;

use m3_common::error::{ResolutionError, Result};
use m3_common::model::RawModSet;
use m3_net::fetch::{fetch_all, need_list, FetchBatch, Transport};
use tracing::debug;

use crate::artifact::{Artifact, CuratedArtifact};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::resolve::Resolver;

/// Resolved mods plus the filenames the reconciler must never touch.
#[derive(Debug, Clone, Default)]
pub struct ModSet {
    pub ignore: Vec<String>,
    pub items: Vec<Artifact>,
}

/// Outcome of resolving a whole raw set: every record that resolved, plus
/// the errors of the ones that did not.
#[derive(Debug, Clone, Default)]
pub struct ResolvedModSet {
    pub set: ModSet,
    pub errors: Vec<ResolutionError>,
}

impl ResolvedModSet {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ModSet {
    pub fn from_raw(raw: &RawModSet, resolver: &Resolver) -> ResolvedModSet {
        let mut resolved = ResolvedModSet {
            set: ModSet {
                ignore: raw.ignore.clone(),
                items: Vec::with_capacity(raw.items.len()),
            },
            errors: Vec::new(),
        };
        for record in &raw.items {
            match resolver.resolve(record) {
                Ok(artifact) => resolved.set.items.push(artifact),
                Err(e) => resolved.errors.push(e),
            }
        }
        debug!(
            "Resolved {} of {} mod records",
            resolved.set.items.len(),
            raw.items.len()
        );
        resolved
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn curated(&self) -> impl Iterator<Item = &CuratedArtifact> {
        self.items.iter().filter_map(Artifact::as_curated)
    }

    pub fn reconcile(&self, dir: &Path) -> Result<ReconcileReport> {
        Reconciler::default().reconcile(dir, &self.ignore, &self.items)
    }

    /// Number of mods still missing from `dir`.
    pub fn need_count(&self, dir: &Path) -> usize {
        need_list(&self.items, dir).len()
    }

    /// Reconciles `dir` then starts fetching whatever is still missing.
    pub fn fetch_to(
        &self,
        dir: &Path,
        concurrency: usize,
        transport: Arc<dyn Transport>,
    ) -> Result<(ReconcileReport, FetchBatch)> {
        let report = self.reconcile(dir)?;
        let batch = fetch_all(&self.items, dir, concurrency, transport)?;
        Ok((report, batch))
    }
}

#[cfg(test)]
mod tests {
    use m3_common::model::RawMod;
    use m3_net::fetch::Fetchable;

    use super::*;

    fn record(name: &str, url: &str, curse: &str) -> RawMod {
        RawMod {
            name: name.into(),
            url: url.into(),
            curse: curse.into(),
            ..Default::default()
        }
    }

    #[test]
    fn collects_errors_without_dropping_good_records() {
        let raw = RawModSet {
            ignore: vec!["local.jar".into()],
            items: vec![
                record("a", "https://example.org/a.jar", ""),
                record("b", "", ""),
                record("c", "", "12345"),
                record("", "https://example.org/d.jar", ""),
                record("../escaped", "https://example.org/e.jar", ""),
            ],
        };
        let resolved = ModSet::from_raw(&raw, &Resolver::default());
        assert_eq!(resolved.set.len(), 2);
        assert_eq!(resolved.errors.len(), 3);
        assert!(resolved
            .set
            .items
            .iter()
            .all(|a| !a.filename().contains('/')));
        assert!(!resolved.is_complete());
        assert_eq!(resolved.set.ignore, vec!["local.jar".to_string()]);
        assert_eq!(resolved.set.curated().count(), 1);
    }
}

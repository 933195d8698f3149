// m3-core/src/lib.rs
pub mod artifact;
pub mod config_sync;
pub mod installer;
pub mod mod_set;
pub mod reconcile;
pub mod resolve;

pub use artifact::{Artifact, CuratedArtifact, DirectUrlArtifact, GitContentArtifact};
pub use installer::Installer;
pub use mod_set::{ModSet, ResolvedModSet};
pub use reconcile::{reconcile, ReconcileReport, Reconciler, DISABLED_SUFFIX};
pub use resolve::Resolver;

// m3-core/src/resolve.rs
use m3_common::error::ResolutionError;
use m3_common::model::RawMod;
use m3_net::checksum::HashRegistry;
use tracing::debug;

use crate::artifact::{Artifact, CuratedArtifact, DirectUrlArtifact};

/// Turns raw mod records into artifacts using an explicit hash registry.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    registry: HashRegistry,
}

impl Resolver {
    pub fn new(registry: HashRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HashRegistry {
        &self.registry
    }

    /// Picks the most capable variant the record satisfies: curated first,
    /// then direct URL.
    pub fn resolve(&self, raw: &RawMod) -> Result<Artifact, ResolutionError> {
        if raw.name.trim().is_empty() {
            return Err(ResolutionError::MissingRequiredField {
                record: raw.label(),
                field: "name",
            });
        }
        check_filename_part(raw, "name", &raw.name)?;
        check_filename_part(raw, "version", &raw.version)?;
        let checksum = self
            .registry
            .parse_checksum(&raw.checksum)
            .map_err(|e| e.for_record(&raw.label()))?;

        let artifact = if !raw.curse.is_empty() {
            Artifact::Curated(CuratedArtifact::new(
                raw.name.clone(),
                raw.version.clone(),
                &raw.curse,
                checksum,
                &self.registry,
            )?)
        } else if !raw.url.is_empty() {
            Artifact::DirectUrl(DirectUrlArtifact::new(
                raw.name.clone(),
                raw.version.clone(),
                raw.url.clone(),
                checksum,
                &self.registry,
            ))
        } else {
            return Err(ResolutionError::InsufficientSpecification(raw.name.clone()));
        };
        debug!("Resolved '{}' as {}", raw.name, variant_name(&artifact));
        Ok(artifact)
    }
}

/// Name and version end up in the canonical filename, which must stay a
/// single entry of the target directory.
fn check_filename_part(
    raw: &RawMod,
    field: &'static str,
    value: &str,
) -> Result<(), ResolutionError> {
    if value.contains(['/', '\\', '\0']) || value == "." || value == ".." {
        return Err(ResolutionError::InvalidField {
            record: raw.label(),
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn variant_name(artifact: &Artifact) -> &'static str {
    match artifact {
        Artifact::DirectUrl(_) => "direct-url",
        Artifact::Curated(_) => "curated",
        Artifact::GitContent(_) => "git-content",
    }
}

#[cfg(test)]
mod tests {
    use m3_net::checksum::HashAlgorithm;
    use m3_net::fetch::Fetchable;

    use super::*;

    fn raw(name: &str, url: &str, curse: &str, checksum: &str) -> RawMod {
        RawMod {
            name: name.into(),
            version: "1.0".into(),
            checksum: checksum.into(),
            url: url.into(),
            curse: curse.into(),
        }
    }

    #[test]
    fn url_only_record_is_direct_and_deterministic() {
        let resolver = Resolver::default();
        let record = raw("foo", "https://example.org/foo.jar", "", "");
        let first = resolver.resolve(&record).unwrap();
        let second = resolver.resolve(&record).unwrap();
        assert!(matches!(first, Artifact::DirectUrl(_)));
        assert_eq!(first.filename(), second.filename());
        assert!(first.filename().starts_with("foo-1.0-"));
    }

    #[test]
    fn curated_wins_over_url() {
        let resolver = Resolver::default();
        let artifact = resolver
            .resolve(&raw("jei", "https://example.org/jei.jar", "2747063", ""))
            .unwrap();
        let curated = artifact.as_curated().expect("curated variant");
        assert_eq!(curated.file_id(), "2747063");
        assert!(artifact.url().contains("curseforge.com/projects/jei/files/2747063"));
    }

    #[test]
    fn checksum_algorithm_defaults_and_overrides() {
        let resolver = Resolver::default();
        let plain = resolver
            .resolve(&raw("a", "https://example.org/a.jar", "", "abcdef"))
            .unwrap();
        assert_eq!(plain.algorithm(), HashAlgorithm::Sha256);
        let sha1 = resolver
            .resolve(&raw("a", "https://example.org/a.jar", "", "sha1:abcdef"))
            .unwrap();
        assert_eq!(sha1.algorithm(), HashAlgorithm::Sha1);
        assert_eq!(sha1.checksum().hex, "abcdef");
    }

    #[test]
    fn resolution_errors() {
        let resolver = Resolver::default();
        assert!(matches!(
            resolver.resolve(&raw("", "https://example.org/a.jar", "", "")),
            Err(ResolutionError::MissingRequiredField { field: "name", .. })
        ));
        assert_eq!(
            resolver.resolve(&raw("a", "https://example.org/a.jar", "", "whirlpool:00")),
            Err(ResolutionError::UnsupportedAlgorithm {
                record: "a".into(),
                algorithm: "whirlpool".into(),
            })
        );
        assert!(matches!(
            resolver.resolve(&raw("a", "", "not-an-id", "")),
            Err(ResolutionError::InvalidIdentifier { .. })
        ));
        assert_eq!(
            resolver.resolve(&raw("a", "", "", "")),
            Err(ResolutionError::InsufficientSpecification("a".into()))
        );
    }

    #[test]
    fn path_like_names_are_rejected() {
        let resolver = Resolver::default();
        for name in ["../escaped", "sub/mod", "..", "win\\mod"] {
            assert!(
                matches!(
                    resolver.resolve(&raw(name, "https://example.org/a.jar", "", "")),
                    Err(ResolutionError::InvalidField { field: "name", .. })
                ),
                "{name} accepted"
            );
        }
        let mut record = raw("ok", "https://example.org/a.jar", "", "");
        record.version = "1.0/../..".into();
        assert!(matches!(
            resolver.resolve(&record),
            Err(ResolutionError::InvalidField { field: "version", .. })
        ));
    }

    #[test]
    fn unsupported_algorithm_names_the_mod() {
        let err = Resolver::default()
            .resolve(&raw("jei", "https://example.org/jei.jar", "", "whirlpool:00"))
            .unwrap_err();
        assert!(err.to_string().contains("jei"));
    }

    #[test]
    fn registry_without_algorithm_rejects_it() {
        let resolver = Resolver::new(HashRegistry::new(HashAlgorithm::Sha256));
        assert!(resolver
            .resolve(&raw("a", "https://example.org/a.jar", "", "md5:00"))
            .is_err());
    }
}

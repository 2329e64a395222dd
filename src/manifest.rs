//! The slices of registry JSON the report needs.
//!
//! Only the fields read by the pipeline are modelled; everything else in the
//! documents is ignored so both OCI and Docker v2 media types deserialize.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::platform::Platform;

// ---- Image config (the blob referenced by a platform manifest) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl ImageConfig {
    pub fn platform(&self) -> Platform {
        Platform::new(&self.os, &self.architecture, self.variant.as_deref())
    }
}

/// One raw build-history record. Carries no size information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub empty_layer: bool,
}

// ---- Platform manifest ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformManifest {
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl PlatformManifest {
    /// Compressed size of every layer.
    pub fn total_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size).sum()
    }

    pub fn config_digest(&self) -> Result<&str> {
        self.config
            .as_ref()
            .map(|c| c.digest.as_str())
            .ok_or_else(|| Error::Manifest("platform manifest has no config descriptor".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    pub digest: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub size: u64,
}

// ---- Multi-platform index ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageIndex {
    pub manifests: Vec<PlatformIndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformIndexEntry {
    pub digest: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl ImageIndex {
    /// First entry whose platform satisfies `wanted`.
    pub fn find(&self, wanted: &Platform) -> Option<&PlatformIndexEntry> {
        self.manifests
            .iter()
            .find(|m| m.platform.as_ref().is_some_and(|p| wanted.matches(p)))
    }

    /// Platforms listed in the index, for error messages.
    pub fn available(&self) -> String {
        self.manifests
            .iter()
            .filter_map(|m| m.platform.as_ref())
            .map(Platform::to_string)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A manifest document as returned for a tag: either an index or a single
/// platform's manifest.
#[derive(Debug, Clone)]
pub enum ManifestDocument {
    Index(ImageIndex),
    Image(PlatformManifest),
}

#[derive(Deserialize)]
struct DocumentShape {
    #[serde(default)]
    manifests: Option<serde_json::Value>,
}

impl ManifestDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let shape: DocumentShape = serde_json::from_slice(bytes)?;
        if shape.manifests.is_some() {
            Ok(Self::Index(serde_json::from_slice(bytes)?))
        } else {
            Ok(Self::Image(serde_json::from_slice(bytes)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {"digest": "sha256:aaa", "size": 1, "platform": {"architecture": "amd64", "os": "linux"}},
            {"digest": "sha256:bbb", "size": 1, "platform": {"architecture": "arm", "os": "linux", "variant": "v7"}},
            {"digest": "sha256:ccc", "size": 1, "annotations": {"vnd.docker.reference.type": "attestation-manifest"},
             "platform": {"architecture": "unknown", "os": "unknown"}},
            {"digest": "sha256:ddd", "size": 1}
        ]
    }"#;

    const MANIFEST: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "size": 10, "digest": "sha256:cfg"},
        "layers": [
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 100, "digest": "sha256:l1"},
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 250, "digest": "sha256:l2"}
        ]
    }"#;

    #[test]
    fn classifies_documents() {
        assert!(matches!(ManifestDocument::parse(INDEX.as_bytes()).unwrap(), ManifestDocument::Index(_)));
        match ManifestDocument::parse(MANIFEST.as_bytes()).unwrap() {
            ManifestDocument::Image(m) => {
                assert_eq!(m.layers.len(), 2);
                assert_eq!(m.total_size(), 350);
                assert_eq!(m.config_digest().unwrap(), "sha256:cfg");
            }
            other => panic!("expected image manifest, got {other:?}"),
        }
    }

    #[test]
    fn index_lookup_by_platform() {
        let ManifestDocument::Index(index) = ManifestDocument::parse(INDEX.as_bytes()).unwrap() else {
            panic!("expected index");
        };
        let arm = index.find(&Platform::parse("linux/arm").unwrap()).unwrap();
        assert_eq!(arm.digest, "sha256:bbb");
        assert!(index.find(&Platform::parse("linux/arm/v6").unwrap()).is_none());
        assert_eq!(index.available(), "linux/amd64, linux/arm/v7, unknown/unknown");
    }

    #[test]
    fn config_history_defaults() {
        let config: ImageConfig = serde_json::from_str(
            r#"{
                "architecture": "amd64",
                "os": "linux",
                "created": "2024-01-02T03:04:05Z",
                "history": [
                    {"created": "2024-01-01T00:00:00Z", "created_by": "/bin/sh -c #(nop) ADD file:x in /"},
                    {"created": "2024-01-01T00:00:01Z", "created_by": "/bin/sh -c #(nop)  CMD [\"sh\"]", "empty_layer": true},
                    {"created": "2024-01-01T00:00:02Z", "comment": "buildkit.dockerfile.v0"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.platform().to_string(), "linux/amd64");
        assert_eq!(config.history.len(), 3);
        assert!(!config.history[0].empty_layer);
        assert!(config.history[1].empty_layer);
        assert_eq!(config.history[2].created_by, "");
    }

    #[test]
    fn missing_config_descriptor_is_an_error() {
        let m: PlatformManifest = serde_json::from_str(r#"{"layers": []}"#).unwrap();
        assert!(matches!(m.config_digest(), Err(Error::Manifest(_))));
    }
}

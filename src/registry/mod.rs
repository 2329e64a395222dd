//! Retrieval of manifests and configs.

pub mod auth;
mod client;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::manifest::{ImageConfig, ImageIndex, PlatformIndexEntry, PlatformManifest};
use crate::platform::Platform;

pub use client::RegistryClient;

/// Where raw manifest and config JSON comes from.
#[allow(async_fn_in_trait)]
pub trait ImageSource {
    /// The manifest (or index) for the reference the source was opened with.
    async fn fetch_manifest(&self) -> Result<Vec<u8>>;

    async fn fetch_manifest_by_digest(&self, digest: &str) -> Result<Vec<u8>>;

    async fn fetch_blob(&self, digest: &str) -> Result<Vec<u8>>;

    /// The config blob a platform manifest points at.
    async fn fetch_config(&self, manifest: &PlatformManifest) -> Result<ImageConfig> {
        let bytes = self.fetch_blob(manifest.config_digest()?).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The index entry serving `wanted`.
pub fn select_platform<'a>(index: &'a ImageIndex, wanted: &Platform) -> Result<&'a PlatformIndexEntry> {
    index.find(wanted).ok_or_else(|| Error::PlatformNotFound {
        wanted: wanted.to_string(),
        available: index.available(),
    })
}

/// `sha256:<hex>` of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Check content fetched by digest. Algorithms other than sha256 are
/// accepted unchecked.
pub fn verify_digest(expected: &str, bytes: &[u8]) -> Result<()> {
    if !expected.starts_with("sha256:") {
        tracing::debug!(digest = expected, "skipping verification of non-sha256 digest");
        return Ok(());
    }
    let actual = sha256_digest(bytes);
    if actual != expected {
        return Err(Error::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

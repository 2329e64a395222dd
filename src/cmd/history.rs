use std::io::{self, Write};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::config;
use crate::history::{EnrichOptions, enrich};
use crate::manifest::{ManifestDocument, PlatformManifest};
use crate::platform::Platform;
use crate::progress::Spinner;
use crate::registry::{ImageSource, RegistryClient, auth, select_platform, sha256_digest};
use crate::report::{PlatformRow, Report};
use crate::units::bytes_size;

pub async fn run(image: &str, platform: &str, no_color: bool, no_format: bool) -> Result<()> {
    config::init_from_cli(image, platform, no_color, no_format)?;
    let cfg = config::get()?;

    let client = RegistryClient::new(&cfg.image)?;
    let credentials = match &cfg.docker_config {
        Some(path) => auth::load_credentials(path, client.registry())
            .with_context(|| format!("problem with reading credentials from {}", path.display()))?,
        None => None,
    };
    debug!(registry = client.registry(), authenticated = credentials.is_some(), "registry client ready");
    let client = client.with_credentials(credentials);

    let spinner = Spinner::new(format!("Fetching {}...", cfg.image));
    let opts = EnrichOptions::new(cfg.format_shell);
    let report = build_report(&client, &cfg.platform, &opts, cfg.color, &spinner).await?;
    spinner.finish(format!("Fetched {} for {}", cfg.image, cfg.platform));

    let mut stdout = io::stdout().lock();
    stdout.write_all(report.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Fetch everything the report needs from `source` and render it.
///
/// Nothing is returned until every request and the enrichment succeeded.
pub async fn build_report<S: ImageSource>(
    source: &S,
    platform: &Platform,
    opts: &EnrichOptions,
    color: bool,
    spinner: &Spinner,
) -> Result<String> {
    spinner.set_message("Fetching image manifest...");
    let root = source
        .fetch_manifest()
        .await
        .context("problem with get image manifest")?;
    let document = ManifestDocument::parse(&root).context("problem with get image manifest")?;

    let (mut rows, manifest, single_digest) = match document {
        ManifestDocument::Index(index) => {
            let wanted = select_platform(&index, platform)
                .context("problem with get image platform manifest")?;
            let mut rows = Vec::new();
            let mut selected = None;
            for entry in &index.manifests {
                let Some(name) = entry
                    .platform
                    .as_ref()
                    .map(Platform::to_string)
                    .filter(|p| !p.is_empty())
                else {
                    debug!(digest = %entry.digest, "skipping index entry without a platform");
                    continue;
                };
                spinner.set_message(format!("Fetching manifest for {name}..."));
                let manifest = fetch_platform_manifest(source, &entry.digest)
                    .await
                    .with_context(|| format!("problem with writing image info for {name}"))?;
                rows.push(PlatformRow {
                    platform: name,
                    size: bytes_size(manifest.total_size()),
                    digest: entry.digest.clone(),
                });
                if entry.digest == wanted.digest && selected.is_none() {
                    selected = Some(manifest);
                }
            }
            let manifest = selected.ok_or_else(|| {
                anyhow!("problem with get image platform manifest: {platform} has no listed platform")
            })?;
            (rows, manifest, None)
        }
        ManifestDocument::Image(manifest) => (Vec::new(), manifest, Some(sha256_digest(&root))),
    };

    spinner.set_message("Fetching image config...");
    let image_config = source
        .fetch_config(&manifest)
        .await
        .context("cannot get image history")?;

    if let Some(digest) = single_digest {
        rows.push(PlatformRow {
            platform: image_config.platform().to_string(),
            size: bytes_size(manifest.total_size()),
            digest,
        });
    }

    let history =
        enrich(&image_config, &manifest, opts).context("problem with preparing image history")?;
    debug!(
        entries = history.entries.len(),
        data_layers = history.data_layers(),
        created = %history.created_at,
        "history enriched"
    );

    let mut report = Report::new(color);
    report.platforms(&rows);
    report.history(&history, platform);
    Ok(report.finish())
}

async fn fetch_platform_manifest<S: ImageSource>(source: &S, digest: &str) -> Result<PlatformManifest> {
    let bytes = source.fetch_manifest_by_digest(digest).await?;
    match ManifestDocument::parse(&bytes)? {
        ManifestDocument::Image(manifest) => Ok(manifest),
        ManifestDocument::Index(_) => Err(anyhow!("{digest} is a nested index, expected a platform manifest")),
    }
}

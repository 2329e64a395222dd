use oci_spec::distribution::Reference;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::auth::{self, Challenge, Credentials};
use super::{ImageSource, verify_digest};
use crate::error::{Error, Result};

const MANIFEST_TYPES: &[&str] = &[
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.docker.distribution.manifest.v2+json",
];

/// Longest slice of an error body carried into an error message.
const BODY_SNIPPET: usize = 200;

/// Client for the OCI distribution API, bound to one image reference.
pub struct RegistryClient {
    http: Client,
    base_url: String,
    registry: String,
    repository: String,
    /// Tag or digest the user asked for.
    target: String,
    credentials: Option<Credentials>,
    /// `Authorization` header value, once a challenge has been answered.
    authorization: Mutex<Option<String>>,
}

impl RegistryClient {
    pub fn new(image: &str) -> Result<Self> {
        let reference = image
            .parse::<Reference>()
            .map_err(|e| Error::InvalidReference {
                reference: image.to_string(),
                message: e.to_string(),
            })?;
        let target = reference
            .digest()
            .or(reference.tag())
            .unwrap_or("latest")
            .to_string();
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url(reference.registry()),
            registry: reference.registry().to_string(),
            repository: reference.repository().to_string(),
            target,
            credentials: None,
            authorization: Mutex::new(None),
        })
    }

    /// Credentials to present when the registry challenges.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Registry host as written in the reference (`docker.io` for Hub images).
    pub fn registry(&self) -> &str {
        &self.registry
    }

    fn url(&self, kind: &str, reference: &str) -> String {
        format!("{}/v2/{}/{kind}/{reference}", self.base_url, self.repository)
    }

    async fn send(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut request = self.http.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(value) = self.authorization.lock().await.as_deref() {
            request = request.header(AUTHORIZATION, value);
        }
        Ok(request.send().await?)
    }

    /// GET with one retry after answering an authentication challenge.
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        debug!(url, "GET");
        let mut response = self.send(url, accept).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|h| h.to_str().ok())
                .and_then(auth::parse_challenge)
                .ok_or_else(|| {
                    Error::Auth(format!("{url} requires authentication but sent no usable challenge"))
                })?;
            self.authorize(&challenge).await?;
            response = self.send(url, accept).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Registry {
                status: status.as_u16(),
                url: url.to_string(),
                message: snippet(&body),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn authorize(&self, challenge: &Challenge) -> Result<()> {
        let value = match challenge {
            Challenge::Bearer { .. } => {
                let scope = format!("repository:{}:pull", self.repository);
                let token =
                    auth::request_token(&self.http, challenge, &scope, self.credentials.as_ref())
                        .await?;
                format!("Bearer {token}")
            }
            Challenge::Basic => match &self.credentials {
                Some(creds) => creds.basic_header(),
                None => {
                    return Err(Error::Auth(format!(
                        "{} requires basic credentials and none are configured",
                        self.registry
                    )));
                }
            },
        };
        info!(registry = %self.registry, "authenticated");
        *self.authorization.lock().await = Some(value);
        Ok(())
    }
}

impl ImageSource for RegistryClient {
    async fn fetch_manifest(&self) -> Result<Vec<u8>> {
        let url = self.url("manifests", &self.target);
        let bytes = self.get(&url, Some(&MANIFEST_TYPES.join(", "))).await?;
        if self.target.contains(':') {
            verify_digest(&self.target, &bytes)?;
        }
        Ok(bytes)
    }

    async fn fetch_manifest_by_digest(&self, digest: &str) -> Result<Vec<u8>> {
        let url = self.url("manifests", digest);
        let bytes = self.get(&url, Some(&MANIFEST_TYPES.join(", "))).await?;
        verify_digest(digest, &bytes)?;
        Ok(bytes)
    }

    async fn fetch_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let url = self.url("blobs", digest);
        let bytes = self.get(&url, None).await?;
        verify_digest(digest, &bytes)?;
        Ok(bytes)
    }
}

/// Docker Hub's API lives on a different host than its image names; local
/// registries are usually plain HTTP.
fn base_url(registry: &str) -> String {
    let host = registry.split(':').next().unwrap_or(registry);
    match host {
        "docker.io" | "index.docker.io" => "https://registry-1.docker.io".to_string(),
        "localhost" | "127.0.0.1" => format!("http://{registry}"),
        _ => format!("https://{registry}"),
    }
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_SNIPPET) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

//! Registry authentication: `WWW-Authenticate` challenges, bearer tokens and
//! credentials from the Docker CLI config file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

/// Parse `Bearer realm="...",service="...",scope="..."` or `Basic realm=...`.
///
/// Quoted values may contain commas (`scope="repository:a/b:pull,push"`).
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let mut params = parse_params(params);
    Some(Challenge::Bearer {
        realm: params.remove("realm")?,
        service: params.remove("service"),
        scope: params.remove("scope"),
    })
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            },
        };
        params.insert(key, value.to_string());
        rest = remainder.trim_start().trim_start_matches(',');
    }
    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Exchange a bearer challenge for a token, anonymously when no credentials
/// are known.
pub async fn request_token(
    http: &Client,
    challenge: &Challenge,
    default_scope: &str,
    credentials: Option<&Credentials>,
) -> Result<String> {
    let Challenge::Bearer {
        realm,
        service,
        scope,
    } = challenge
    else {
        return Err(Error::Auth("not a bearer challenge".into()));
    };

    let mut query = vec![("scope", scope.as_deref().unwrap_or(default_scope))];
    if let Some(service) = service {
        query.push(("service", service.as_str()));
    }
    debug!(%realm, ?query, authenticated = credentials.is_some(), "requesting bearer token");

    let mut request = http.get(realm).query(&query);
    if let Some(creds) = credentials {
        request = request.basic_auth(&creds.username, Some(&creds.password));
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Auth(format!(
            "token request to {realm} failed with {status}: {}",
            body.trim()
        )));
    }

    let token: TokenResponse = response.json().await?;
    token
        .token
        .or(token.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Auth(format!("token response from {realm} carried no token")))
}

// ---- Docker CLI config ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Value for an `Authorization: Basic` header.
    pub fn basic_header(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.username, self.password)))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`.
pub fn docker_config_path(docker_config: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    match docker_config {
        Some(dir) => Some(dir.join("config.json")),
        None => home.map(|h| h.join(".docker").join("config.json")),
    }
}

/// Credentials stored for `registry` in a Docker config file. A missing file
/// means no credentials.
pub fn load_credentials(path: &Path, registry: &str) -> Result<Option<Credentials>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let config: DockerConfig = serde_json::from_slice(&data)?;
    credentials_for(&config, registry)
}

fn credentials_for(config: &DockerConfig, registry: &str) -> Result<Option<Credentials>> {
    let wanted = normalize_registry(registry);
    let Some(entry) = config
        .auths
        .iter()
        .find(|(key, _)| normalize_registry(key) == wanted)
        .map(|(_, entry)| entry)
    else {
        return Ok(None);
    };
    let Some(encoded) = entry.auth.as_deref().filter(|a| !a.is_empty()) else {
        return Ok(match (&entry.username, &entry.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        });
    };

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Auth(format!("invalid auth entry for {registry}: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::Auth(format!("auth entry for {registry} is not UTF-8")))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| Error::Auth(format!("auth entry for {registry} is not user:password")))?;
    Ok(Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }))
}

/// Config keys may be bare hosts or URLs; Docker Hub appears under several
/// names.
fn normalize_registry(key: &str) -> &str {
    let host = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = host.split('/').next().unwrap_or(host);
    match host {
        "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => "docker.io",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/alpine:pull""#;
        assert_eq!(
            parse_challenge(header),
            Some(Challenge::Bearer {
                realm: "https://auth.docker.io/token".into(),
                service: Some("registry.docker.io".into()),
                scope: Some("repository:library/alpine:pull".into()),
            })
        );
    }

    #[test]
    fn quoted_values_may_contain_commas() {
        let header = r#"Bearer realm="https://ghcr.io/token", scope="repository:a/b:pull,push",service="ghcr.io""#;
        match parse_challenge(header) {
            Some(Challenge::Bearer { scope, service, .. }) => {
                assert_eq!(scope.as_deref(), Some("repository:a/b:pull,push"));
                assert_eq!(service.as_deref(), Some("ghcr.io"));
            }
            other => panic!("unexpected challenge: {other:?}"),
        }
    }

    #[test]
    fn other_schemes() {
        assert_eq!(parse_challenge(r#"Basic realm="registry""#), Some(Challenge::Basic));
        assert_eq!(parse_challenge("Negotiate abc"), None);
        assert_eq!(parse_challenge(r#"Bearer service="x""#), None);
    }

    #[test]
    fn finds_credentials_under_any_hub_alias() {
        let config: DockerConfig = serde_json::from_str(&format!(
            r#"{{"auths": {{
                "https://index.docker.io/v1/": {{"auth": "{}"}},
                "ghcr.io": {{"auth": "{}"}},
                "quay.io": {{}}
            }}}}"#,
            STANDARD.encode("hub-user:hub:pass"),
            STANDARD.encode("gh:token"),
        ))
        .unwrap();

        let hub = credentials_for(&config, "docker.io").unwrap().unwrap();
        assert_eq!(hub.username, "hub-user");
        assert_eq!(hub.password, "hub:pass");
        assert_eq!(credentials_for(&config, "ghcr.io").unwrap().unwrap().username, "gh");
        assert_eq!(credentials_for(&config, "quay.io").unwrap(), None);
        assert_eq!(credentials_for(&config, "example.com").unwrap(), None);
    }

    #[test]
    fn plain_username_and_password_entries() {
        let config: DockerConfig = serde_json::from_str(
            r#"{"auths": {"registry.example.com": {"username": "bot", "password": "s3cret"}}}"#,
        )
        .unwrap();
        let creds = credentials_for(&config, "registry.example.com").unwrap().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn rejects_malformed_auth_entries() {
        let config: DockerConfig =
            serde_json::from_str(r#"{"auths": {"ghcr.io": {"auth": "%%%"}}}"#).unwrap();
        assert!(matches!(credentials_for(&config, "ghcr.io"), Err(Error::Auth(_))));
    }

    #[test]
    fn config_path_prefers_docker_config_dir() {
        assert_eq!(
            docker_config_path(Some(Path::new("/etc/docker")), Some(Path::new("/home/u"))),
            Some(PathBuf::from("/etc/docker/config.json"))
        );
        assert_eq!(
            docker_config_path(None, Some(Path::new("/home/u"))),
            Some(PathBuf::from("/home/u/.docker/config.json"))
        );
        assert_eq!(docker_config_path(None, None), None);
    }

    #[test]
    fn missing_config_file_means_anonymous() {
        let path = Path::new("/nonexistent/imghist/config.json");
        assert_eq!(load_credentials(path, "docker.io").unwrap(), None);
    }

    #[test]
    fn basic_header_encodes_user_and_password() {
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        assert_eq!(creds.basic_header(), "Basic dTpw");
    }
}

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use crossterm::tty::IsTty;

use crate::platform::Platform;
use crate::registry::auth;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Settings for one run, resolved from the command line and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub image: String,
    pub platform: Platform,
    pub color: bool,
    pub format_shell: bool,
    /// Docker CLI config file holding registry credentials.
    pub docker_config: Option<PathBuf>,
}

impl AppConfig {
    /// `env` looks up environment variables; `stdout_tty` says whether the
    /// report goes to a terminal.
    pub fn resolve(
        image: &str,
        platform: &str,
        no_color: bool,
        no_format: bool,
        env: impl Fn(&str) -> Option<String>,
        stdout_tty: bool,
    ) -> Result<Self> {
        let platform = Platform::parse(platform)?;
        let no_color_env = env("NO_COLOR").is_some_and(|v| !v.is_empty());
        let dumb_term = env("TERM").as_deref() == Some("dumb");

        let docker_config = env("DOCKER_CONFIG").map(PathBuf::from);
        let home = env("HOME").map(PathBuf::from);

        Ok(Self {
            image: image.to_string(),
            platform,
            color: !no_color && !no_color_env && !dumb_term && stdout_tty,
            format_shell: !no_format,
            docker_config: auth::docker_config_path(docker_config.as_deref(), home.as_deref()),
        })
    }
}

/// Resolve the configuration from CLI flags and the process environment.
/// Later calls keep the first configuration.
pub fn init_from_cli(image: &str, platform: &str, no_color: bool, no_format: bool) -> Result<()> {
    let config = AppConfig::resolve(
        image,
        platform,
        no_color,
        no_format,
        |key| std::env::var(key).ok(),
        std::io::stdout().is_tty(),
    )
    .context("problem with parsing platform parameter")?;
    tracing::debug!(?config, "configuration resolved");
    let _ = CONFIG.set(config);
    Ok(())
}

pub fn get() -> Result<&'static AppConfig> {
    CONFIG.get().context("configuration read before it was initialized")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::Error;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_enable_color_and_formatting() {
        let cfg = AppConfig::resolve("alpine", "linux/amd64", false, false, env(&[]), true).unwrap();
        assert!(cfg.color);
        assert!(cfg.format_shell);
        assert_eq!(cfg.platform, Platform::new("linux", "amd64", None));
        assert_eq!(cfg.docker_config, None);
    }

    #[test]
    fn color_is_disabled_by_flag_env_or_pipe() {
        let off = |no_color, vars: &[(&str, &str)], tty| {
            !AppConfig::resolve("a", "linux/amd64", no_color, false, env(vars), tty)
                .unwrap()
                .color
        };
        assert!(off(true, &[], true));
        assert!(off(false, &[("NO_COLOR", "1")], true));
        assert!(off(false, &[("TERM", "dumb")], true));
        assert!(off(false, &[], false));
        assert!(!off(false, &[("NO_COLOR", "")], true));
    }

    #[test]
    fn malformed_platform_fails_before_anything_else() {
        let err = AppConfig::resolve("a", "linux", false, false, env(&[]), true).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedPlatform { .. })));
    }

    #[test]
    fn docker_config_location() {
        let cfg = AppConfig::resolve(
            "a",
            "linux/arm64",
            false,
            true,
            env(&[("HOME", "/home/u"), ("DOCKER_CONFIG", "/cfg")]),
            false,
        )
        .unwrap();
        assert!(!cfg.format_shell);
        assert_eq!(cfg.docker_config, Some(PathBuf::from("/cfg/config.json")));

        let cfg = AppConfig::resolve("a", "linux/arm64", false, false, env(&[("HOME", "/home/u")]), false)
            .unwrap();
        assert_eq!(cfg.docker_config, Some(PathBuf::from("/home/u/.docker/config.json")));
    }
}

use crate::errors::ConfigError;
use crate::repo::CloneMethod;
use reqwest::Url;
use sec::Secret;
use serde_derive::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The value people leave in the example config before filling in a real
/// token.
const PLACEHOLDER_TOKEN: &str = "YOUR_PERSONAL_ACCESS_TOKEN";

/// A commented example config, printed by `--example-config`.
pub const EXAMPLE_CONFIG: &str = r#"[general]
# The directory all mirrors are placed in.
target = "~/backups/repositories"
# How many repositories to clone or update at the same time.
threads = 1
# Seconds to wait for each API request (at least 1).
http-timeout = 30
# Seconds to wait for each git command (0 waits forever).
git-timeout = 3600
# Name mirrors "<platform>_<path>" ("prefixed"), "<path>" ("flat"), or
# prefix only when more than one provider is enabled ("auto").
layout = "auto"

[gitlab]
enabled = true
host = "https://gitlab.com"
personal-access-token = "YOUR_PERSONAL_ACCESS_TOKEN"
clone-method = "ssh"

[github]
enabled = true
host = "https://api.github.com"
personal-access-token = "YOUR_PERSONAL_ACCESS_TOKEN"
clone-method = "ssh"
"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub gitlab: Option<ProviderConfig>,
    #[serde(default)]
    pub github: Option<ProviderConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct General {
    /// The top-level directory all mirrors should be placed in.
    pub target: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Seconds to wait for a single API request, never `0`.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
    /// Seconds to wait for a single git command, `0` means no limit.
    #[serde(default = "default_git_timeout")]
    pub git_timeout: u64,
    #[serde(default)]
    pub layout: Layout,
}

/// How mirror directories are named.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Prefix with the platform when more than one provider is enabled.
    Auto,
    Prefixed,
    Flat,
}

impl Default for Layout {
    fn default() -> Layout {
        Layout::Auto
    }
}

/// Settings shared by the GitLab and GitHub providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The API host, each provider falls back to its public instance.
    #[serde(default)]
    pub host: Option<String>,
    pub personal_access_token: Secret<String>,
    pub clone_method: CloneMethod,
}

fn default_threads() -> usize {
    1
}

fn default_http_timeout() -> u64 {
    30
}

fn default_git_timeout() -> u64 {
    60 * 60
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load, resolve and validate the config file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        debug!("Reading config from {}", path.display());

        let contents = fs::read_to_string(path).map_err(|inner| ConfigError::Read {
            path: path.display().to_string(),
            inner,
        })?;

        let mut cfg = Config::from_toml(&contents)?;
        cfg.general.target = resolve_target(&cfg.general.target)?;

        Ok(cfg)
    }

    /// Parse and validate a config without touching the filesystem.
    pub fn from_toml(src: &str) -> Result<Config, ConfigError> {
        let cfg: Config = toml::from_str(src).map_err(ConfigError::Parse)?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.general.target.as_os_str().is_empty() {
            return Err(ConfigError::missing("general.target"));
        }
        if self.general.threads == 0 {
            return Err(ConfigError::invalid(
                "general.threads",
                "at least one thread is needed",
            ));
        }
        if self.general.http_timeout == 0 {
            return Err(ConfigError::invalid(
                "general.http-timeout",
                "requests need at least one second to complete",
            ));
        }

        for (section, provider) in self.providers() {
            provider.validate(section)?;
        }

        Ok(())
    }

    fn providers(&self) -> impl Iterator<Item = (&'static str, &ProviderConfig)> {
        let gitlab = self.gitlab.as_ref().map(|p| ("gitlab", p));
        let github = self.github.as_ref().map(|p| ("github", p));

        gitlab.into_iter().chain(github)
    }

    /// The GitLab settings, if GitLab is enabled.
    pub fn enabled_gitlab(&self) -> Option<&ProviderConfig> {
        self.gitlab.as_ref().filter(|p| p.enabled)
    }

    /// The GitHub settings, if GitHub is enabled.
    pub fn enabled_github(&self) -> Option<&ProviderConfig> {
        self.github.as_ref().filter(|p| p.enabled)
    }

    pub fn enabled_providers(&self) -> usize {
        self.providers().filter(|(_, p)| p.enabled).count()
    }

    /// Should mirror directories be prefixed with their platform?
    pub fn prefix_with_platform(&self) -> bool {
        match self.general.layout {
            Layout::Prefixed => true,
            Layout::Flat => false,
            Layout::Auto => self.enabled_providers() > 1,
        }
    }
}

impl General {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn git_timeout(&self) -> Option<Duration> {
        if self.git_timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.git_timeout))
        }
    }
}

impl ProviderConfig {
    pub fn token(&self) -> &str {
        self.personal_access_token.reveal().as_str()
    }

    /// The configured host, or `default` when none was given.
    pub fn host_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.host.as_ref().map(|h| h.as_str()).unwrap_or(default)
    }

    /// The token with everything but its last 8 characters masked, safe for
    /// putting in log messages.
    pub fn masked_token(&self) -> String {
        mask_token(self.token())
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        let token = self.token().trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            return Err(ConfigError::missing(format!(
                "{}.personal-access-token",
                section
            )));
        }

        if let Some(ref host) = self.host {
            let key = format!("{}.host", section);
            let url = Url::parse(host).map_err(|e| ConfigError::invalid(key.clone(), e.to_string()))?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::invalid(key, "the host must be an http or https URL"));
            }
        }

        Ok(())
    }
}

/// Keep the last 8 characters of `token` and replace the rest with `*`.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let visible = chars.len().saturating_sub(8);

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| if i < visible { '*' } else { c })
        .collect()
}

/// Expand `~` and environment variables in the path given to `--config`.
pub fn config_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded =
        shellexpand::full(raw).map_err(|e| ConfigError::invalid("--config", e.to_string()))?;

    Ok(PathBuf::from(expanded.as_ref()))
}

/// Expand `~` and environment variables, then make the path absolute.
fn resolve_target(target: &Path) -> Result<PathBuf, ConfigError> {
    let raw = target.to_str().ok_or_else(|| {
        ConfigError::invalid("general.target", "the path must be valid UTF-8")
    })?;
    let expanded = shellexpand::full(raw)
        .map_err(|e| ConfigError::invalid("general.target", e.to_string()))?;
    let expanded = PathBuf::from(expanded.as_ref());

    if expanded.is_absolute() {
        return Ok(expanded);
    }

    let cwd = env::current_dir().map_err(|e| {
        ConfigError::invalid(
            "general.target",
            format!("unable to resolve a relative path: {}", e),
        )
    })?;

    Ok(cwd.join(expanded))
}

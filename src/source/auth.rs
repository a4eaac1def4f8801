//! Registry credentials from the docker CLI configuration
//!
//! Reads the `auths` section of `$DOCKER_CONFIG/config.json` (or
//! `~/.docker/config.json`). Credential helpers are not consulted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DOCKER_HUB_ALIASES: &[&str] = &["index.docker.io", "registry-1.docker.io", "registry.hub.docker.com"];

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Value of an HTTP `Authorization` header using basic auth.
    pub fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

// Keep passwords out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
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

impl AuthEntry {
    fn credentials(&self) -> Option<Credentials> {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            });
        }

        let decoded = STANDARD.decode(self.auth.as_deref()?.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Credentials keyed by normalized registry host.
#[derive(Debug, Default)]
pub struct CredentialStore {
    registries: HashMap<String, Credentials>,
}

impl CredentialStore {
    /// Location of the docker CLI configuration file.
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os("DOCKER_CONFIG") {
            Some(dir) => Some(PathBuf::from(dir).join("config.json")),
            None => dirs::home_dir().map(|home| home.join(".docker").join("config.json")),
        }
    }

    /// Load credentials from `path` (or the default location). A missing or
    /// unreadable file yields an empty store.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Self::default(),
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), "no docker config: {}", err);
                return Self::default();
            }
        };

        match Self::from_json(&bytes) {
            Ok(store) => store,
            Err(err) => {
                warn!(path = %path.display(), "ignoring unreadable docker config: {}", err);
                Self::default()
            }
        }
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let config: DockerConfig = serde_json::from_slice(bytes)?;
        let registries = config
            .auths
            .iter()
            .filter_map(|(key, entry)| Some((normalize_registry(key), entry.credentials()?)))
            .collect();
        Ok(CredentialStore { registries })
    }

    pub fn lookup(&self, registry: &str) -> Option<&Credentials> {
        self.registries.get(&normalize_registry(registry))
    }
}

/// Reduce a registry key (`https://index.docker.io/v1/`, `ghcr.io`) to a host.
fn normalize_registry(key: &str) -> String {
    let key = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = key.split('/').next().unwrap_or(key);

    if DOCKER_HUB_ALIASES.contains(&host) {
        "docker.io".to_string()
    } else {
        host.to_string()
    }
}

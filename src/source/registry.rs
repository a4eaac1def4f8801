//! Blocking OCI distribution client
//!
//! Resolves a reference to its platform manifest and config, then hands out
//! layer blobs that stream straight from the registry when opened. Nothing is
//! written to disk.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use ureq::http::Response;
use ureq::{Agent, Body};

use super::auth::CredentialStore;
use super::reference::Reference;
use super::{parse_history, SourceOptions};
use crate::image::{BlobSource, Image, ImageSource, LayerHandle};
use crate::{Error, Result};

/// Manifest media types accepted when pulling.
const ACCEPT_MANIFEST: &str = "\
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json";

const ACCEPT_BLOB: &str = "*/*";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Operating system, architecture and optional variant (`linux/arm64/v8`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Platform {
    /// `linux` on the architecture this binary runs on.
    pub fn host() -> Self {
        let architecture = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "powerpc64" => "ppc64le",
            other => other,
        };
        Platform {
            os: "linux".to_string(),
            architecture: architecture.to_string(),
            variant: None,
        }
    }

    fn matches(&self, candidate: &ManifestPlatform) -> bool {
        candidate.os == self.os
            && candidate.architecture == self.architecture
            && match &self.variant {
                Some(variant) => candidate.variant.as_ref() == Some(variant),
                None => true,
            }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [os, arch] | [os, arch, _] if !os.is_empty() && !arch.is_empty() => Ok(Platform {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: parts.get(2).filter(|v| !v.is_empty()).map(|v| v.to_string()),
            }),
            _ => Err(format!("invalid platform {s:?}, expected os/arch[/variant]")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Descriptor {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    digest: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ImageManifest {
    config: Descriptor,
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct ManifestPlatform {
    architecture: String,
    os: String,
    #[serde(default)]
    variant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    digest: String,
    #[serde(default)]
    platform: Option<ManifestPlatform>,
}

#[derive(Debug, Deserialize)]
struct ImageIndex {
    manifests: Vec<IndexEntry>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// `WWW-Authenticate` challenge from a `401` response.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Challenge {
    scheme: String,
    params: HashMap<String, String>,
}

impl Challenge {
    fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, mut rest) = header.split_once(' ').unwrap_or((header, ""));
        let mut params = HashMap::new();

        loop {
            rest = rest.trim_start_matches([',', ' ']);
            if rest.is_empty() {
                break;
            }
            let (key, after) = rest.split_once('=')?;
            let (value, remainder) = match after.strip_prefix('"') {
                Some(quoted) => {
                    let end = quoted.find('"')?;
                    (&quoted[..end], &quoted[end + 1..])
                }
                None => after.split_at(after.find(',').unwrap_or(after.len())),
            };
            params.insert(key.trim().to_ascii_lowercase(), value.to_string());
            rest = remainder;
        }

        Some(Challenge {
            scheme: scheme.to_ascii_lowercase(),
            params,
        })
    }
}

/// Image source backed by a remote registry.
pub struct RegistrySource {
    agent: Agent,
    platform: Platform,
    credentials: CredentialStore,
    /// `Authorization` header values per registry/repository.
    authorizations: HashMap<String, String>,
}

impl RegistrySource {
    pub fn new(options: &SourceOptions) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build()
            .into();

        RegistrySource {
            agent,
            platform: options.platform.clone().unwrap_or_else(Platform::host),
            credentials: CredentialStore::load(options.docker_config.as_deref()),
            authorizations: HashMap::new(),
        }
    }

    fn fetch_manifest(&mut self, reference: &Reference) -> Result<ImageManifest> {
        let url = reference.manifest_url(reference.reference_str());
        let value: serde_json::Value = self.get_json(reference, &url, ACCEPT_MANIFEST)?;

        if value.get("manifests").is_none() {
            return decode(reference, "manifest", value);
        }

        let index: ImageIndex = decode(reference, "image index", value)?;
        let entry = index
            .manifests
            .iter()
            .find(|entry| entry.platform.as_ref().is_some_and(|p| self.platform.matches(p)))
            .ok_or_else(|| Error::FetchFailed {
                reference: reference.to_string(),
                reason: format!("no manifest for platform {}", self.platform),
            })?;
        debug!(digest = %entry.digest, platform = %self.platform, "selected platform manifest");

        let url = reference.manifest_url(&entry.digest);
        let value = self.get_json(reference, &url, ACCEPT_MANIFEST)?;
        decode(reference, "manifest", value)
    }

    fn get_json(&mut self, reference: &Reference, url: &str, accept: &str) -> Result<serde_json::Value> {
        let response = self.get(reference, url, accept)?;
        serde_json::from_reader(response.into_body().into_reader()).map_err(|e| Error::FetchFailed {
            reference: reference.to_string(),
            reason: format!("invalid JSON from {url}: {e}"),
        })
    }

    /// GET with the cached authorization, answering one auth challenge.
    fn get(&mut self, reference: &Reference, url: &str, accept: &str) -> Result<Response<Body>> {
        let scope = scope_key(reference);
        let cached = self.authorizations.get(&scope).map(String::as_str);
        let mut response = send(&self.agent, reference, url, accept, cached)?;

        if response.status() == 401 {
            let challenge = response
                .headers()
                .get("www-authenticate")
                .and_then(|value| value.to_str().ok())
                .and_then(Challenge::parse);
            let authorization = self.authorize(reference, challenge)?;
            response = send(&self.agent, reference, url, accept, Some(&authorization))?;
            self.authorizations.insert(scope, authorization);
        }

        if !response.status().is_success() {
            return Err(Error::FetchFailed {
                reference: reference.to_string(),
                reason: format!("GET {url}: HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    fn authorize(&self, reference: &Reference, challenge: Option<Challenge>) -> Result<String> {
        let credentials = self.credentials.lookup(&reference.registry);
        let unauthorized = |reason: &str| Error::FetchFailed {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let challenge = challenge.ok_or_else(|| unauthorized("unauthorized"))?;
        match challenge.scheme.as_str() {
            "basic" => credentials
                .map(|c| c.basic_authorization())
                .ok_or_else(|| unauthorized("registry requires credentials")),
            "bearer" => {
                let realm = challenge
                    .params
                    .get("realm")
                    .ok_or_else(|| unauthorized("auth challenge without realm"))?;
                let scope = challenge
                    .params
                    .get("scope")
                    .cloned()
                    .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));

                let mut request = self.agent.get(realm).query("scope", &scope);
                if let Some(service) = challenge.params.get("service") {
                    request = request.query("service", service);
                }
                if let Some(credentials) = credentials {
                    debug!(username = %credentials.username, "requesting token with credentials");
                    request = request.header("Authorization", credentials.basic_authorization());
                }

                let response = request.call().map_err(|e| unauthorized(&format!("token request failed: {e}")))?;
                if !response.status().is_success() {
                    return Err(unauthorized(&format!("token request failed: HTTP {}", response.status())));
                }
                let token: TokenResponse = serde_json::from_reader(response.into_body().into_reader())
                    .map_err(|e| unauthorized(&format!("invalid token response: {e}")))?;
                let token = token
                    .token
                    .or(token.access_token)
                    .ok_or_else(|| unauthorized("token response without token"))?;
                Ok(format!("Bearer {token}"))
            }
            other => Err(unauthorized(&format!("unsupported auth scheme {other}"))),
        }
    }
}

impl ImageSource for RegistrySource {
    fn resolve(&mut self, input: &str) -> Result<Image> {
        let reference = Reference::parse(input)?;
        info!(image = %reference, "pulling image");

        let manifest = self.fetch_manifest(&reference)?;

        let config_url = reference.blob_url(&manifest.config.digest);
        let mut config = Vec::new();
        self.get(&reference, &config_url, ACCEPT_BLOB)
            .map_err(|e| Error::ConfigUnavailable(e.to_string()))?
            .into_body()
            .into_reader()
            .read_to_end(&mut config)
            .map_err(|e| Error::ConfigUnavailable(e.to_string()))?;
        let history = parse_history(&config)?;

        let authorization = self.authorizations.get(&scope_key(&reference)).cloned();
        let layers = manifest
            .layers
            .into_iter()
            .map(|descriptor| {
                let blob = RegistryBlob {
                    agent: self.agent.clone(),
                    reference: reference.to_string(),
                    url: reference.blob_url(&descriptor.digest),
                    authorization: authorization.clone(),
                };
                let layer = LayerHandle::new(descriptor.digest, descriptor.size, Box::new(blob));
                match descriptor.media_type {
                    Some(media_type) => layer.with_media_type(media_type),
                    None => layer,
                }
            })
            .collect();

        Ok(Image::new(reference.to_string(), layers, history))
    }
}

/// A layer blob fetched over HTTP each time it is opened.
struct RegistryBlob {
    agent: Agent,
    reference: String,
    url: String,
    authorization: Option<String>,
}

impl fmt::Debug for RegistryBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBlob").field("url", &self.url).finish_non_exhaustive()
    }
}

impl BlobSource for RegistryBlob {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        debug!(url = %self.url, "opening layer blob");
        let mut request = self.agent.get(&self.url).header("Accept", ACCEPT_BLOB);
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization);
        }

        let fetch_failed = |reason: String| Error::FetchFailed {
            reference: self.reference.clone(),
            reason,
        };
        let response = request.call().map_err(|e| fetch_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_failed(format!("GET {}: HTTP {}", self.url, response.status())));
        }
        Ok(Box::new(response.into_body().into_reader()))
    }
}

fn send(
    agent: &Agent,
    reference: &Reference,
    url: &str,
    accept: &str,
    authorization: Option<&str>,
) -> Result<Response<Body>> {
    let mut request = agent.get(url).header("Accept", accept);
    if let Some(authorization) = authorization {
        request = request.header("Authorization", authorization);
    }
    request.call().map_err(|e| Error::FetchFailed {
        reference: reference.to_string(),
        reason: format!("GET {url}: {e}"),
    })
}

fn scope_key(reference: &Reference) -> String {
    format!("{}/{}", reference.registry, reference.repository)
}

fn decode<T: serde::de::DeserializeOwned>(
    reference: &Reference,
    what: &str,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::FetchFailed {
        reference: reference.to_string(),
        reason: format!("unsupported {what}: {e}"),
    })
}

//! Docker-style image references
//!
//! - `alpine` -> `docker.io/library/alpine:latest`
//! - `alpine:3.20` -> `docker.io/library/alpine:3.20`
//! - `ghcr.io/org/app:v1` -> `ghcr.io/org/app:v1`
//! - `localhost:5000/app@sha256:...` -> pinned by digest on a local registry

use std::fmt;

use crate::{Error, Result};

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";
const OFFICIAL_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Tag(String),
    Digest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Registry host, with port if any (`docker.io`, `localhost:5000`).
    pub registry: String,
    /// Repository path (`library/alpine`).
    pub repository: String,
    pub identifier: Identifier,
}

impl Reference {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidReference("empty reference".into()));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(Error::InvalidReference(format!("{input:?} contains whitespace")));
        }

        let (name, digest) = match input.split_once('@') {
            Some((name, digest)) => {
                if !is_digest(digest) {
                    return Err(Error::InvalidReference(format!("invalid digest: {digest}")));
                }
                (name, Some(digest))
            }
            None => (input, None),
        };

        let (registry, remainder) = match name.split_once('/') {
            Some((host, rest)) if looks_like_host(host) => (host.to_string(), rest),
            _ => (DOCKER_HUB.to_string(), name),
        };

        // A colon after the last slash separates the tag
        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
            _ => (remainder, None),
        };

        if repository.is_empty() || repository.starts_with('/') || repository.ends_with('/') {
            return Err(Error::InvalidReference(format!("invalid repository in {input}")));
        }
        if tag.is_some_and(str::is_empty) {
            return Err(Error::InvalidReference(format!("empty tag in {input}")));
        }

        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("{OFFICIAL_NAMESPACE}/{repository}")
        } else {
            repository.to_string()
        };

        let identifier = match (digest, tag) {
            (Some(digest), _) => Identifier::Digest(digest.to_string()),
            (None, Some(tag)) => Identifier::Tag(tag.to_string()),
            (None, None) => Identifier::Tag(DEFAULT_TAG.to_string()),
        };

        Ok(Reference {
            registry,
            repository,
            identifier,
        })
    }

    /// Base URL of the registry's v2 API.
    pub fn api_base(&self) -> String {
        let host = if self.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            self.registry.as_str()
        };
        let scheme = if is_loopback(host) { "http" } else { "https" };
        format!("{scheme}://{host}/v2")
    }

    /// Tag or digest, as used in manifest URLs.
    pub fn reference_str(&self) -> &str {
        match &self.identifier {
            Identifier::Tag(value) | Identifier::Digest(value) => value,
        }
    }

    pub fn manifest_url(&self, reference: &str) -> String {
        format!("{}/{}/manifests/{}", self.api_base(), self.repository, reference)
    }

    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/{}/blobs/{}", self.api_base(), self.repository, digest)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        match &self.identifier {
            Identifier::Tag(tag) => write!(f, ":{tag}"),
            Identifier::Digest(digest) => write!(f, "@{digest}"),
        }
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn is_loopback(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name == "127.0.0.1"
}

fn is_digest(value: &str) -> bool {
    match value.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty() && !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

// ABOUTME: Container image reference parsing and registry normalisation.
// ABOUTME: Handles nginx, nginx:tag, host:port/path/image:tag@digest and Docker Hub defaults.

use std::fmt;
use thiserror::Error;

/// Registry host that Docker Hub references resolve to.
pub const DOCKER_HUB_HOST: &str = "index.docker.io";

const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// A parsed `host/path:tag@digest` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric()
                && c != '/'
                && c != ':'
                && c != '.'
                && c != '-'
                && c != '_'
                && c != '@'
            {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after.to_string())),
            _ => (without_digest, None),
        };

        if without_tag.is_empty() || without_tag.ends_with('/') {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        let (registry, name) = Self::parse_registry_and_name(without_tag)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    fn parse_registry_and_name(
        input: &str,
    ) -> Result<(Option<String>, String), ParseImageRefError> {
        // The first component is a registry if it contains a dot or a port, or is localhost.
        let parts: Vec<&str> = input.splitn(2, '/').collect();

        match parts.as_slice() {
            [name] => Ok((None, (*name).to_string())),
            [first, rest] => {
                if first.contains('.') || first.contains(':') || *first == "localhost" {
                    Ok((Some((*first).to_string()), (*rest).to_string()))
                } else {
                    Ok((None, input.to_string()))
                }
            }
            _ => Err(ParseImageRefError::InvalidFormat(input.to_string())),
        }
    }

    /// Registry component as written, if any.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry host used for API calls, with Docker Hub aliases collapsed.
    pub fn registry_host(&self) -> String {
        match self.registry.as_deref() {
            None => DOCKER_HUB_HOST.to_string(),
            Some(registry) => normalize_registry(registry),
        }
    }

    /// Repository path inside the registry. Single-segment Docker Hub images live under `library/`.
    pub fn repository_path(&self) -> String {
        if self.registry_host() == DOCKER_HUB_HOST && !self.name.contains('/') {
            format!("library/{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// True when the image is served by Docker Hub.
    pub fn is_docker_hub(&self) -> bool {
        self.registry_host() == DOCKER_HUB_HOST
    }
}

/// Collapses Docker Hub host aliases onto `index.docker.io`, keeping any port.
pub fn normalize_registry(registry: &str) -> String {
    let registry = registry
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let (host, port) = match registry.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => (host, Some(port)),
        _ => (registry, None),
    };
    let host = match host {
        "docker.io" | "registry-1.docker.io" => DOCKER_HUB_HOST,
        other => other,
    };
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_defaults_to_hub_library_and_latest() {
        let image = ImageRef::parse("nginx").unwrap();
        assert_eq!(image.registry_host(), "index.docker.io");
        assert_eq!(image.repository_path(), "library/nginx");
        assert_eq!(image.tag(), Some("latest"));
    }

    #[test]
    fn registry_with_port_is_not_a_tag() {
        let image = ImageRef::parse("localhost:5000/team/app").unwrap();
        assert_eq!(image.registry(), Some("localhost:5000"));
        assert_eq!(image.name(), "team/app");
        assert_eq!(image.tag(), Some("latest"));
    }

    #[test]
    fn docker_io_aliases_collapse() {
        assert_eq!(normalize_registry("docker.io"), "index.docker.io");
        assert_eq!(normalize_registry("registry-1.docker.io"), "index.docker.io");
        assert_eq!(normalize_registry("ghcr.io"), "ghcr.io");
        assert_eq!(normalize_registry("reg.local:5000"), "reg.local:5000");
    }

    #[test]
    fn explicit_hub_namespace_keeps_path() {
        let image = ImageRef::parse("docker.io/containrrr/watchtower:1.7").unwrap();
        assert!(image.is_docker_hub());
        assert_eq!(image.repository_path(), "containrrr/watchtower");
        assert_eq!(image.tag(), Some("1.7"));
    }

    #[test]
    fn rejects_trailing_slash() {
        assert!(ImageRef::parse("ghcr.io/").is_err());
    }
}

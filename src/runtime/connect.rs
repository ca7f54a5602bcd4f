// ABOUTME: Engine connection settings: host, request timeout, API version pin and TLS client files.
// ABOUTME: ApiVersion parses "major.minor" and orders versions so a floor can be enforced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine API version as `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: usize,
    pub minor: usize,
}

impl ApiVersion {
    /// Oldest engine API the update flow works against.
    pub const MINIMUM: ApiVersion = ApiVersion {
        major: 1,
        minor: 25,
    };

    /// Parses `"1.41"`. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let (major, minor) = value.trim().split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Client key, client certificate and CA bundle used for TLS verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub key: PathBuf,
    pub cert: PathBuf,
    pub ca: PathBuf,
}

impl TlsFiles {
    /// The engine CLI layout: `key.pem`, `cert.pem` and `ca.pem` in one directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            key: dir.join("key.pem"),
            cert: dir.join("cert.pem"),
            ca: dir.join("ca.pem"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    /// Bounds every individual engine call.
    pub timeout: Duration,
    /// Pinned API version; the client library default when unset.
    pub api_version: Option<ApiVersion>,
    pub tls: Option<TlsFiles>,
}

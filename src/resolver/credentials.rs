// ABOUTME: Registry credential lookup: REPO_USER/REPO_PASS first, then the engine client config.
// ABOUTME: Understands plain auths entries, credsStore and per-registry credHelpers.

use crate::config::resolve_secret;
use crate::runtime::RegistryAuth;
use crate::types::{DOCKER_HUB_HOST, ImageRef, normalize_registry};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const REPO_USER_ENV: &str = "REPO_USER";
pub const REPO_PASS_ENV: &str = "REPO_PASS";
pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// Server key the engine client uses for Docker Hub.
const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("malformed auth entry for {0}")]
    MalformedAuth(String),

    #[error("credential helper {helper} failed: {message}")]
    Helper { helper: String, message: String },
}

/// Source of registry credentials for an image.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means anonymous access.
    async fn lookup(&self, image: &ImageRef) -> Result<Option<RegistryAuth>, CredentialError>;
}

/// Subset of the engine client's `config.json` that carries credentials.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    creds_store: Option<String>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

/// Environment variables, then `$DOCKER_CONFIG/config.json`.
#[derive(Debug, Clone)]
pub struct DockerCredentials {
    config_dir: PathBuf,
}

impl DockerCredentials {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Uses `DOCKER_CONFIG`, falling back to `/` where the config is mounted in a container.
    pub fn from_env() -> Self {
        let dir = std::env::var(DOCKER_CONFIG_ENV)
            .ok()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "/".to_string());
        Self::new(dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    fn from_env_vars() -> Option<RegistryAuth> {
        let username = std::env::var(REPO_USER_ENV).ok()?;
        let raw = std::env::var(REPO_PASS_ENV).ok()?;
        let password = resolve_secret(&raw).unwrap_or(raw);
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(RegistryAuth {
            username,
            password,
            server: None,
        })
    }

    async fn read_config(path: &Path) -> Result<Option<ClientConfig>, CredentialError> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialError::ReadConfig {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|source| CredentialError::ParseConfig {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl CredentialSource for DockerCredentials {
    async fn lookup(&self, image: &ImageRef) -> Result<Option<RegistryAuth>, CredentialError> {
        if let Some(auth) = Self::from_env_vars() {
            tracing::debug!(user = %auth.username, image = %image, "Using registry credentials from environment");
            return Ok(Some(auth));
        }

        let path = self.config_path();
        let Some(config) = Self::read_config(&path).await? else {
            tracing::debug!(path = %path.display(), "No client config found, using anonymous access");
            return Ok(None);
        };

        let host = image.registry_host();
        let server = server_key(&host);

        let helper = config
            .cred_helpers
            .iter()
            .find(|(key, _)| registry_of(key) == host)
            .map(|(_, helper)| helper.clone())
            .or_else(|| config.creds_store.clone());
        if let Some(helper) = helper {
            return run_helper(&helper, &server).await;
        }

        let entry = config
            .auths
            .iter()
            .find(|(key, _)| registry_of(key) == host)
            .map(|(_, entry)| entry);
        match entry {
            Some(entry) => decode_entry(&host, entry).map(Some),
            None => {
                tracing::debug!(registry = %host, path = %path.display(), "No credentials found");
                Ok(None)
            }
        }
    }
}

/// Normalised registry host of a config key such as `https://index.docker.io/v1/`.
fn registry_of(key: &str) -> String {
    let key = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = key.split('/').next().unwrap_or(key);
    normalize_registry(host)
}

fn server_key(host: &str) -> String {
    if host == DOCKER_HUB_HOST {
        DOCKER_HUB_SERVER.to_string()
    } else {
        host.to_string()
    }
}

fn decode_entry(host: &str, entry: &AuthEntry) -> Result<RegistryAuth, CredentialError> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Ok(RegistryAuth {
            username: username.clone(),
            password: password.clone(),
            server: Some(host.to_string()),
        });
    }
    let encoded = entry
        .auth
        .as_deref()
        .ok_or_else(|| CredentialError::MalformedAuth(host.to_string()))?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CredentialError::MalformedAuth(host.to_string()))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| CredentialError::MalformedAuth(host.to_string()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| CredentialError::MalformedAuth(host.to_string()))?;
    Ok(RegistryAuth {
        username: username.to_string(),
        password: password.to_string(),
        server: Some(host.to_string()),
    })
}

async fn run_helper(helper: &str, server: &str) -> Result<Option<RegistryAuth>, CredentialError> {
    let program = format!("docker-credential-{}", helper);
    let helper_error = |message: String| CredentialError::Helper {
        helper: program.clone(),
        message,
    };

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| helper_error(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(server.as_bytes())
            .await
            .map_err(|e| helper_error(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| helper_error(e.to_string()))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("credentials not found") {
            return Ok(None);
        }
        return Err(helper_error(stdout.trim().to_string()));
    }

    let response: HelperResponse =
        serde_json::from_slice(&output.stdout).map_err(|e| helper_error(e.to_string()))?;
    Ok(Some(RegistryAuth {
        username: response.username,
        password: response.secret,
        server: Some(server.to_string()),
    }))
}

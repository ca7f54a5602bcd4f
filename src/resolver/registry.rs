// ABOUTME: Registry v2 client used for the HEAD digest shortcut.
// ABOUTME: Performs the /v2/ challenge, fetches a pull token and reads Docker-Content-Digest.

use super::challenge::Challenge;
use crate::runtime::RegistryAuth;
use crate::types::ImageRef;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

const USER_AGENT: &str = "Watchtower (Docker)";

/// Manifest media types accepted by the HEAD request.
const ACCEPT_MANIFEST: [&str; 3] = [
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

const CONTENT_DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Default timeout for challenge, token and HEAD requests.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported challenge type from registry: {0}")]
    UnsupportedChallenge(String),

    #[error("could not fetch token: {0}")]
    Token(String),

    #[error("registry responded to head request with {0}")]
    Status(u16),

    #[error("registry response carried no {CONTENT_DIGEST_HEADER} header")]
    MissingDigest,

    #[error("image reference {0} has neither tag nor digest")]
    NoReference(String),
}

/// Looks up the digest a registry currently serves for an image reference.
#[async_trait]
pub trait DigestLookup: Send + Sync {
    async fn latest_digest(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<String, RegistryError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
}

/// How a HEAD request authenticates after the challenge.
enum Authorization {
    Bearer(String),
    Basic(RegistryAuth),
    Anonymous,
}

/// HTTPS registry client. One instance is shared by every resolution.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn authorize(
        &self,
        host: &str,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<Authorization, RegistryError> {
        let url = format!("https://{}/v2/", host);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "*/*")
            .send()
            .await?;

        let header_value = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        debug!(status = %response.status(), challenge = %header_value, "Got response to challenge request");

        match Challenge::parse(&header_value) {
            Some(Challenge::Bearer { realm, service, .. }) => {
                self.bearer_token(&realm, service.as_deref(), image, auth)
                    .await
                    .map(Authorization::Bearer)
            }
            Some(Challenge::Basic) => match auth {
                Some(auth) => Ok(Authorization::Basic(auth.clone())),
                None => Err(RegistryError::Token(
                    "registry requires basic credentials".to_string(),
                )),
            },
            Some(Challenge::None) => Ok(Authorization::Anonymous),
            None => Err(RegistryError::UnsupportedChallenge(header_value)),
        }
    }

    #[instrument(skip(self, auth), fields(image = %image))]
    async fn bearer_token(
        &self,
        realm: &str,
        service: Option<&str>,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<String, RegistryError> {
        let scope = format!("repository:{}:pull", image.repository_path());
        let mut request = self.client.get(realm).query(&[("scope", scope.as_str())]);
        if let Some(service) = service {
            request = request.query(&[("service", service)]);
        }
        match auth {
            Some(auth) => {
                debug!(user = %auth.username, "Found credentials, adding basic auth");
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            None => debug!("No credentials found, doing an anonymous request"),
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Token(format!(
                "token endpoint responded with {}",
                response.status()
            )));
        }
        let body: TokenResponse = response.json().await?;
        if body.token.is_empty() {
            return Err(RegistryError::Token("empty token".to_string()));
        }
        Ok(body.token)
    }
}

#[async_trait]
impl DigestLookup for RegistryClient {
    #[instrument(skip(self, auth), fields(image = %image))]
    async fn latest_digest(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<String, RegistryError> {
        let reference = image
            .tag()
            .or(image.digest())
            .ok_or_else(|| RegistryError::NoReference(image.to_string()))?;
        let host = image.registry_host();

        let authorization = self.authorize(&host, image, auth).await?;

        let url = format!(
            "https://{}/v2/{}/manifests/{}",
            host,
            image.repository_path(),
            reference
        );
        debug!(url = %url, "Doing a HEAD request to fetch a digest");

        let mut request = self
            .client
            .head(&url)
            .header(header::ACCEPT, ACCEPT_MANIFEST.join(", "));
        request = match authorization {
            Authorization::Bearer(token) => request.bearer_auth(token),
            Authorization::Basic(auth) => request.basic_auth(auth.username, Some(auth.password)),
            Authorization::Anonymous => request,
        };

        let response = request.send().await?;
        digest_from_head(response.status(), response.headers())
    }
}

/// Reads the digest out of a manifest HEAD response. Any 2xx status counts.
fn digest_from_head(status: StatusCode, headers: &header::HeaderMap) -> Result<String, RegistryError> {
    if !status.is_success() {
        return Err(RegistryError::Status(status.as_u16()));
    }
    headers
        .get(CONTENT_DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(RegistryError::MissingDigest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn with_digest(digest: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DIGEST_HEADER, HeaderValue::from_str(digest).unwrap());
        headers
    }

    #[test]
    fn any_success_status_yields_the_digest() {
        let headers = with_digest("sha256:abc");
        for status in [StatusCode::OK, StatusCode::ACCEPTED, StatusCode::NON_AUTHORITATIVE_INFORMATION] {
            assert_eq!(digest_from_head(status, &headers).unwrap(), "sha256:abc");
        }
    }

    #[test]
    fn error_status_is_reported() {
        let err = digest_from_head(StatusCode::NOT_FOUND, &with_digest("sha256:abc")).unwrap_err();
        assert!(matches!(err, RegistryError::Status(404)));
    }

    #[test]
    fn missing_header_is_an_error() {
        let err = digest_from_head(StatusCode::OK, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, RegistryError::MissingDigest));
    }
}

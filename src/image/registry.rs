//! Container registry client

use crate::error::{require, DbdockError, Result};
use serde::Deserialize;
use tracing::debug;

/// Docker Hub's registry API endpoint
pub const DOCKER_HUB_URL: &str = "https://registry-1.docker.io";

/// Registry client for read-only queries
pub struct RegistryClient {
    /// Registry base URL, e.g. `https://mcr.microsoft.com`
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

/// Token response from auth server
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Tags list response
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[allow(dead_code)]
    name: String,
    tags: Option<Vec<String>>,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(base_url: &str) -> Result<Self> {
        require(base_url, "registry URL")?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("dbdock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", base_url.trim_end_matches('/'))
        };

        Ok(Self { base_url, client })
    }

    /// Create a client for Docker Hub
    pub fn docker_hub() -> Result<Self> {
        Self::new(DOCKER_HUB_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List tags for a repository
    ///
    /// Registries that answer `401` with a bearer challenge get one retry with
    /// an anonymous pull token.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        require(repository, "repository")?;
        let url = format!("{}/v2/{}/tags/list", self.base_url, repository);
        debug!("GET {}", url);

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_bearer_challenge)
                .ok_or_else(|| {
                    DbdockError::Network(format!("{} requires authentication", url))
                })?;

            let token = self.fetch_token(&challenge, repository).await?;

            response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| DbdockError::Network(e.to_string()))?;
        }

        if !response.status().is_success() {
            return Err(DbdockError::Network(format!(
                "Failed to list tags for {}: {}",
                repository,
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        Ok(tags.tags.unwrap_or_default())
    }

    /// Fetch an anonymous token for the challenge
    async fn fetch_token(&self, challenge: &BearerChallenge, repository: &str) -> Result<String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", repository));

        let mut params = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            params.push(("service", service.clone()));
        }

        debug!("Requesting token from {}", challenge.realm);
        let response = self
            .client
            .get(&challenge.realm)
            .query(&params)
            .send()
            .await
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DbdockError::Network(format!(
                "Token request failed: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        token
            .token
            .or(token.access_token)
            .ok_or_else(|| DbdockError::Network("Token response carried no token".to_string()))
    }
}

/// Parse a `Bearer realm="..",service="..",scope=".."` header value
pub(crate) fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;

    for (key, value) in split_params(params) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

/// Split `k="v",k2=v2` pairs, honouring commas inside quotes
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in params.chars().chain(std::iter::once(',')) {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                if let Some((k, v)) = current.split_once('=') {
                    pairs.push((k.trim().to_string(), v.trim().to_string()));
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    pairs
}

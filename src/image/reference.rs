//! Image references (`registry/repository:tag`)

use crate::error::{DbdockError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Registry assumed when a reference names none
pub const DEFAULT_REGISTRY: &str = "docker.io";
/// Tag assumed when a reference names none
pub const DEFAULT_TAG: &str = "latest";

const REPOSITORY_PATTERN: &str =
    r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$";
const TAG_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$";

static REPOSITORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REPOSITORY_PATTERN).expect("repository pattern is valid"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TAG_PATTERN).expect("tag pattern is valid"));

/// Fully qualified image address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: String,
}

fn invalid(reference: &str, message: impl Into<String>) -> DbdockError {
    DbdockError::InvalidReference {
        reference: reference.to_string(),
        message: message.into(),
    }
}

/// A leading path component names a registry when it looks like a host
fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl ImageReference {
    /// Build a reference from its parts
    pub fn new(registry: &str, repository: &str, tag: &str) -> Result<Self> {
        let reference = Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        };
        reference.validate()?;
        Ok(reference)
    }

    /// Parse an address, filling in the default registry and tag
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(invalid(input, "image reference must not be empty"));
        }
        if input.contains('@') {
            return Err(invalid(input, "digest references are not supported"));
        }

        let (registry, remainder) = match input.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first.to_string(), rest),
            _ => (DEFAULT_REGISTRY.to_string(), input),
        };

        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&remainder[..split], &remainder[split + 1..])
            }
            None => (remainder, DEFAULT_TAG),
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository.to_string()
        };

        let reference = Self {
            registry,
            repository,
            tag: tag.to_string(),
        };
        reference.validate().map_err(|e| match e {
            DbdockError::InvalidReference { message, .. } => invalid(input, message),
            other => other,
        })?;

        Ok(reference)
    }

    fn validate(&self) -> Result<()> {
        let full = self.to_string();
        if self.registry.is_empty() || self.registry.chars().any(char::is_whitespace) {
            return Err(invalid(&full, "registry must be a host name"));
        }
        if self.repository.is_empty() {
            return Err(invalid(&full, "repository must not be empty"));
        }
        if !REPOSITORY_RE.is_match(&self.repository) {
            return Err(invalid(
                &full,
                "repository may only contain lowercase letters, digits and separators",
            ));
        }
        if !TAG_RE.is_match(&self.tag) {
            return Err(invalid(&full, "tag is malformed"));
        }
        Ok(())
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Base URL of the registry's HTTP API
    pub fn registry_url(&self) -> String {
        if self.registry == DEFAULT_REGISTRY {
            "https://registry-1.docker.io".to_string()
        } else {
            format!("https://{}", self.registry)
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = DbdockError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

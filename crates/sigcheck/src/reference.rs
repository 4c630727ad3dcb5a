//! Artifact reference parsing.
//!
//! Supported formats:
//! - `registry.example/app:v1` → tag
//! - `registry.example/team/app@sha256:abc...` → digest
//! - `localhost:5000/app:v1@sha256:abc...` → digest (the tag is dropped)
//!
//! A registry host is always required; there is no default registry.

use crate::digest::is_valid_digest;
use crate::error::{ClientError, ClientResult};

/// Tag or digest part of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(String),
}

impl Reference {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::Digest(digest) => digest,
        }
    }
}

/// A parsed `registry/repository(:tag|@digest)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub registry: String,
    pub repository: String,
    pub reference: Reference,
}

impl ArtifactRef {
    /// Parse an artifact reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigcheck::{ArtifactRef, Reference};
    ///
    /// let tagged = ArtifactRef::parse("registry.example/app:v1").unwrap();
    /// assert_eq!(tagged.registry, "registry.example");
    /// assert_eq!(tagged.reference, Reference::Tag("v1".into()));
    ///
    /// assert!(ArtifactRef::parse("registry.example/app").is_err());
    /// ```
    pub fn parse(reference: &str) -> ClientResult<Self> {
        let input = reference.trim();
        let invalid = |reason: &str| ClientError::InvalidReference {
            reference: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (registry, rest) = input
            .split_once('/')
            .ok_or_else(|| invalid("missing registry host"))?;
        if !is_registry_host(registry) {
            return Err(invalid("missing registry host"));
        }

        let (name, reference) = match rest.split_once('@') {
            Some((name, digest)) => {
                if !is_valid_digest(digest) {
                    return Err(invalid("digest must be sha256:<64 hex> or sha512:<128 hex>"));
                }
                let (name, _tag) = split_tag(name);
                (name, Reference::Digest(digest.to_string()))
            }
            None => match split_tag(rest) {
                (name, Some(tag)) => {
                    validate_tag(tag).map_err(invalid)?;
                    (name, Reference::Tag(tag.to_string()))
                }
                (_, None) => return Err(invalid("tag or digest is required")),
            },
        };

        validate_repository(name).map_err(invalid)?;

        Ok(Self {
            registry: registry.to_string(),
            repository: name.to_string(),
            reference,
        })
    }

    /// `/v2/<repository>/manifests/<reference>`
    pub fn manifest_path(&self) -> String {
        format!(
            "/v2/{}/manifests/{}",
            self.repository,
            self.reference.as_str()
        )
    }

    pub fn digest(&self) -> Option<&str> {
        match &self.reference {
            Reference::Digest(d) => Some(d),
            Reference::Tag(_) => None,
        }
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}/{}:{}", self.registry, self.repository, tag),
            Reference::Digest(d) => write!(f, "{}/{}@{}", self.registry, self.repository, d),
        }
    }
}

impl std::str::FromStr for ArtifactRef {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_registry_host(host: &str) -> bool {
    host == "localhost" || host.contains('.') || host.contains(':')
}

/// Split `name:tag`; a colon before the last slash is not a tag separator.
fn split_tag(name: &str) -> (&str, Option<&str>) {
    let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[last_slash..].rfind(':') {
        Some(i) => (&name[..last_slash + i], Some(&name[last_slash + i + 1..])),
        None => (name, None),
    }
}

fn validate_repository(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("repository cannot be empty");
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err("repository has an empty path component");
        }
        if !component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        {
            return Err("repository may only contain lowercase letters, digits, '.', '_' and '-'");
        }
        if !component.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err("repository components must start with a letter or digit");
        }
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), &'static str> {
    if tag.is_empty() || tag.len() > 128 {
        return Err("tag must be 1 to 128 characters");
    }
    if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err("tag may only contain letters, digits, '.', '_' and '-'");
    }
    Ok(())
}

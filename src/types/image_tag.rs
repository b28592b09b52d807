// ABOUTME: Repository tag parsing for push requests.
// ABOUTME: Splits "registry:5000/org/app:v1" into repository and tag parts.

use std::fmt;
use thiserror::Error;

/// Placeholder the engine uses for images that carry no repository tag.
pub const UNTAGGED: &str = "<none>:<none>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageTagError {
    #[error("image tag cannot be empty")]
    Empty,

    #[error("image has no repository tag: {0}")]
    Untagged(String),

    #[error("invalid character in image tag: '{0}'")]
    InvalidChar(char),
}

/// A repository tag as reported by the engine (`RepoTags`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    repository: String,
    tag: Option<String>,
}

impl ImageTag {
    pub fn parse(input: &str) -> Result<Self, ImageTagError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ImageTagError::Empty);
        }
        if input == UNTAGGED || input.starts_with("<none>") {
            return Err(ImageTagError::Untagged(input.to_string()));
        }

        if let Some(c) = input.chars().find(|c| {
            !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_')
        }) {
            return Err(ImageTagError::InvalidChar(c));
        }

        // A colon followed by a path segment belongs to a registry port.
        let (repository, tag) = match input.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag.to_string())),
            _ => (input, None),
        };

        Ok(Self {
            repository: repository.to_string(),
            tag,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Fill in `latest` when no tag was given.
    pub fn or_latest(mut self) -> Self {
        if self.tag.is_none() {
            self.tag = Some("latest".to_string());
        }
        self
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

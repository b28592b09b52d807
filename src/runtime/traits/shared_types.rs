// ABOUTME: Shared types used across engine trait definitions.
// ABOUTME: Image and container summaries, registry credentials, push progress events.

use crate::types::{ContainerId, ImageId};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use crate::runtime::EngineError;

/// An image as reported by the engine's image list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: ImageId,
    /// Repository tags; empty for untagged or intermediate images.
    pub repo_tags: Vec<String>,
    /// Size in bytes.
    pub size: u64,
    /// Creation time as Unix epoch seconds.
    pub created: i64,
}

/// A container and the image it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub image_id: ImageId,
}

/// Result of inspecting a single image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetail {
    pub id: ImageId,
    pub repo_tags: Vec<String>,
    /// Size in bytes.
    pub size: u64,
}

/// Default registry used when none is configured.
pub const DEFAULT_REGISTRY: &str = "https://index.docker.io/v1/";

/// Registry login credentials.
#[derive(Clone, Serialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    #[serde(rename = "serveraddress")]
    pub server: String,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server: DEFAULT_REGISTRY.to_string(),
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Encode for the `X-Registry-Auth` header: URL-safe base64 of the JSON form.
    pub fn encode(&self) -> Result<EncodedAuth, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(EncodedAuth(URL_SAFE.encode(json)))
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Credential material ready to send to the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedAuth(String);

impl EncodedAuth {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncodedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedAuth(<redacted>)")
    }
}

/// One event from the engine's push progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressEvent {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default, rename = "progressDetail")]
    pub progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProgressEvent {
    /// The in-band error this event carries, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|e| !e.is_empty())
            .or_else(|| {
                self.error_detail
                    .as_ref()
                    .and_then(|d| d.message.as_deref())
                    .filter(|e| !e.is_empty())
            })
    }
}

/// Lazy, finite, non-restartable sequence of push progress events.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<ProgressEvent, EngineError>> + Send>>;

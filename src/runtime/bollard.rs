// ABOUTME: Bollard-based engine adapter for Docker and Podman.
// ABOUTME: Registry login and push go over raw HTTP/1 on the same Unix socket.

use crate::runtime::progress::decode_progress;
use crate::runtime::traits::{
    ContainerOps, ContainerSummary, EncodedAuth, ImageDetail, ImageOps, ImageSummary,
    ProgressStream, RegistryCredentials, RegistryOps,
};
use crate::runtime::types::{RuntimeInfo, RuntimeType};
use crate::runtime::EngineError;
use crate::types::{ContainerId, ImageId, ImageTag};
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    ListContainersOptions, ListImagesOptions, RemoveImageOptions, TagImageOptions,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::UnixStream;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_bollard_error(e: bollard::errors::Error, subject: &str) -> EngineError {
    use bollard::errors::Error;

    match e {
        Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(format!("{}: {}", subject, message)),
        Error::DockerResponseServerError {
            status_code: 401,
            message,
        } => EngineError::Unauthorized(message),
        Error::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Runtime(format!("{}: status {}: {}", subject, status_code, message)),
        Error::RequestTimeoutError => EngineError::Timeout(subject.to_string()),
        e @ (Error::IOError { .. }
        | Error::HyperResponseError { .. }
        | Error::SocketNotFoundError(_)) => EngineError::Connection(e.to_string()),
        e => EngineError::Runtime(format!("{}: {}", subject, e)),
    }
}

fn map_status(status: StatusCode, subject: &str, message: String) -> EngineError {
    match status {
        StatusCode::NOT_FOUND => EngineError::NotFound(format!("{}: {}", subject, message)),
        StatusCode::UNAUTHORIZED => EngineError::Unauthorized(message),
        _ => EngineError::Runtime(format!(
            "{}: status {}: {}",
            subject,
            status.as_u16(),
            message
        )),
    }
}

/// Pull the `message` out of an engine error body, falling back to raw text.
async fn read_error_message(body: Incoming) -> String {
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return format!("failed to read error response: {}", e),
    };

    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(&bytes)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string())
}

// =============================================================================
// BollardEngine
// =============================================================================

/// Engine adapter built on bollard.
///
/// One value is one request's connection to the engine. Dropping it
/// releases the client.
pub struct BollardEngine {
    client: Docker,
    runtime_type: RuntimeType,
    socket_path: String,
    timeout: Duration,
}

impl BollardEngine {
    /// Connect to the engine described by `info`.
    pub fn connect(info: &RuntimeInfo, timeout: Duration) -> Result<Self, EngineError> {
        let client =
            Docker::connect_with_unix(&info.socket_path, timeout.as_secs(), bollard::API_DEFAULT_VERSION)
                .map_err(|e| map_bollard_error(e, &info.socket_path))?;

        Ok(Self {
            client,
            runtime_type: info.runtime_type,
            socket_path: info.socket_path.clone(),
            timeout,
        })
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Send one request over a fresh HTTP/1 connection to the engine socket.
    ///
    /// The timeout covers connecting and receiving response headers only;
    /// streamed bodies are bounded by the engine.
    async fn send_raw(
        &self,
        request: hyper::Request<Full<Bytes>>,
    ) -> Result<hyper::Response<Incoming>, EngineError> {
        let exchange = async {
            let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
                EngineError::Connection(format!("{}: {}", self.socket_path, e))
            })?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| EngineError::Connection(format!("HTTP handshake failed: {}", e)))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::warn!("engine connection error: {}", e);
                }
            });

            sender
                .send_request(request)
                .await
                .map_err(|e| EngineError::Connection(format!("request failed: {}", e)))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout(format!("no response within {:?}", self.timeout)))?
    }
}

fn build_request(
    uri: &str,
    headers: &[(&str, &str)],
    body: Bytes,
) -> Result<hyper::Request<Full<Bytes>>, EngineError> {
    let mut builder = hyper::Request::builder()
        .method("POST")
        .uri(uri)
        .header("Host", "localhost")
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Full::new(body))
        .map_err(|e| EngineError::Runtime(format!("failed to build request: {}", e)))
}

#[async_trait]
impl ImageOps for BollardEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        let opts = ListImagesOptions {
            all: true,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(opts))
            .await
            .map_err(|e| map_bollard_error(e, "list images"))?;

        Ok(images
            .into_iter()
            .map(|img| ImageSummary {
                id: ImageId::new(img.id),
                repo_tags: img.repo_tags,
                size: u64::try_from(img.size).unwrap_or(0),
                created: img.created,
            })
            .collect())
    }

    async fn inspect_image(&self, id: &str) -> Result<ImageDetail, EngineError> {
        let details = self
            .client
            .inspect_image(id)
            .await
            .map_err(|e| map_bollard_error(e, id))?;

        Ok(ImageDetail {
            id: ImageId::new(details.id.unwrap_or_else(|| id.to_string())),
            repo_tags: details.repo_tags.unwrap_or_default(),
            size: details
                .size
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }

    async fn tag_image(&self, id: &str, tag: &ImageTag) -> Result<(), EngineError> {
        let opts = TagImageOptions {
            repo: Some(tag.repository().to_string()),
            tag: tag.tag().map(str::to_string),
        };

        self.client
            .tag_image(id, Some(opts))
            .await
            .map_err(|e| map_bollard_error(e, id))?;

        Ok(())
    }

    async fn remove_image(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let opts = RemoveImageOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_image(id, Some(opts), None)
            .await
            .map_err(|e| map_bollard_error(e, id))?;

        Ok(())
    }
}

#[async_trait]
impl ContainerOps for BollardEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let opts = ListContainersOptions {
            all,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| map_bollard_error(e, "list containers"))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let image_id = c.image_id?;
                Some(ContainerSummary {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    image_id: ImageId::new(image_id),
                })
            })
            .collect())
    }
}

#[async_trait]
impl RegistryOps for BollardEngine {
    async fn login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError> {
        let body = serde_json::to_vec(credentials)
            .map_err(|e| EngineError::Runtime(format!("failed to encode login request: {}", e)))?;
        let request = build_request("/auth", &[], Bytes::from(body))?;

        let response = self.send_raw(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response.into_body()).await;
            return Err(map_status(status, &credentials.server, message));
        }

        Ok(())
    }

    async fn push_image(
        &self,
        tag: &ImageTag,
        auth: &EncodedAuth,
    ) -> Result<ProgressStream, EngineError> {
        let uri = match tag.tag() {
            Some(t) => format!(
                "/images/{}/push?tag={}",
                tag.repository(),
                urlencoding::encode(t)
            ),
            None => format!("/images/{}/push", tag.repository()),
        };
        let request = build_request(&uri, &[("X-Registry-Auth", auth.as_str())], Bytes::new())?;

        let response = self.send_raw(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response.into_body()).await;
            return Err(map_status(status, &tag.to_string(), message));
        }

        Ok(decode_progress(response.into_body().into_data_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_status_carries_classifier_marker() {
        let err = map_status(StatusCode::NOT_FOUND, "img1", "No such image: img1".into());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn unauthorized_status_maps_to_unauthorized() {
        let err = map_status(StatusCode::UNAUTHORIZED, "registry", "bad creds".into());
        assert!(matches!(err, EngineError::Unauthorized(_)));
        assert!(err.to_string().starts_with("unauthorized"));
    }

    #[test]
    fn bollard_timeout_maps_to_timeout() {
        let err = map_bollard_error(bollard::errors::Error::RequestTimeoutError, "img");
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn bollard_404_maps_to_not_found() {
        let err = map_bollard_error(
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "No such image: gone".to_string(),
            },
            "gone",
        );
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn request_builder_sets_registry_auth_header() {
        let req = build_request("/images/app/push?tag=v1", &[("X-Registry-Auth", "abc")], Bytes::new())
            .unwrap();
        assert_eq!(req.headers()["X-Registry-Auth"], "abc");
        assert_eq!(req.uri(), "/images/app/push?tag=v1");
    }
}

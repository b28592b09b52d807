// ABOUTME: Push orchestration: proxy session, one login, then every tag of every image.
// ABOUTME: Per-tag failures are recorded; login and client failures abort the batch.

use futures::StreamExt;
use snafu::Snafu;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::classify::{ErrorKind, Operation, StructuredError, classify, with_kind};
use crate::proxy::{ProxyManager, ProxySettings};
use crate::runtime::{
    EncodedAuth, EngineConnector, ImageOps, ProgressStream, RegistryCredentials, RegistryOps,
};
use crate::types::ImageTag;

use super::ledger::{BatchLedger, ItemIndex};
use super::outcome::PushReport;

/// A push batch as requested by a caller.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub image_ids: Vec<String>,
    pub credentials: RegistryCredentials,
    pub proxy: Option<ProxySettings>,
}

/// Failures that stop a push batch before any image is pushed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PushError {
    #[snafu(display("engine client unavailable: {error}"))]
    Connect { error: StructuredError },

    #[snafu(display("registry login failed: {error}"))]
    Login { error: StructuredError },

    #[snafu(display("registry credentials could not be encoded: {error}"))]
    AuthEncoding { error: StructuredError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushErrorKind {
    Connect,
    Login,
    AuthEncoding,
}

impl PushError {
    pub fn kind(&self) -> PushErrorKind {
        match self {
            PushError::Connect { .. } => PushErrorKind::Connect,
            PushError::Login { .. } => PushErrorKind::Login,
            PushError::AuthEncoding { .. } => PushErrorKind::AuthEncoding,
        }
    }

    pub fn structured(&self) -> &StructuredError {
        match self {
            PushError::Connect { error }
            | PushError::Login { error }
            | PushError::AuthEncoding { error } => error,
        }
    }

    pub fn into_structured(self) -> StructuredError {
        match self {
            PushError::Connect { error }
            | PushError::Login { error }
            | PushError::AuthEncoding { error } => error,
        }
    }
}

/// Run a push batch end to end.
///
/// The proxy, when requested, is active before the engine client is
/// created and is deactivated exactly once on every path out.
pub async fn push_images(
    connector: &dyn EngineConnector,
    proxy: &ProxyManager,
    request: &PushRequest,
) -> Result<PushReport, PushError> {
    let session = match &request.proxy {
        Some(settings) => Some(proxy.activate(settings).await),
        None => None,
    };

    let result = match connector.connect() {
        Ok(engine) => push_batch(engine.as_ref(), request).await,
        Err(e) => Err(PushError::Connect {
            error: classify(Operation::CreateClient, "", &e),
        }),
    };

    if let Some(session) = session {
        session.deactivate().await;
    }
    result
}

/// Run [`push_images`] on its own task.
///
/// The batch, proxy deactivation included, runs to completion even if the
/// caller stops waiting on the handle.
pub fn spawn_push(
    connector: Arc<dyn EngineConnector>,
    proxy: Arc<ProxyManager>,
    request: PushRequest,
) -> JoinHandle<Result<PushReport, PushError>> {
    tokio::spawn(async move { push_images(connector.as_ref(), &proxy, &request).await })
}

/// Push every tag of every requested image through an existing connection.
///
/// Does not touch the proxy; see [`push_images`].
pub async fn push_batch<E>(engine: &E, request: &PushRequest) -> Result<PushReport, PushError>
where
    E: ImageOps + RegistryOps + ?Sized,
{
    let credentials = &request.credentials;
    tracing::info!(
        username = %credentials.username,
        server = %credentials.server,
        images = request.image_ids.len(),
        "Logging in to registry"
    );

    check_login(engine, credentials).await?;

    let auth = credentials.encode().map_err(|e| PushError::AuthEncoding {
        error: classify(Operation::EncodeAuth, "", &e),
    })?;

    let mut session = PushSession::new(auth);
    for id in &request.image_ids {
        session.push_image(engine, id).await;
    }

    let (status, pushed, errors) = session.ledger.into_parts(request.image_ids.len());
    tracing::info!(
        status = %status,
        pushed = pushed.len(),
        errors = errors.len(),
        "push batch finished"
    );

    Ok(PushReport {
        status,
        pushed,
        errors,
        total_count: request.image_ids.len(),
    })
}

/// Log in to the registry named in `credentials`, pushing nothing.
pub async fn check_login<E>(engine: &E, credentials: &RegistryCredentials) -> Result<(), PushError>
where
    E: RegistryOps + ?Sized,
{
    engine
        .login(credentials)
        .await
        .map_err(|e| PushError::Login {
            error: classify(Operation::Login, "", &e),
        })
}

/// Per-batch state: the encoded credentials and the progress ledger.
struct PushSession {
    auth: EncodedAuth,
    ledger: BatchLedger,
}

impl PushSession {
    fn new(auth: EncodedAuth) -> Self {
        Self {
            auth,
            ledger: BatchLedger::new(),
        }
    }

    async fn push_image<E>(&mut self, engine: &E, id: &str)
    where
        E: ImageOps + RegistryOps + ?Sized,
    {
        let image = self.ledger.track(id);
        self.ledger.begin_sizing(image);

        let detail = match engine.inspect_image(id).await {
            Ok(detail) => detail,
            Err(e) => {
                self.ledger
                    .fail(image, classify(Operation::InspectImage, id, &e));
                return;
            }
        };

        self.ledger.begin_acting(image);
        if detail.repo_tags.is_empty() {
            tracing::warn!(image_id = %id, "image has no tags, nothing to push");
        }
        for tag in &detail.repo_tags {
            let item = self.ledger.track(tag.as_str());
            self.ledger.begin_acting(item);
            self.push_tag(engine, item, tag).await;
        }
        self.ledger.finish(image);
    }

    async fn push_tag<E>(&mut self, engine: &E, item: ItemIndex, tag: &str)
    where
        E: RegistryOps + ?Sized,
    {
        tracing::info!(tag = %tag, "Pushing tag");

        let parsed = match ImageTag::parse(tag) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.ledger.fail(item, classify(Operation::PushImage, tag, &e));
                return;
            }
        };

        let stream = match engine.push_image(&parsed, &self.auth).await {
            Ok(stream) => stream,
            Err(e) => {
                self.ledger.fail(item, classify(Operation::PushImage, tag, &e));
                return;
            }
        };

        match drain_progress(stream, tag).await {
            Ok(()) => self.ledger.succeed(item),
            Err(error) => self.ledger.fail(item, error),
        }
    }
}

/// Consume a push stream until it ends, fails to decode, or reports an error.
async fn drain_progress(mut stream: ProgressStream, tag: &str) -> Result<(), StructuredError> {
    while let Some(item) = stream.next().await {
        let event = item.map_err(|e| classify(Operation::ReadProgress, tag, &e))?;

        if let Some(message) = event.error_message() {
            return Err(with_kind(
                Operation::PushProgress,
                tag,
                ErrorKind::PushFailed,
                message,
            ));
        }

        tracing::debug!(
            tag = %tag,
            layer = event.id.as_deref().unwrap_or(""),
            status = event.status.as_deref().unwrap_or(""),
            progress = event.progress.as_deref().unwrap_or(""),
            "push progress"
        );
    }
    Ok(())
}

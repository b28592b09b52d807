// ABOUTME: Test support utilities.
// ABOUTME: In-memory engine, connector and proxy host fakes plus tracing setup.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use stevedore::proxy::{ProxyError, ProxyHost};
use stevedore::runtime::{
    ContainerOps, ContainerSummary, DetectionError, EncodedAuth, Engine, EngineConnector,
    EngineError, ImageDetail, ImageOps, ImageSummary, ProgressEvent, ProgressStream,
    RegistryCredentials, RegistryOps, RuntimeError,
};
use stevedore::types::{ContainerId, ImageId, ImageTag};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stevedore=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const MB: u64 = 1024 * 1024;

// =============================================================================
// FakeEngine
// =============================================================================

/// One scripted item of a push progress stream.
#[derive(Debug, Clone)]
pub enum Step {
    Status(&'static str),
    ErrorEvent(&'static str),
    DecodeFailure(&'static str),
}

/// How the engine answers a push request for one tag.
#[derive(Debug, Clone)]
pub enum PushScript {
    Stream(Vec<Step>),
    Reject(&'static str),
}

#[derive(Default)]
struct FakeState {
    images: Vec<ImageSummary>,
    containers: Vec<ContainerSummary>,
    details: HashMap<String, ImageDetail>,
    removed: HashSet<String>,
    survives_removal: HashSet<String>,
    inspect_failures: HashMap<String, String>,
    remove_failures: HashMap<String, String>,
    list_failure: Option<String>,
    login_failure: Option<String>,
    push_scripts: HashMap<String, PushScript>,
    logins: Vec<RegistryCredentials>,
    pushes: Vec<(String, String)>,
}

/// In-memory engine. Clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image reachable by its id.
    pub fn with_image(self, id: &str, tags: &[&str], size: u64) -> Self {
        {
            let mut state = self.state.lock();
            let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
            state.images.push(ImageSummary {
                id: ImageId::new(id),
                repo_tags: tags.clone(),
                size,
                created: 1_700_000_000,
            });
            state.details.insert(
                id.to_string(),
                ImageDetail {
                    id: ImageId::new(id),
                    repo_tags: tags,
                    size,
                },
            );
        }
        self
    }

    pub fn with_container(self, id: &str, image_id: &str) -> Self {
        self.state.lock().containers.push(ContainerSummary {
            id: ContainerId::new(id),
            image_id: ImageId::new(image_id),
        });
        self
    }

    pub fn fail_inspect(self, id: &str, message: &str) -> Self {
        self.state
            .lock()
            .inspect_failures
            .insert(id.to_string(), message.to_string());
        self
    }

    pub fn fail_remove(self, id: &str, message: &str) -> Self {
        self.state
            .lock()
            .remove_failures
            .insert(id.to_string(), message.to_string());
        self
    }

    /// Keep the image inspectable after a successful removal (e.g. only a tag went away).
    pub fn survive_removal(self, id: &str) -> Self {
        self.state.lock().survives_removal.insert(id.to_string());
        self
    }

    pub fn fail_listing(self, message: &str) -> Self {
        self.state.lock().list_failure = Some(message.to_string());
        self
    }

    pub fn fail_login(self, message: &str) -> Self {
        self.state.lock().login_failure = Some(message.to_string());
        self
    }

    pub fn script_push(self, tag: &str, script: PushScript) -> Self {
        self.state
            .lock()
            .push_scripts
            .insert(tag.to_string(), script);
        self
    }

    pub fn removed(&self) -> HashSet<String> {
        self.state.lock().removed.clone()
    }

    pub fn login_count(&self) -> usize {
        self.state.lock().logins.len()
    }

    /// Tags push was called for, in order.
    pub fn push_calls(&self) -> Vec<String> {
        self.state
            .lock()
            .pushes
            .iter()
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Auth tokens handed to push, in order.
    pub fn push_tokens(&self) -> Vec<String> {
        self.state
            .lock()
            .pushes
            .iter()
            .map(|(_, auth)| auth.clone())
            .collect()
    }
}

#[async_trait]
impl ImageOps for FakeEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        let state = self.state.lock();
        if let Some(message) = &state.list_failure {
            return Err(EngineError::Connection(message.clone()));
        }
        Ok(state.images.clone())
    }

    async fn inspect_image(&self, id: &str) -> Result<ImageDetail, EngineError> {
        let state = self.state.lock();
        if let Some(message) = state.inspect_failures.get(id) {
            return Err(EngineError::Runtime(message.clone()));
        }
        if state.removed.contains(id) && !state.survives_removal.contains(id) {
            return Err(EngineError::NotFound(format!("No such image: {}", id)));
        }
        state
            .details
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {}", id)))
    }

    async fn tag_image(&self, id: &str, tag: &ImageTag) -> Result<(), EngineError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let tag = tag.to_string();
        let detail = state
            .details
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {}", id)))?;
        if !detail.repo_tags.contains(&tag) {
            detail.repo_tags.push(tag);
        }
        let tags = detail.repo_tags.clone();
        if let Some(summary) = state.images.iter_mut().find(|i| i.id.as_str() == id) {
            summary.repo_tags = tags;
        }
        Ok(())
    }

    async fn remove_image(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if let Some(message) = state.remove_failures.get(id) {
            return Err(EngineError::Runtime(message.clone()));
        }
        // A tag of an image: only the reference goes away.
        if !state.details.contains_key(id) {
            let owner = state
                .details
                .iter()
                .find(|(_, d)| d.repo_tags.iter().any(|t| t == id))
                .map(|(key, _)| key.clone());
            if let Some(owner) = owner {
                let tags: Vec<String> = state.details[&owner]
                    .repo_tags
                    .iter()
                    .filter(|t| *t != id)
                    .cloned()
                    .collect();
                if let Some(detail) = state.details.get_mut(&owner) {
                    detail.repo_tags = tags.clone();
                }
                if let Some(summary) = state.images.iter_mut().find(|i| i.id.as_str() == owner) {
                    summary.repo_tags = tags;
                }
                return Ok(());
            }
        }
        if state.removed.contains(id) || !state.details.contains_key(id) {
            return Err(EngineError::NotFound(format!("No such image: {}", id)));
        }
        state.removed.insert(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl ContainerOps for FakeEngine {
    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        Ok(self.state.lock().containers.clone())
    }
}

fn step_item(step: &Step) -> Result<ProgressEvent, EngineError> {
    match step {
        Step::Status(status) => Ok(ProgressEvent {
            status: Some(status.to_string()),
            ..Default::default()
        }),
        Step::ErrorEvent(message) => Ok(ProgressEvent {
            error: Some(message.to_string()),
            ..Default::default()
        }),
        Step::DecodeFailure(message) => Err(EngineError::InvalidResponse(message.to_string())),
    }
}

#[async_trait]
impl RegistryOps for FakeEngine {
    async fn login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.logins.push(credentials.clone());
        match &state.login_failure {
            Some(message) => Err(EngineError::Unauthorized(message.clone())),
            None => Ok(()),
        }
    }

    async fn push_image(
        &self,
        tag: &ImageTag,
        auth: &EncodedAuth,
    ) -> Result<ProgressStream, EngineError> {
        let mut state = self.state.lock();
        let key = tag.to_string();
        state.pushes.push((key.clone(), auth.as_str().to_string()));

        let script = state
            .push_scripts
            .get(&key)
            .cloned()
            .unwrap_or(PushScript::Stream(vec![
                Step::Status("Preparing"),
                Step::Status("Pushed"),
            ]));

        match script {
            PushScript::Reject(message) => Err(EngineError::Runtime(message.to_string())),
            PushScript::Stream(steps) => {
                let items: Vec<_> = steps.iter().map(step_item).collect();
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }
}

// =============================================================================
// FakeConnector
// =============================================================================

/// Hands out clones of one FakeEngine, or fails like a host without a runtime.
#[derive(Clone)]
pub struct FakeConnector {
    engine: Option<FakeEngine>,
}

impl FakeConnector {
    pub fn new(engine: FakeEngine) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn unavailable() -> Self {
        Self { engine: None }
    }
}

impl EngineConnector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn Engine>, RuntimeError> {
        match &self.engine {
            Some(engine) => Ok(Box::new(engine.clone())),
            None => Err(RuntimeError::from(DetectionError::NoRuntimeFound)),
        }
    }
}

// =============================================================================
// RecordingHost
// =============================================================================

#[derive(Default)]
struct HostState {
    env: HashMap<String, String>,
    daemon_config: Option<String>,
    unreadable: bool,
    reloads: usize,
}

/// Proxy host that keeps environment and drop-in state in memory.
#[derive(Clone, Default)]
pub struct RecordingHost {
    state: Arc<Mutex<HostState>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(self, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_daemon_config(self, contents: &str) -> Self {
        self.state.lock().daemon_config = Some(contents.to_string());
        self
    }

    /// Make reading the drop-in fail, as with a permission error.
    pub fn unreadable_daemon_config(self) -> Self {
        self.state.lock().unreadable = true;
        self
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.state.lock().env.clone()
    }

    pub fn daemon_config(&self) -> Option<String> {
        self.state.lock().daemon_config.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.lock().reloads
    }

    /// Wait up to two seconds for background work to reach `count` reloads.
    pub async fn wait_for_reloads(&self, count: usize) {
        for _ in 0..200 {
            if self.reloads() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ProxyHost for RecordingHost {
    fn var(&self, key: &str) -> Option<String> {
        self.state.lock().env.get(key).cloned()
    }

    fn set_var(&self, key: &str, value: &str) {
        self.state
            .lock()
            .env
            .insert(key.to_string(), value.to_string());
    }

    fn remove_var(&self, key: &str) {
        self.state.lock().env.remove(key);
    }

    fn read_daemon_config(&self) -> Result<Option<String>, ProxyError> {
        let state = self.state.lock();
        if state.unreadable {
            return Err(ProxyError::Io {
                path: PathBuf::from("/etc/systemd/system/docker.service.d/http-proxy.conf"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
            });
        }
        Ok(state.daemon_config.clone())
    }

    fn write_daemon_config(&self, contents: &str) -> Result<(), ProxyError> {
        self.state.lock().daemon_config = Some(contents.to_string());
        Ok(())
    }

    fn remove_daemon_config(&self) -> Result<(), ProxyError> {
        self.state.lock().daemon_config = None;
        Ok(())
    }

    async fn reload_daemon(&self) -> Result<(), ProxyError> {
        self.state.lock().reloads += 1;
        Ok(())
    }
}

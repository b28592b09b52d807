// ABOUTME: Request handlers for the image API.
// ABOUTME: One engine connection per request; pushes run on their own task.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::images::{
    DeleteReport, ImageRecord, PushReport, PushRequest, TagReport, add_tag, check_login,
    delete_images, list_images, remove_tag, spawn_push,
};
use crate::proxy::{ProxyCheck, ProxySettings};
use crate::runtime::RegistryCredentials;

use super::AppState;
use super::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub image_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushBody {
    pub image_ids: Vec<String>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub proxy_type: Option<String>,
    #[serde(default)]
    pub proxy_server: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagBody {
    pub image_id: String,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct ProxyCheckBody {
    pub proxy_type: Option<String>,
    pub proxy_server: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegistryCheckBody {
    pub username: String,
    pub password: String,
    /// Registry to log in to; the configured one when absent.
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegistryCheck {
    pub status: &'static str,
    pub server: String,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<ImageRecord>>> {
    let engine = state.connector.connect()?;
    let images = list_images(engine.as_ref()).await?;
    Ok(Json(images))
}

pub async fn delete(
    State(state): State<AppState>,
    body: Result<Json<DeleteBody>, JsonRejection>,
) -> ApiResult<Json<DeleteReport>> {
    let Json(body) = body?;
    if body.image_ids.is_empty() {
        return Err(ApiError::invalid_request("image_ids must not be empty"));
    }

    let engine = state.connector.connect()?;
    let report = delete_images(engine.as_ref(), &body.image_ids).await;
    Ok(Json(report))
}

pub async fn push(
    State(state): State<AppState>,
    body: Result<Json<PushBody>, JsonRejection>,
) -> ApiResult<Json<PushReport>> {
    let Json(body) = body?;
    if body.image_ids.is_empty() {
        return Err(ApiError::invalid_request("image_ids must not be empty"));
    }

    let proxy =
        ProxySettings::from_request(body.proxy_type.as_deref(), body.proxy_server.as_deref())?;
    let request = PushRequest {
        image_ids: body.image_ids,
        credentials: RegistryCredentials::new(body.username, body.password)
            .with_server(state.registry_server.as_str()),
        proxy,
    };

    // A dropped request must not cut the batch short before the proxy is reverted.
    let report = spawn_push(
        Arc::clone(&state.connector),
        Arc::clone(&state.proxy),
        request,
    )
    .await??;
    Ok(Json(report))
}

pub async fn tag(
    State(state): State<AppState>,
    body: Result<Json<TagBody>, JsonRejection>,
) -> ApiResult<Json<TagReport>> {
    let Json(body) = body?;
    let engine = state.connector.connect()?;
    let report = add_tag(engine.as_ref(), &body.image_id, &body.tag)
        .await
        .map_err(|e| ApiError::tagging(e, &body.image_id))?;
    Ok(Json(report))
}

pub async fn untag(
    State(state): State<AppState>,
    body: Result<Json<TagBody>, JsonRejection>,
) -> ApiResult<Json<TagReport>> {
    let Json(body) = body?;
    let engine = state.connector.connect()?;
    let report = remove_tag(engine.as_ref(), &body.image_id, &body.tag)
        .await
        .map_err(|e| ApiError::tagging(e, &body.image_id))?;
    Ok(Json(report))
}

pub async fn check_proxy(
    State(state): State<AppState>,
    body: Result<Json<ProxyCheckBody>, JsonRejection>,
) -> ApiResult<Json<ProxyCheck>> {
    let Json(body) = body?;
    let settings =
        ProxySettings::from_request(body.proxy_type.as_deref(), body.proxy_server.as_deref())?
            .ok_or_else(|| ApiError::invalid_request("proxy_type and proxy_server are required"))?;

    let check = state.checker.check(&settings).await?;
    Ok(Json(check))
}

pub async fn check_registry(
    State(state): State<AppState>,
    body: Result<Json<RegistryCheckBody>, JsonRejection>,
) -> ApiResult<Json<RegistryCheck>> {
    let Json(body) = body?;
    let server = body
        .server
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.registry_server.to_string());
    let credentials = RegistryCredentials::new(body.username, body.password).with_server(&server);

    let engine = state.connector.connect()?;
    check_login(engine.as_ref(), &credentials).await?;
    Ok(Json(RegistryCheck {
        status: "success",
        server,
    }))
}

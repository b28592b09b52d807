// ABOUTME: HTTP error envelope for the API.
// ABOUTME: Wraps a StructuredError as {"error": ...} with a status code.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tokio::task::JoinError;

use crate::classify::{Operation, StructuredError, classify};
use crate::images::{ListingError, PushError, TagError};
use crate::proxy::{ProxyCheckError, ProxyError};
use crate::runtime::RuntimeError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: StructuredError,
}

impl ApiError {
    pub fn bad_request(error: StructuredError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error,
        }
    }

    pub fn internal(error: StructuredError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }

    pub fn bad_gateway(error: StructuredError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            error,
        }
    }

    pub fn invalid_request(message: &str) -> Self {
        Self::bad_request(classify(Operation::ParseRequest, "", &message))
    }

    /// Envelope for a failed tag change on `image_id`.
    pub fn tagging(err: TagError, image_id: &str) -> Self {
        let error = classify(err.operation(), image_id, &err);
        if err.is_rejection() {
            Self::bad_request(error)
        } else {
            Self::internal(error)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.error }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(classify(Operation::ParseRequest, "", &rejection.body_text()))
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        Self::bad_request(classify(Operation::ParseRequest, "", &err))
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        Self::internal(classify(Operation::CreateClient, "", &err))
    }
}

impl From<ListingError> for ApiError {
    fn from(err: ListingError) -> Self {
        Self::internal(classify(err.operation(), "", &err))
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::internal(classify(Operation::PushImage, "", &err))
    }
}

impl From<PushError> for ApiError {
    fn from(err: PushError) -> Self {
        Self::internal(err.into_structured())
    }
}

impl From<ProxyCheckError> for ApiError {
    fn from(err: ProxyCheckError) -> Self {
        match err {
            ProxyCheckError::InvalidAddress(_) | ProxyCheckError::InvalidTarget(_) => {
                Self::bad_request(classify(Operation::CheckProxy, "", &err))
            }
            _ => Self::bad_gateway(classify(Operation::CheckProxy, "", &err)),
        }
    }
}

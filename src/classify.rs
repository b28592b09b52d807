// ABOUTME: Maps low-level failures onto a small, stable error taxonomy.
// ABOUTME: Produces timestamped StructuredError records and logs each one.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::fmt;

/// Timestamp layout used in error records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The operation that was running when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CreateClient,
    ParseRequest,
    ListImages,
    ListContainers,
    InspectImage,
    DeleteImage,
    Login,
    EncodeAuth,
    PushImage,
    ReadProgress,
    PushProgress,
    TagImage,
    UntagImage,
    CheckProxy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateClient => "CREATE_CLIENT",
            Operation::ParseRequest => "PARSE_REQUEST",
            Operation::ListImages => "LIST_IMAGES",
            Operation::ListContainers => "LIST_CONTAINERS",
            Operation::InspectImage => "INSPECT_IMAGE",
            Operation::DeleteImage => "DELETE_IMAGE",
            Operation::Login => "LOGIN",
            Operation::EncodeAuth => "ENCODE_AUTH",
            Operation::PushImage => "PUSH_IMAGE",
            Operation::ReadProgress => "READ_PROGRESS",
            Operation::PushProgress => "PUSH_PROGRESS",
            Operation::TagImage => "TAG_IMAGE",
            Operation::UntagImage => "UNTAG_IMAGE",
            Operation::CheckProxy => "CHECK_PROXY",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error kinds exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    ConnectionRefused,
    Timeout,
    Unknown,
    /// Assigned directly to in-band push errors; never produced by [`kind_of`].
    PushFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::PushFailed => "PUSH_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered marker table. The first marker found in the message wins.
pub const RULES: &[(&str, ErrorKind)] = &[
    ("not found", ErrorKind::NotFound),
    ("unauthorized", ErrorKind::Unauthorized),
    ("connection refused", ErrorKind::ConnectionRefused),
    ("timeout", ErrorKind::Timeout),
];

/// Classify a raw failure message. Matching ignores ASCII case.
pub fn kind_of(message: &str) -> ErrorKind {
    let haystack = message.to_ascii_lowercase();
    RULES
        .iter()
        .find(|(marker, _)| haystack.contains(marker))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

/// A classified failure with enough context to tell which item failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    operation: Operation,
    image_id: String,
    error_code: ErrorKind,
    message: String,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Local>,
}

impl StructuredError {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Image or tag the failure concerns; empty for batch-level failures.
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn kind(&self) -> ErrorKind {
        self.error_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.image_id.is_empty() {
            write!(f, "{} [{}]: {}", self.operation, self.error_code, self.message)
        } else {
            write!(
                f,
                "{} {} [{}]: {}",
                self.operation, self.image_id, self.error_code, self.message
            )
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Classify `error` raised by `operation` on `image_id` and log it.
pub fn classify(operation: Operation, image_id: &str, error: &dyn fmt::Display) -> StructuredError {
    let message = error.to_string();
    let kind = kind_of(&message);
    record(operation, image_id, kind, message)
}

/// Build an error record with a known kind, bypassing the marker table.
pub fn with_kind(
    operation: Operation,
    image_id: &str,
    kind: ErrorKind,
    message: impl Into<String>,
) -> StructuredError {
    record(operation, image_id, kind, message.into())
}

fn record(operation: Operation, image_id: &str, kind: ErrorKind, message: String) -> StructuredError {
    // The raw message is the event's own `message` field.
    tracing::error!(
        operation = %operation,
        image_id = %image_id,
        error_code = %kind,
        "{message}"
    );

    StructuredError {
        operation,
        image_id: image_id.to_string(),
        error_code: kind,
        message,
        timestamp: Local::now(),
    }
}

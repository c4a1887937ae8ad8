//! Remote call adapter: the seams to the face service and the records service.
//!
//! Every call resolves to `Result<T, ServiceError>`. Transport failures,
//! undecodable bodies and `{"error": ...}` payloads all collapse into the
//! same error value, so callers branch on one thing. Nothing is retried.

use async_trait::async_trait;
use rollcall_core::{
    AttendanceStatus, BoundingBox, DetectionResult, PersonId, RecognitionOutcome, RegistrationDraft, Snapshot,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Request never produced a response.
    Network,
    /// Response body was not the expected JSON.
    Malformed,
    /// Service answered with an `error` field.
    Service,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub error: String,
}

impl ServiceError {
    pub fn network(error: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Network, error: error.into() }
    }

    pub fn malformed(error: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Malformed, error: error.into() }
    }

    pub fn service(error: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Service, error: error.into() }
    }
}

pub type RemoteResult<T> = Result<T, ServiceError>;

/// A remote call parked inside a session task.
pub type CallFuture<T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send>>;

/// Acknowledgement returned by enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registered {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<PersonId>,
}

#[async_trait]
pub trait FaceService: Send + Sync {
    /// Pure detection; no identity.
    async fn detect(&self, image: &Snapshot) -> RemoteResult<DetectionResult>;
}

#[async_trait]
pub trait RecordsService: Send + Sync {
    /// Recognize the person in `image` and mark attendance for today.
    async fn recognize_and_mark(&self, image: &Snapshot) -> RemoteResult<RecognitionOutcome>;

    /// Enroll a new identity with one reference image.
    async fn register(&self, draft: &RegistrationDraft, image: &Snapshot) -> RemoteResult<Registered>;
}

/// Normalize a response body into `T` or a `ServiceError`.
///
/// The HTTP status is deliberately not used to pick success or failure: the
/// backend reports `not_recognized` with a 401 and errors with a JSON body at
/// assorted statuses. It only appears in messages for undecodable bodies.
pub fn decode_body<T: DeserializeOwned>(status: u16, body: &[u8]) -> RemoteResult<T> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ServiceError::malformed(format!("HTTP {status}: invalid JSON response: {e}")))?;

    if let Some(err) = value.get("error") {
        let message = err
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());
        return Err(ServiceError::service(message));
    }

    serde_json::from_value(value)
        .map_err(|e| ServiceError::malformed(format!("HTTP {status}: unexpected response shape: {e}")))
}

/// An identity-bearing status must carry the identity.
pub fn check_outcome(outcome: RecognitionOutcome) -> RemoteResult<RecognitionOutcome> {
    match (&outcome.status, &outcome.person) {
        (AttendanceStatus::NotRecognized, _) | (_, Some(_)) => Ok(outcome),
        (status, None) => Err(ServiceError::malformed(format!(
            "{status:?} outcome without a user"
        ))),
    }
}

/// Boxes must carry finite coordinates.
pub fn check_detection(result: DetectionResult) -> RemoteResult<DetectionResult> {
    let finite = |b: &BoundingBox| [b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite());
    match result.faces.iter().position(|b| !finite(b)) {
        None => Ok(result),
        Some(i) => Err(ServiceError::malformed(format!(
            "face {i} has a coordinate out of range: {:?}",
            result.faces[i]
        ))),
    }
}

//! # Error Taxonomy
//!
//! Every failure of a reconciliation pass is carried as a [`ReconcileError`]
//! tagged with one of three [`ErrorReason`]s. The reason is fixed when the
//! error is created; wrapping with [`ReconcileError::context`] or merging with
//! [`ReconcileError::aggregate`] never lowers it.
//!
//! Failures coming back from the Kubernetes API are first turned into a
//! [`ClientError`] at the store boundary, then classified by
//! [`ReconcileError::from_client_error`].

use std::fmt;
use thiserror::Error;

/// Coarse category of a failed API call, derived from the HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Unauthorized,
    Forbidden,
    Invalid,
    BadRequest,
    ServiceUnavailable,
    NotFound,
    Conflict,
    Timeout,
    TooManyRequests,
    /// Transport failures, unknown status codes, decode errors
    Other,
}

impl StatusCategory {
    /// Map an HTTP status code returned by the API server
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => StatusCategory::BadRequest,
            401 => StatusCategory::Unauthorized,
            403 => StatusCategory::Forbidden,
            404 => StatusCategory::NotFound,
            408 | 504 => StatusCategory::Timeout,
            409 => StatusCategory::Conflict,
            422 => StatusCategory::Invalid,
            429 => StatusCategory::TooManyRequests,
            503 => StatusCategory::ServiceUnavailable,
            _ => StatusCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Unauthorized => "Unauthorized",
            StatusCategory::Forbidden => "Forbidden",
            StatusCategory::Invalid => "Invalid",
            StatusCategory::BadRequest => "BadRequest",
            StatusCategory::ServiceUnavailable => "ServiceUnavailable",
            StatusCategory::NotFound => "NotFound",
            StatusCategory::Conflict => "Conflict",
            StatusCategory::Timeout => "Timeout",
            StatusCategory::TooManyRequests => "TooManyRequests",
            StatusCategory::Other => "Other",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the external object store
#[derive(Debug, Error)]
#[error("{category}: {message}")]
pub struct ClientError {
    pub category: StatusCategory,
    pub message: String,
}

impl ClientError {
    pub fn new(category: StatusCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.category == StatusCategory::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.category == StatusCategory::NotFound
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        let category = match &err {
            kube::Error::Api(response) => StatusCategory::from_code(response.code),
            _ => StatusCategory::Other,
        };
        Self::new(category, err.to_string())
    }
}

/// Policy bucket of a reconciliation failure, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorReason {
    /// Transient failure; the pass ends with a bounded-delay requeue
    RetryRequired,
    /// Instance rejected by singleton admission; expected steady state
    MultipleInstance,
    /// Invalid configuration or a rejection a retry cannot fix
    Irrecoverable,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::RetryRequired => "RetryRequired",
            ErrorReason::MultipleInstance => "MultipleInstance",
            ErrorReason::Irrecoverable => "Irrecoverable",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classified reconciliation failure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReconcileError {
    reason: ErrorReason,
    message: String,
    #[source]
    source: Option<BoxedCause>,
}

impl ReconcileError {
    fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            source: None,
        }
    }

    pub fn irrecoverable(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::Irrecoverable, message)
    }

    pub fn retry_required(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::RetryRequired, message)
    }

    pub fn multiple_instance(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::MultipleInstance, message)
    }

    /// Attach the underlying cause, appending its text to the message
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.message = format!("{}: {}", self.message, cause);
        self.source = Some(Box::new(cause));
        self
    }

    /// Classify a store failure.
    ///
    /// Unauthorized, forbidden, invalid, bad-request and service-unavailable
    /// responses are Irrecoverable; everything else is RetryRequired.
    pub fn from_client_error(err: ClientError, context: impl Into<String>) -> Self {
        let reason = match err.category {
            StatusCategory::Unauthorized
            | StatusCategory::Forbidden
            | StatusCategory::Invalid
            | StatusCategory::BadRequest
            | StatusCategory::ServiceUnavailable => ErrorReason::Irrecoverable,
            _ => ErrorReason::RetryRequired,
        };
        Self::new(reason, context).with_cause(err)
    }

    /// Prefix the message with caller context; the reason is kept as is
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    /// Merge follow-up failures (typically status writes) into this error.
    ///
    /// The resulting reason is the most severe of all merged errors.
    pub fn aggregate(mut self, others: impl IntoIterator<Item = ReconcileError>) -> Self {
        for other in others {
            self.reason = self.reason.max(other.reason);
            self.message = format!("{}; {}", self.message, other.message);
        }
        self
    }

    pub fn reason(&self) -> ErrorReason {
        self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_irrecoverable(&self) -> bool {
        self.reason == ErrorReason::Irrecoverable
    }

    pub fn is_multiple_instance(&self) -> bool {
        self.reason == ErrorReason::MultipleInstance
    }

    pub fn is_retry_required(&self) -> bool {
        self.reason == ErrorReason::RetryRequired
    }
}

use oxtel_common::backoff::{BackoffError, ErrorClass};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single network attempt.
///
/// # Examples
///
/// ```rust
/// use oxtel_agent::error::{classify_send_error, SendError};
/// use oxtel_common::backoff::ErrorClass;
///
/// let err = SendError::Status { status: 500, body: "oops".to_string() };
/// assert_eq!(classify_send_error(&err), ErrorClass::NonRetriable);
/// assert!(err.to_string().contains("500"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("Delivery: transport error: {0}")]
    Transport(#[source] BoxError),

    /// The collector answered with a non-success status.
    #[error("Delivery: collector responded with status={status}, body={body}")]
    Status { status: u16, body: String },
}

/// Failure to deliver one batch.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The batch could not be serialized to JSON.
    #[error("Delivery: batch encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Gzip compression of the encoded batch failed.
    #[error("Delivery: compression failed: {0}")]
    Compress(#[source] std::io::Error),

    /// The HMAC key was rejected.
    #[error("Delivery: signing failed: {0}")]
    Signing(String),

    /// The network send failed after the retry policy gave up.
    #[error(transparent)]
    Send(#[from] BackoffError<SendError>),
}

impl DeliveryError {
    /// Network attempts made before the error was returned. Zero when the
    /// batch failed before reaching the network.
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryError::Send(e) => e.attempts(),
            _ => 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Send(e) if e.is_cancelled())
    }
}

/// Classifier for network delivery: only transport-level failures are worth
/// another attempt. A non-success status is terminal.
pub fn classify_send_error(err: &SendError) -> ErrorClass {
    match err {
        SendError::Transport(_) => ErrorClass::Retriable,
        SendError::Status { .. } => ErrorClass::NonRetriable,
    }
}

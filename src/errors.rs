use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Boxed error type returned by caller-supplied extension points.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error kind that represents failures reported by the [`crate::Client`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client options are invalid (non-positive interval, zero queue size, bad URL, etc.).
    InvalidConfiguration = 1000,
    /// The secret key is missing.
    InvalidSecretKey = 1001,
    /// The operation was attempted on a disposed [`crate::Client`] or on a handle issued by one.
    Disposed = 1002,
    /// A registered [`crate::LocalFeaturesResolver`] failed.
    ResolverFailure = 1003,
    /// The payload of a feature config couldn't be deserialized to the requested type.
    ConfigDeserializationFailure = 1004,
    /// Unexpected HTTP response was received (unexpected HTTP status code or `success: false`).
    UnexpectedHttpResponse = 1101,
    /// The HTTP request timed out.
    HttpRequestTimeout = 1102,
    /// The HTTP request failed (most likely, due to a local network issue).
    HttpRequestFailure = 1103,
    /// An invalid HTTP response was received (2xx with an invalid content).
    InvalidHttpResponseContent = 1105,
    /// The HTTP request was aborted because the client was disposed.
    RequestCancelled = 1106,
}

impl ErrorKind {
    pub(crate) fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Error struct that holds the [`ErrorKind`] and message of the reported failure.
pub struct ClientError {
    /// Error kind that represents failures reported by the [`crate::Client`].
    pub kind: ErrorKind,
    /// The text representation of the failure.
    pub message: String,
    source: Option<BoxError>,
}

impl ClientError {
    pub(crate) fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            message,
            kind,
            source: None,
        }
    }

    pub(crate) fn with_source(kind: ErrorKind, message: String, source: BoxError) -> Self {
        Self {
            message,
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn disposed(component: &str) -> Self {
        Self::new(
            ErrorKind::Disposed,
            format!("The {component} has been disposed and can no longer be used."),
        )
    }

    /// Consumes the error and returns the original error raised by a caller-supplied extension, if any.
    pub fn into_source(self) -> Option<BoxError> {
        self.source
    }
}

impl Debug for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.as_str())
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn Error + 'static))
    }
}

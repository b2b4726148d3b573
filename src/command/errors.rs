use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error};

/// Protocol version reported in every failure body.
pub const PROTOCOL_VERSION: u32 = 100;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure classes a client can observe. Each maps to a fixed wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    Duplicate,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::Duplicate => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Message shown instead of the real one when the failure is not
    /// recoverable and debug mode is off.
    pub fn generic_message(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad request",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Duplicate => "Duplicate",
            ErrorKind::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.generic_message())
    }
}

/// Failure of a single batch entry, or of the batch as a whole.
///
/// A recoverable failure carries a message that is always safe to show the
/// client. Anything else is reduced to [`ErrorKind::generic_message`] unless
/// the dispatcher runs in debug mode. The capture location and backtrace are
/// only ever logged.
#[derive(Debug)]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
    recoverable: bool,
    source: Option<BoxError>,
    location: &'static Location<'static>,
    backtrace: Backtrace,
}

impl OperationError {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: false,
            source: None,
            location: Location::caller(),
            backtrace: Backtrace::capture(),
        }
    }

    /// A failure whose message is surfaced to the client regardless of debug
    /// mode. Defaults to [`ErrorKind::BadRequest`].
    #[track_caller]
    pub fn recoverable(message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::BadRequest, message);
        err.recoverable = true;
        err
    }

    #[track_caller]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    #[track_caller]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    #[track_caller]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The single outward failure for anything wrong with the envelope.
    #[track_caller]
    pub fn invalid_request(cause: RequestError) -> Self {
        Self::recoverable("Invalid request").with_source(cause)
    }

    /// Converts a failure raised by an operation. Typed failures keep their
    /// kind; anything else becomes [`ErrorKind::Internal`] with the original
    /// chain kept as the cause.
    #[track_caller]
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<OperationError>() {
            Ok(typed) => typed,
            Err(other) => Self::internal(other.to_string()).with_source(other),
        }
    }

    #[track_caller]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::internal(format!("Operation panicked: {}", panic_message(&*payload)))
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Message to put on the wire.
    pub fn client_message(&self, debug: bool) -> &str {
        if debug || self.recoverable {
            &self.message
        } else {
            self.kind.generic_message()
        }
    }

    /// Logs the failure, then every cause in its chain, then the backtrace.
    pub fn log(&self, id: Option<&str>) {
        error!(
            target: "batch_rpc::failure",
            id = id.unwrap_or("-"),
            code = self.kind.code(),
            location = %self.location,
            "{}",
            self.message
        );
        let mut cause = self.source();
        while let Some(err) = cause {
            error!(target: "batch_rpc::failure", id = id.unwrap_or("-"), "caused by: {}", err);
            cause = err.source();
        }
        debug!(target: "batch_rpc::failure", backtrace = %self.backtrace, "failure backtrace");
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for OperationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn StdError + 'static))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Reasons an inbound envelope is rejected. Never shown to clients; they only
/// see "Invalid request".
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Invalid protocol: transport is not secure")]
    InsecureTransport,

    #[error("Request body unreadable: {0}")]
    UnreadableBody(String),

    #[error("Request body too large: limit is {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Invalid JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Request body is not a JSON object")]
    NotAnObject,

    #[error("Missing version")]
    MissingVersion,

    #[error("Missing payload")]
    MissingPayload,
}

/// Errors raised while turning a namespace into a handler.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no module registered for namespace `{0}`")]
    UnknownNamespace(String),

    #[error("module manifest for `{namespace}` is not readable: {path}")]
    UnreadableManifest {
        namespace: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("module manifest for `{namespace}` is invalid")]
    InvalidManifest {
        namespace: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("module `{namespace}` did not produce a valid handler: {reason}")]
    InvalidHandler { namespace: String, reason: String },
}

impl RoutingError {
    pub fn invalid_handler(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHandler {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }
}

/// Faults of the driving loop itself. Any of these ends the batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Too many operations: limit is {limit}, batch has {count}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("Dispatch loop panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(&*payload).to_string())
    }

    #[track_caller]
    pub fn into_failure(self) -> OperationError {
        match self {
            DispatchError::TooManyEntries { .. } => {
                OperationError::recoverable("Too many operations").with_source(self)
            }
            DispatchError::Panicked(_) => OperationError::internal(self.to_string()),
        }
    }
}

//! Error types surfaced by the driver, plus the asynchronous error channel.
//!
//! Two error paths exist, matching the propagation policy in the spec: terminal
//! outcomes of a specific command flow through its [`crate::handle::Handle`] as a
//! [`DriverError`]; background-only problems (parse failures, unsolicited frames,
//! duplicate terminal transitions) are never raised inline — they are placed on the
//! [`ErrorChannel`] and only become visible when the caller calls
//! [`crate::driver::Driver::process_errors`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// A device-reported error name, carried verbatim in the response frame's `error`
/// field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceErrorKind {
    InvalidPin,
    InvalidOutputPin,
    InvalidInputPin,
    InvalidOutputLevel,
    InvalidPinMode,
    InvalidCommand,
    DuplicateLoggingJob,
    TooManyLoggingJobs,
    LoggingRequestNotFound,
    /// A device error name not in the known set (forward compatibility with newer
    /// firmware).
    Other(String),
}

impl DeviceErrorKind {
    /// Parse the wire error name into a known variant, falling back to `Other`.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "INVALID_PIN" => Self::InvalidPin,
            "INVALID_OUTPUT_PIN" => Self::InvalidOutputPin,
            "INVALID_INPUT_PIN" => Self::InvalidInputPin,
            "INVALID_OUTPUT_LEVEL" => Self::InvalidOutputLevel,
            "INVALID_PIN_MODE" => Self::InvalidPinMode,
            "INVALID_COMMAND" => Self::InvalidCommand,
            "DUPLICATE_LOGGING_JOB" => Self::DuplicateLoggingJob,
            "TOO_MANY_LOGGING_JOBS" => Self::TooManyLoggingJobs,
            "LOGGING_REQUEST_NOT_FOUND" => Self::LoggingRequestNotFound,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::InvalidPin => "INVALID_PIN",
            Self::InvalidOutputPin => "INVALID_OUTPUT_PIN",
            Self::InvalidInputPin => "INVALID_INPUT_PIN",
            Self::InvalidOutputLevel => "INVALID_OUTPUT_LEVEL",
            Self::InvalidPinMode => "INVALID_PIN_MODE",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::DuplicateLoggingJob => "DUPLICATE_LOGGING_JOB",
            Self::TooManyLoggingJobs => "TOO_MANY_LOGGING_JOBS",
            Self::LoggingRequestNotFound => "LOGGING_REQUEST_NOT_FOUND",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// A background protocol fault detected by the reader thread.
#[derive(Debug, Clone)]
pub enum ProtocolErrorKind {
    /// A line could not be parsed as a valid frame.
    Parse,
    /// A frame had an unrecognized `type` field.
    UnknownFrameType,
    /// A sample arrived for an id with no registered logging-start entry.
    UnsolicitedSample,
    /// A response or sample arrived for an id not in the registry at all.
    UnknownId,
    /// The engine observed a second attempt to finalize an already-terminal
    /// handle or recording — a device/host contract violation, not a crash.
    DuplicateTerminalTransition,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "frame parse failure",
            Self::UnknownFrameType => "unknown frame type",
            Self::UnsolicitedSample => "unsolicited sample",
            Self::UnknownId => "response/sample for unknown id",
            Self::DuplicateTerminalTransition => "duplicate terminal transition",
        };
        f.write_str(s)
    }
}

/// The single error type returned from [`crate::handle::Handle::result`] and
/// [`crate::recording::Recording::result`], and pushed onto the [`ErrorChannel`].
#[derive(Debug, Clone)]
pub enum DriverError {
    /// The device rejected the command with a named error.
    Device(DeviceErrorKind, Option<String>),
    /// A background protocol fault (see [`ProtocolErrorKind`]).
    Protocol(ProtocolErrorKind, String),
    /// The serial transport failed on read or write.
    Transport(String),
    /// `result()` was called before the handle/recording reached a terminal state.
    NotReady,
    /// `submit`/typed helper called after `kill()`.
    ShuttingDown,
    /// `submit`/typed helper called before `open()` completed.
    NotOpened,
    /// `open()` called more than once.
    AlreadyOpened,
    /// The session-long request id counter overflowed.
    IdSpaceExhausted,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(kind, Some(detail)) => write!(f, "device error {kind}: {detail}"),
            Self::Device(kind, None) => write!(f, "device error {kind}"),
            Self::Protocol(kind, detail) => write!(f, "protocol error ({kind}): {detail}"),
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
            Self::NotReady => f.write_str("result not ready"),
            Self::ShuttingDown => f.write_str("driver is shutting down"),
            Self::NotOpened => f.write_str("driver has not completed open()"),
            Self::AlreadyOpened => f.write_str("driver already opened"),
            Self::IdSpaceExhausted => f.write_str("request id space exhausted"),
        }
    }
}

impl std::error::Error for DriverError {}

/// FIFO of asynchronous error records from the reader thread.
///
/// Drained explicitly via [`ErrorChannel::drain`]; the reader thread never raises
/// into user code directly, so this is the only place background faults surface.
#[derive(Default)]
pub struct ErrorChannel {
    queue: Mutex<VecDeque<DriverError>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a background error. Never blocks the caller on anything but the
    /// internal mutex.
    pub fn push(&self, err: DriverError) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(err);
    }

    /// Drain every currently enqueued error, in arrival order.
    pub fn drain(&self) -> Vec<DriverError> {
        let mut queue = self.queue.lock().unwrap();
        queue.drain(..).collect()
    }

    /// Non-blocking check for whether any errors are pending.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

//! Unified error types for the SparkGrid devices.
//!
//! Every subsystem owns a small `Copy` error enum with a hand-written
//! `Display`.  None of these are fatal to a control loop: callers turn
//! them into retries, client-error replies or skipped policy steps.

use core::fmt;

use crate::rpc::transport::ResponseCode;
use crate::scheduler::TimerKind;

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Failure of one outbound request.  Every variant counts as one failed
/// attempt for the registration and disconnect retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No response arrived within the request budget.
    Timeout,
    /// The peer address is unknown or could not be resolved.
    UnknownPeer,
    /// The socket failed to send or receive.
    Io,
    /// A reply arrived but could not be decoded.
    MalformedReply,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::UnknownPeer => write!(f, "unknown peer"),
            Self::Io => write!(f, "socket I/O failed"),
            Self::MalformedReply => write!(f, "malformed reply"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Encoded document exceeds the payload buffer.
    PayloadTooLarge,
    /// Serialisation failed.
    Encode,
    /// Payload is not valid JSON or has the wrong shape.
    Decode,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::Encode => write!(f, "encode failed"),
            Self::Decode => write!(f, "decode failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource errors
// ---------------------------------------------------------------------------

/// Why an inbound request was refused.  Maps 1:1 onto a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// Body is missing a field or a field has the wrong type.
    BadRequest(&'static str),
    NotFound,
    MethodNotAllowed,
}

impl ResourceError {
    pub const fn code(self) -> ResponseCode {
        match self {
            Self::BadRequest(_) => ResponseCode::BadRequest,
            Self::NotFound => ResponseCode::NotFound,
            Self::MethodNotAllowed => ResponseCode::MethodNotAllowed,
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(why) => write!(f, "bad request: {why}"),
            Self::NotFound => write!(f, "resource not found"),
            Self::MethodNotAllowed => write!(f, "method not allowed"),
        }
    }
}

impl From<CodecError> for ResourceError {
    fn from(_: CodecError) -> Self {
        Self::BadRequest("body is not a JSON object")
    }
}

// ---------------------------------------------------------------------------
// Classifier errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierError {
    /// A feature handed to the classifier was NaN or infinite.
    NonFiniteFeature { index: usize },
    /// The classifier returned a NaN or infinite probability.
    NonFiniteProbability { index: usize },
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteFeature { index } => write!(f, "feature {index} is not finite"),
            Self::NonFiniteProbability { index } => {
                write!(f, "probability {index} is not finite")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registration errors
// ---------------------------------------------------------------------------

/// Outcome of a single failed registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    Link(LinkError),
    /// Registry answered with something other than `2.01 Created`.
    Rejected(ResponseCode),
    /// Registry answered `2.01` with a body that is not a JSON object.
    MalformedDefaults,
    /// The registration document could not be encoded.
    Codec(CodecError),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "{e}"),
            Self::Rejected(code) => write!(f, "registry answered {code}"),
            Self::MalformedDefaults => write!(f, "registry defaults malformed"),
            Self::Codec(e) => write!(f, "{e}"),
        }
    }
}

impl From<LinkError> for RegistrationError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<CodecError> for RegistrationError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Another timer is still armed; it must be stopped first.
    Busy { armed: TimerKind },
    /// Zero-length periods would fire on every poll.
    ZeroPeriod,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { armed } => write!(f, "{armed:?} timer still armed"),
            Self::ZeroPeriod => write!(f, "timer period must be non-zero"),
        }
    }
}

//! Error taxonomy for the session core.
//!
//! Mirrors the split the protocol imposes: conditions that travel to the
//! peer inside `detach` and `end` frames, per-attach failures the session
//! survives, and fatal errors that stop the actor. Settlement traffic for
//! transfers the session no longer tracks is not an error at all; the
//! protocol allows either side to dispose of forgotten ids.

use thiserror::Error;

use crate::transport::TransportError;

/// 1.0 error conditions the bridge emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    /// A frame field named something the session cannot honour, such as
    /// an unparseable address or an unknown handle on a flow.
    InvalidField,
    /// The peer asked for a capability outside the supported set.
    NotImplemented,
    /// A frame arrived that the session state cannot accept.
    IllegalState,
    /// The backing channel refused an operation mid-attach.
    InternalError,
    /// A passive declare found no queue or exchange of that name.
    NotFound,
    /// Session flow arithmetic no longer agrees with the peer.
    WindowViolation,
}

impl Condition {
    /// The symbolic condition name carried on the wire.
    #[must_use]
    pub const fn as_symbol(self) -> &'static str {
        match self {
            Self::InvalidField => "amqp:invalid-field",
            Self::NotImplemented => "amqp:not-implemented",
            Self::IllegalState => "amqp:illegal-state",
            Self::InternalError => "amqp:internal-error",
            Self::NotFound => "amqp:not-found",
            Self::WindowViolation => "amqp:session:window-violation",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// Error description carried on `detach` and `end` frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    pub condition: Condition,
    pub description: Option<String>,
}

impl ErrorInfo {
    /// An error with a human-readable description.
    #[must_use]
    pub fn new(condition: Condition, description: impl Into<String>) -> Self {
        Self {
            condition,
            description: Some(description.into()),
        }
    }

    /// An error carrying only its condition.
    #[must_use]
    pub const fn bare(condition: Condition) -> Self {
        Self {
            condition,
            description: None,
        }
    }
}

/// Fatal errors that terminate a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer violated the protocol; an `end` carrying the condition is
    /// emitted before the session stops.
    #[error("{condition}: {description}")]
    Protocol {
        condition: Condition,
        description: String,
    },
    /// The frame writer or backing channel failed; the session stops
    /// without further frames.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub(crate) fn invalid_field(description: impl Into<String>) -> Self {
        Self::Protocol {
            condition: Condition::InvalidField,
            description: description.into(),
        }
    }

    pub(crate) fn illegal_state(description: impl Into<String>) -> Self {
        Self::Protocol {
            condition: Condition::IllegalState,
            description: description.into(),
        }
    }

    pub(crate) fn window_violation(description: impl Into<String>) -> Self {
        Self::Protocol {
            condition: Condition::WindowViolation,
            description: description.into(),
        }
    }

    /// The error info to report to the peer, if the peer should hear
    /// about it at all.
    #[must_use]
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            Self::Protocol {
                condition,
                description,
            } => Some(ErrorInfo::new(*condition, description.clone())),
            Self::Transport(_) => None,
        }
    }
}

//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `FlowError`: a stage was requested out of order
//! - `TagError`: a callback payload is malformed, stale or forged
//! - `TransportError`: the messaging transport failed to deliver
//! - `StageError`: everything that can stop one stage handler

use crate::flow::DialogState;
use rootcause::Report;
use std::fmt;

/// Errors from the dialog ordering state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// The current stage has not completed yet.
    PrevStateNotComplete { state: DialogState },
    /// The current stage may not be followed by the requested one.
    InvalidOrder {
        from: DialogState,
        to: DialogState,
    },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrevStateNotComplete { state } => {
                write!(f, "previous state {state} is not complete")
            }
            Self::InvalidOrder { from, to } => {
                write!(f, "invalid order: {to} cannot follow {from}")
            }
        }
    }
}

impl std::error::Error for FlowError {}

/// Errors from resolving a callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The payload does not decode to a tag of the expected shape.
    InvalidPayload { reason: String },
    /// The tag is not the one currently issued for the slot.
    InvalidTag,
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPayload { reason } => write!(f, "invalid payload: {reason}"),
            Self::InvalidTag => write!(f, "invalid tag"),
        }
    }
}

impl std::error::Error for TagError {}

/// Errors from the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A message could not be sent.
    SendFailed { reason: String },
    /// A message could not be deleted.
    DeleteFailed { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed { reason } => write!(f, "failed to send message: {reason}"),
            Self::DeleteFailed { reason } => write!(f, "failed to delete message: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Why a stage handler stopped.
///
/// Every variant except `Transport` is rendered back to the user at the
/// session boundary.
#[derive(Debug)]
pub enum StageError {
    /// The stage was requested out of order.
    Flow(FlowError),
    /// A callback payload could not be resolved.
    Payload { source: TagError, raw: String },
    /// Callback data named no known action.
    UnknownAction { raw: String },
    /// A decoded index points past the list it was issued for.
    IndexOutOfRange { index: usize, len: usize },
    /// The CRM refused or failed an operation.
    Crm {
        operation: &'static str,
        details: String,
    },
    /// The transport failed; nothing can be rendered.
    Transport(Report<TransportError>),
}

impl StageError {
    /// Wraps a payload error together with the payload that caused it.
    #[must_use]
    pub fn payload(source: TagError, raw: &str) -> Self {
        Self::Payload {
            source,
            raw: raw.to_string(),
        }
    }

    /// Wraps a CRM failure reported by the actor.
    #[must_use]
    pub fn crm<C: fmt::Display>(operation: &'static str, report: &C) -> Self {
        Self::Crm {
            operation,
            details: report.to_string(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow(err) => write!(f, "{err}"),
            Self::Payload { source, raw } => write!(f, "{source} (payload {raw:?})"),
            Self::UnknownAction { raw } => write!(f, "unknown callback action in {raw:?}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for {len} items")
            }
            Self::Crm { operation, details } => write!(f, "crm failed to {operation}: {details}"),
            Self::Transport(report) => write!(f, "{report}"),
        }
    }
}

impl std::error::Error for StageError {}

impl From<FlowError> for StageError {
    fn from(err: FlowError) -> Self {
        Self::Flow(err)
    }
}

impl From<Report<TransportError>> for StageError {
    fn from(report: Report<TransportError>) -> Self {
        Self::Transport(report)
    }
}

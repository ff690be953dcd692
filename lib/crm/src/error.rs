//! Error types for the CRM crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CrmError`: failures talking to the CRM or interpreting its answers
//! - `LinkStoreError`: failures reading or writing the user link file

use std::fmt;

/// Errors from CRM operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmError {
    /// The HTTP request could not be sent or its body could not be read.
    RequestFailed { method: String, reason: String },
    /// The CRM answered with a non-success status and no error body.
    Status { method: String, status: u16 },
    /// The CRM answered with an error body.
    Api {
        method: String,
        code: String,
        description: String,
    },
    /// The response body did not have the expected shape.
    InvalidResponse { method: String, reason: String },
    /// No CRM user matches the lookup.
    UserNotFound { lookup: String },
    /// More than one CRM user matches the lookup.
    SeveralUsersFound { lookup: String, count: usize },
}

impl fmt::Display for CrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { method, reason } => {
                write!(f, "request to {method} failed: {reason}")
            }
            Self::Status { method, status } => {
                write!(f, "{method} responded with status {status}")
            }
            Self::Api {
                method,
                code,
                description,
            } => {
                write!(f, "{method} responded with error {code}: {description}")
            }
            Self::InvalidResponse { method, reason } => {
                write!(f, "invalid response from {method}: {reason}")
            }
            Self::UserNotFound { lookup } => write!(f, "no CRM user found for {lookup}"),
            Self::SeveralUsersFound { lookup, count } => {
                write!(f, "{count} CRM users found for {lookup}")
            }
        }
    }
}

impl std::error::Error for CrmError {}

/// Errors from the user link store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStoreError {
    /// The link file could not be serialized.
    Encode { reason: String },
    /// The link file could not be written.
    Write { path: String, reason: String },
}

impl fmt::Display for LinkStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { reason } => write!(f, "failed to encode user links: {reason}"),
            Self::Write { path, reason } => {
                write!(f, "failed to write user links to {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for LinkStoreError {}

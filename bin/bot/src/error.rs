//! Error types for the bot binary.

use std::fmt;

/// Errors from the Telegram Bot API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    /// The request did not complete.
    Request { method: String, reason: String },
    /// The API answered `ok: false`.
    Api { method: String, description: String },
    /// The API answered with a body we could not read.
    InvalidResponse { method: String, reason: String },
}

impl fmt::Display for TelegramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { method, reason } => {
                write!(f, "telegram request {method} failed: {reason}")
            }
            Self::Api {
                method,
                description,
            } => write!(f, "telegram rejected {method}: {description}"),
            Self::InvalidResponse { method, reason } => {
                write!(f, "invalid telegram response to {method}: {reason}")
            }
        }
    }
}

impl std::error::Error for TelegramError {}

/// Errors that stop the bot from starting.
#[derive(Debug)]
pub enum BotError {
    /// Configuration is missing or malformed.
    Config { reason: String },
    /// The task label pattern does not compile.
    InvalidTaskPattern { pattern: String, reason: String },
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::InvalidTaskPattern { pattern, reason } => {
                write!(f, "invalid task label pattern {pattern:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for BotError {}

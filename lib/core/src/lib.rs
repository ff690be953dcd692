//! Core types shared across deal-courier.
//!
//! This crate provides the identifier newtypes and the rootcause-based
//! `Result` alias used by every other crate in the workspace.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    CommentId, ConversationSessionId, CrmUserId, DealId, ExternalUserId, ParseIdError, TaskId,
};

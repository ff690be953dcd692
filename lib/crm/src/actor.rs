//! The CRM as seen by one authenticated user.
//!
//! A `CrmActor` performs every CRM operation on behalf of a single user;
//! the conversation never touches CRM credentials or user ids directly.
//! A `CrmDirectory` resolves messaging users to actors.

use crate::error::CrmError;
use crate::model::{CrmUser, Deal, Task};
use async_trait::async_trait;
use deal_courier_core::{CommentId, CrmUserId, DealId, Result, TaskId};
use std::sync::Arc;

/// CRM operations available to one authenticated user.
#[async_trait]
pub trait CrmActor: Send + Sync {
    /// The CRM account this actor works as.
    fn profile(&self) -> &CrmUser;

    /// Lists the open deals assigned to this user.
    async fn list_deals(&self) -> Result<Vec<Deal>, CrmError>;

    /// Adds a comment to the deal's timeline, authored by this user.
    async fn add_comment_to_deal(&self, deal: DealId, comment: &str)
    -> Result<CommentId, CrmError>;

    /// Lists the open tasks attached to a deal.
    async fn list_deal_tasks(&self, deal: DealId) -> Result<Vec<Task>, CrmError>;

    /// Marks a task as completed.
    async fn complete_task(&self, task: TaskId) -> Result<(), CrmError>;
}

/// Resolves people to CRM actors.
#[async_trait]
pub trait CrmDirectory: Send + Sync {
    /// Finds the single CRM user whose mobile phone matches.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `SeveralUsersFound` when the phone does not
    /// identify exactly one user.
    async fn authenticate_by_phone(&self, phone: &str) -> Result<Arc<dyn CrmActor>, CrmError>;

    /// Re-opens an actor for a user linked earlier.
    async fn authenticate_by_id(&self, id: CrmUserId) -> Result<Arc<dyn CrmActor>, CrmError>;
}

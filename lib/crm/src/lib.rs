//! CRM access for deal-courier.
//!
//! This crate provides:
//!
//! - **Model**: deals, tasks and users as the conversation displays them
//! - **Actor traits**: `CrmActor` (one user's CRM access) and `CrmDirectory`
//! - **REST client**: webhook-based implementation of both traits
//! - **Link store**: remembered messaging-user to CRM-user links

pub mod actor;
pub mod client;
pub mod error;
pub mod link;
pub mod model;

pub use actor::{CrmActor, CrmDirectory};
pub use client::{RestActor, RestClient, RestDirectory};
pub use error::{CrmError, LinkStoreError};
pub use link::LinkStore;
pub use model::{CrmUser, Deal, DealStage, Task, TaskStatus};

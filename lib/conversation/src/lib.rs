//! Conversation core for deal-courier.
//!
//! This crate provides:
//!
//! - **Dialog flow**: the legal ordering of conversation stages
//! - **Tags**: unguessable references that bind buttons to server-held data
//! - **Sessions**: per-user stage handlers composing the two
//! - **Session manager**: lifecycle of sessions across users
//!
//! Delivery of replies is abstracted behind the `Transport` trait; CRM access
//! goes through `deal_courier_crm::CrmActor`.

pub mod error;
pub mod flow;
pub mod manager;
pub mod menu;
pub mod session;
pub mod tag;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{FlowError, StageError, TagError, TransportError};
pub use flow::{DialogFlow, DialogState};
pub use manager::{SessionManager, SharedSession};
pub use menu::DialogOptions;
pub use session::{DealTasks, Session, SessionEvent};
pub use tag::{Selection, Tag, TaggedVar};
pub use transport::{Action, MenuOption, MessageRef, Reply, Transport};

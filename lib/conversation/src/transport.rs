//! The outbound side of a conversation.
//!
//! Replies are HTML text with an optional set of buttons. Each button carries
//! callback data of the form `<action>|<hex payload>`, which the messaging
//! client echoes back verbatim when the button is pressed.

use crate::error::TransportError;
use async_trait::async_trait;
use deal_courier_core::{ExternalUserId, Result};
use std::fmt;
use std::str::FromStr;

/// Reference to a message the transport delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub message_id: i64,
}

impl MessageRef {
    #[must_use]
    pub fn new(message_id: i64) -> Self {
        Self { message_id }
    }
}

/// What a button asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    ListDeals,
    SelectDeal,
    WriteComment,
    ListTasks,
    CompleteTask,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ListDeals => "deals",
            Self::SelectDeal => "deal",
            Self::WriteComment => "comment",
            Self::ListTasks => "tasks",
            Self::CompleteTask => "complete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "deals" => Ok(Self::ListDeals),
            "deal" => Ok(Self::SelectDeal),
            "comment" => Ok(Self::WriteComment),
            "tasks" => Ok(Self::ListTasks),
            "complete" => Ok(Self::CompleteTask),
            _ => Err(()),
        }
    }
}

/// Splits callback data into its action and payload.
///
/// Data without a separator is an action with an empty payload.
#[must_use]
pub fn parse_callback(data: &str) -> Option<(Action, &str)> {
    let (action, payload) = data.split_once('|').unwrap_or((data, ""));
    let action = action.parse().ok()?;
    Some((action, payload))
}

/// One button under a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub action: Action,
    pub payload: String,
}

impl MenuOption {
    #[must_use]
    pub fn new(label: impl Into<String>, action: Action, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action,
            payload: payload.into(),
        }
    }

    /// Returns the data the client sends back when this option is chosen.
    #[must_use]
    pub fn callback_data(&self) -> String {
        if self.payload.is_empty() {
            self.action.as_str().to_string()
        } else {
            format!("{}|{}", self.action, self.payload)
        }
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTML-formatted body.
    pub text: String,
    pub options: Vec<MenuOption>,
}

impl Reply {
    /// A reply without buttons.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(text: impl Into<String>, options: Vec<MenuOption>) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

/// Delivers replies to an external user.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a reply and returns a reference to the delivered message.
    async fn send(&self, user: ExternalUserId, reply: Reply) -> Result<MessageRef, TransportError>;

    /// Deletes a previously delivered message.
    async fn delete(&self, user: ExternalUserId, message: MessageRef) -> Result<(), TransportError>;
}

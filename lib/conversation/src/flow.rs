//! Ordering of conversation stages.
//!
//! A [`DialogFlow`] accepts a transition only once the current stage has
//! reported completion, and only towards a stage that may follow it.

use crate::error::FlowError;
use std::fmt;

/// A stage of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogState {
    Started,
    DealsList,
    DealActions,
    WriteComment,
    AddComment,
    TasksList,
    TaskComplete,
}

impl DialogState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Started,
        Self::DealsList,
        Self::DealActions,
        Self::WriteComment,
        Self::AddComment,
        Self::TasksList,
        Self::TaskComplete,
    ];

    /// Returns true if `self` may directly follow `prev`.
    #[must_use]
    pub fn may_follow(self, prev: Self) -> bool {
        use DialogState::{
            AddComment, DealActions, DealsList, Started, TaskComplete, TasksList, WriteComment,
        };
        match self {
            Started => true,
            DealsList => matches!(prev, Started | DealActions),
            DealActions => matches!(prev, DealsList | AddComment | TasksList | TaskComplete),
            WriteComment => matches!(prev, DealActions),
            AddComment => matches!(prev, WriteComment),
            TasksList => matches!(prev, DealActions | AddComment),
            TaskComplete => matches!(prev, TasksList),
        }
    }

    /// Returns the name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::DealsList => "DealsList",
            Self::DealActions => "DealActions",
            Self::WriteComment => "WriteComment",
            Self::AddComment => "AddComment",
            Self::TasksList => "TasksList",
            Self::TaskComplete => "TaskComplete",
        }
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogFlow {
    state: DialogState,
    done: bool,
}

impl DialogFlow {
    /// A flow sitting in a completed `Started` stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DialogState::Started,
            done: true,
        }
    }

    /// Moves to `target`.
    ///
    /// Fails with `PrevStateNotComplete` while the current stage is not
    /// done, and with `InvalidOrder` when `target` may not follow it. On
    /// success the new stage is not done.
    pub fn set(&mut self, target: DialogState) -> Result<(), FlowError> {
        if !self.done {
            return Err(FlowError::PrevStateNotComplete { state: self.state });
        }
        if !target.may_follow(self.state) {
            return Err(FlowError::InvalidOrder {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        self.done = false;
        Ok(())
    }

    /// Like [`set`](Self::set), but re-entering a stage whose previous
    /// attempt did not complete is accepted.
    pub fn enter(&mut self, target: DialogState) -> Result<(), FlowError> {
        if !self.done && self.state == target {
            return Ok(());
        }
        self.set(target)
    }

    /// Marks the current stage as completed.
    pub fn done(&mut self) {
        self.done = true;
    }

    /// Back to a completed `Started` stage, whatever the current state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn get(&self) -> DialogState {
        self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Default for DialogFlow {
    fn default() -> Self {
        Self::new()
    }
}

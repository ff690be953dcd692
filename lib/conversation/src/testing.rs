//! In-memory test doubles for the CRM and the transport.

use crate::error::TransportError;
use crate::transport::{MenuOption, MessageRef, Reply, Transport};
use async_trait::async_trait;
use deal_courier_core::{CommentId, CrmUserId, DealId, ExternalUserId, Result, TaskId};
use deal_courier_crm::{CrmActor, CrmError, CrmUser, Deal, Task, TaskStatus};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

pub fn deal(id: u64, title: &str) -> Deal {
    Deal {
        id: DealId::new(id),
        title: title.to_string(),
        type_id: None,
        category_id: None,
        stage_id: "C1:PREPARATION".to_string(),
    }
}

pub fn task(id: u64, title: &str) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        status: TaskStatus::Pending,
    }
}

/// A CRM actor serving fixed deals and tasks.
pub struct MockActor {
    user: CrmUser,
    deals: Vec<Deal>,
    tasks: Vec<Task>,
    fail_next: AtomicBool,
    comments: Mutex<Vec<(DealId, String)>>,
    completed: Mutex<Vec<TaskId>>,
}

impl MockActor {
    pub fn new(deals: Vec<Deal>) -> Self {
        Self {
            user: CrmUser {
                id: CrmUserId::new(7),
                name: "Test".to_string(),
                last_name: "User".to_string(),
            },
            deals,
            tasks: Vec::new(),
            fail_next: AtomicBool::new(false),
            comments: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Every deal reports these tasks.
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Makes the next CRM call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn comments(&self) -> Vec<(DealId, String)> {
        self.comments.lock().expect("lock").clone()
    }

    pub fn completed(&self) -> Vec<TaskId> {
        self.completed.lock().expect("lock").clone()
    }

    fn check(&self, method: &str) -> Result<(), CrmError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CrmError::RequestFailed {
                method: method.to_string(),
                reason: "connection reset".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CrmActor for MockActor {
    fn profile(&self) -> &CrmUser {
        &self.user
    }

    async fn list_deals(&self) -> Result<Vec<Deal>, CrmError> {
        self.check("crm.deal.list")?;
        Ok(self.deals.clone())
    }

    async fn add_comment_to_deal(
        &self,
        deal: DealId,
        comment: &str,
    ) -> Result<CommentId, CrmError> {
        self.check("crm.timeline.comment.add")?;
        let mut comments = self.comments.lock().expect("lock");
        comments.push((deal, comment.to_string()));
        Ok(CommentId::new(comments.len() as u64))
    }

    async fn list_deal_tasks(&self, _deal: DealId) -> Result<Vec<Task>, CrmError> {
        self.check("tasks.task.list")?;
        Ok(self.tasks.clone())
    }

    async fn complete_task(&self, task: TaskId) -> Result<(), CrmError> {
        self.check("tasks.task.complete")?;
        self.completed.lock().expect("lock").push(task);
        Ok(())
    }
}

/// A transport that records every message instead of delivering it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ExternalUserId, Reply, MessageRef)>>,
    deleted: Mutex<Vec<MessageRef>>,
    next_id: AtomicI64,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingTransport {
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn replies(&self) -> Vec<Reply> {
        let sent = self.sent.lock().expect("lock");
        sent.iter().map(|(_, reply, _)| reply.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|reply| reply.text).collect()
    }

    pub fn last_reply(&self) -> Reply {
        self.replies().pop().expect("no reply sent")
    }

    pub fn sent_refs(&self) -> Vec<MessageRef> {
        let sent = self.sent.lock().expect("lock");
        sent.iter().map(|(_, _, message)| *message).collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().expect("lock").clone()
    }

    /// Finds the most recently sent option with this label.
    pub fn option(&self, label: &str) -> MenuOption {
        self.replies()
            .into_iter()
            .rev()
            .flat_map(|reply| reply.options)
            .find(|option| option.label == label)
            .unwrap_or_else(|| panic!("no option labelled {label:?}"))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user: ExternalUserId, reply: Reply) -> Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                reason: "chat not found".to_string(),
            }
            .into());
        }
        let message = MessageRef::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().expect("lock").push((user, reply, message));
        Ok(message)
    }

    async fn delete(&self, _user: ExternalUserId, message: MessageRef) -> Result<(), TransportError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::DeleteFailed {
                reason: "message can't be deleted".to_string(),
            }
            .into());
        }
        self.deleted.lock().expect("lock").push(message);
        Ok(())
    }
}

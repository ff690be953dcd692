//! Per-user conversation sessions.
//!
//! A session owns the dialog flow, the tagged slots backing every button it
//! has shown, and the latch for an expected free-text comment. Each stage
//! handler follows the same steps: enter the stage, resolve the callback
//! payload, call the CRM, then publish fresh tags and complete the stage.
//! Failures are rendered back to the user here; only transport failures
//! leave a handler.

use crate::error::{StageError, TransportError};
use crate::flow::{DialogFlow, DialogState};
use crate::menu::{self, DialogOptions};
use crate::tag::{Selection, Tag, TaggedVar, decode_indexed, decode_selection, decode_tag};
use crate::transport::{Action, MessageRef, Reply, Transport, parse_callback};
use chrono::{DateTime, Utc};
use deal_courier_core::{ConversationSessionId, ExternalUserId, Result};
use deal_courier_crm::{CrmActor, Deal, Task};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

type StageResult = std::result::Result<(), StageError>;

/// An inbound event routed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user asked for the entry menu.
    Start,
    /// The user pressed a button.
    Callback { data: String },
    /// The user sent a text message.
    Text { text: String, message: MessageRef },
}

/// Tasks listed for a deal.
#[derive(Debug, Clone)]
pub struct DealTasks {
    pub deal: Deal,
    pub tasks: Vec<Task>,
}

/// A comment the session is waiting for.
#[derive(Debug, Clone, Copy)]
struct PendingComment {
    /// Tag of the deal the comment belongs to.
    deal_tag: Tag,
    /// The prompt asking for the comment.
    prompt: Option<MessageRef>,
}

/// Conversation state for one external user.
pub struct Session {
    id: ConversationSessionId,
    user: ExternalUserId,
    actor: Arc<dyn CrmActor>,
    transport: Arc<dyn Transport>,
    options: Arc<DialogOptions>,
    flow: DialogFlow,
    deals: TaggedVar<Vec<Deal>>,
    deal: TaggedVar<Deal>,
    tasks: TaggedVar<DealTasks>,
    pending_comment: Option<PendingComment>,
    last_menu: Option<MessageRef>,
    started_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for an authenticated user.
    #[must_use]
    pub fn new(
        user: ExternalUserId,
        actor: Arc<dyn CrmActor>,
        transport: Arc<dyn Transport>,
        options: Arc<DialogOptions>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationSessionId::new(),
            user,
            actor,
            transport,
            options,
            flow: DialogFlow::new(),
            deals: TaggedVar::new(),
            deal: TaggedVar::new(),
            tasks: TaggedVar::new(),
            pending_comment: None,
            last_menu: None,
            started_at: now,
            last_active_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConversationSessionId {
        self.id
    }

    #[must_use]
    pub fn user(&self) -> ExternalUserId {
        self.user
    }

    #[must_use]
    pub fn flow(&self) -> &DialogFlow {
        &self.flow
    }

    /// Returns true while a free-text comment is expected.
    #[must_use]
    pub fn awaiting_comment(&self) -> bool {
        self.pending_comment.is_some()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    /// Routes an inbound event to its stage handler.
    #[instrument(skip(self, event), fields(user = %self.user, session = %self.id))]
    pub async fn handle(&mut self, event: SessionEvent) -> Result<(), TransportError> {
        self.last_active_at = Utc::now();
        match event {
            SessionEvent::Start => self.on_start().await,
            SessionEvent::Callback { data } => self.on_callback(&data).await,
            SessionEvent::Text { text, message } => self.on_add_comment(&text, message).await,
        }
    }

    /// Resets the conversation and shows the entry menu.
    pub async fn on_start(&mut self) -> Result<(), TransportError> {
        self.flow.reset();
        if let Some(pending) = self.pending_comment.take()
            && let Some(prompt) = pending.prompt
        {
            self.discard(prompt).await;
        }
        let result = self.start().await;
        self.recover(result).await
    }

    async fn on_callback(&mut self, data: &str) -> Result<(), TransportError> {
        let Some((action, payload)) = parse_callback(data) else {
            let err = StageError::UnknownAction {
                raw: data.to_string(),
            };
            return self.recover(Err(err)).await;
        };
        debug!(%action, payload, "callback");
        match action {
            Action::Start => {
                let result = self.start().await;
                self.recover(result).await
            }
            Action::ListDeals => self.on_list_deals().await,
            Action::SelectDeal => self.on_deal_actions(payload).await,
            Action::WriteComment => self.on_write_comment(payload).await,
            Action::ListTasks => self.on_list_tasks(payload).await,
            Action::CompleteTask => self.on_complete_task(payload).await,
        }
    }

    /// Lists the user's open deals.
    pub async fn on_list_deals(&mut self) -> Result<(), TransportError> {
        let result = self.list_deals().await;
        self.recover(result).await
    }

    /// Shows the actions for a deal picked from the list, or re-shows them
    /// for the current deal.
    pub async fn on_deal_actions(&mut self, payload: &str) -> Result<(), TransportError> {
        let result = self.deal_actions(payload).await;
        self.recover(result).await
    }

    /// Asks for a comment on the current deal.
    pub async fn on_write_comment(&mut self, payload: &str) -> Result<(), TransportError> {
        let result = self.write_comment(payload).await;
        self.recover(result).await
    }

    /// Adds free text as a comment, if one is expected.
    pub async fn on_add_comment(
        &mut self,
        text: &str,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        let Some(pending) = self.pending_comment.take() else {
            debug!("text received while no comment is expected");
            self.say(menu::text_not_expected()).await?;
            return Ok(());
        };
        let result = self.add_comment(pending, text, message).await;
        if matches!(result, Err(StageError::Crm { .. })) {
            self.pending_comment = Some(pending);
        }
        self.recover(result).await
    }

    /// Lists the open tasks of the current deal.
    pub async fn on_list_tasks(&mut self, payload: &str) -> Result<(), TransportError> {
        let result = self.list_tasks(payload).await;
        self.recover(result).await
    }

    /// Completes a task picked from the task list.
    pub async fn on_complete_task(&mut self, payload: &str) -> Result<(), TransportError> {
        let result = self.complete_task(payload).await;
        self.recover(result).await
    }

    async fn start(&mut self) -> StageResult {
        self.flow.enter(DialogState::Started)?;
        let reply = menu::start(self.actor.profile());
        self.ask(reply).await?;
        self.flow.done();
        Ok(())
    }

    async fn list_deals(&mut self) -> StageResult {
        self.flow.enter(DialogState::DealsList)?;
        let deals = self
            .actor
            .list_deals()
            .await
            .map_err(|report| StageError::crm("list deals", &report))?;

        if deals.is_empty() {
            self.clear_menu().await;
            self.say(menu::no_deals()).await?;
            self.flow.done();
            return self.start().await;
        }

        debug!(count = deals.len(), "listing deals");
        let tag = self.deals.set(deals.clone());
        self.ask(menu::deal_list(&deals, tag)).await?;
        self.flow.done();
        Ok(())
    }

    async fn deal_actions(&mut self, payload: &str) -> StageResult {
        self.flow.enter(DialogState::DealActions)?;
        let selection =
            decode_selection(payload).map_err(|e| StageError::payload(e, payload))?;
        let deal = match selection {
            Selection::Indexed { tag, index } => {
                let deals = self
                    .deals
                    .get(tag)
                    .map_err(|e| StageError::payload(e, payload))?;
                deals
                    .get(index)
                    .cloned()
                    .ok_or(StageError::IndexOutOfRange {
                        index,
                        len: deals.len(),
                    })?
            }
            Selection::Tag(tag) => self
                .deal
                .get(tag)
                .map_err(|e| StageError::payload(e, payload))?
                .clone(),
        };
        self.show_deal(deal).await
    }

    /// Publishes `deal` under a fresh tag and completes `DealActions`.
    async fn show_deal(&mut self, deal: Deal) -> StageResult {
        let tag = self.deal.set(deal.clone());
        self.ask(menu::deal_actions(&deal, tag)).await?;
        self.flow.done();
        Ok(())
    }

    async fn write_comment(&mut self, payload: &str) -> StageResult {
        self.flow.enter(DialogState::WriteComment)?;
        let deal_tag = decode_tag(payload).map_err(|e| StageError::payload(e, payload))?;
        let deal = self
            .deal
            .get(deal_tag)
            .map_err(|e| StageError::payload(e, payload))?
            .clone();

        if let Some(previous) = self.pending_comment.take()
            && let Some(prompt) = previous.prompt
        {
            self.discard(prompt).await;
        }
        self.clear_menu().await;
        let prompt = self.say(menu::comment_prompt(&deal)).await?;
        self.pending_comment = Some(PendingComment {
            deal_tag,
            prompt: Some(prompt),
        });
        // completed when the comment arrives
        Ok(())
    }

    async fn add_comment(
        &mut self,
        pending: PendingComment,
        text: &str,
        message: MessageRef,
    ) -> StageResult {
        if self.flow.get() == DialogState::WriteComment && !self.flow.is_done() {
            self.flow.done();
        }
        self.flow.enter(DialogState::AddComment)?;
        let deal = self
            .deal
            .get(pending.deal_tag)
            .map_err(|e| StageError::payload(e, &pending.deal_tag.to_hex()))?
            .clone();

        let comment = self
            .actor
            .add_comment_to_deal(deal.id, text)
            .await
            .map_err(|report| StageError::crm("add the comment", &report))?;
        info!(deal = %deal.id, %comment, "comment added");

        if let Some(prompt) = pending.prompt {
            self.discard(prompt).await;
        }
        self.discard(message).await;
        self.say(menu::comment_added(&deal, text)).await?;
        self.ask(menu::offer_task_completion(pending.deal_tag))
            .await?;
        self.flow.done();
        Ok(())
    }

    async fn list_tasks(&mut self, payload: &str) -> StageResult {
        self.flow.enter(DialogState::TasksList)?;
        let deal_tag = decode_tag(payload).map_err(|e| StageError::payload(e, payload))?;
        let deal = self
            .deal
            .get(deal_tag)
            .map_err(|e| StageError::payload(e, payload))?
            .clone();

        let tasks = self
            .actor
            .list_deal_tasks(deal.id)
            .await
            .map_err(|report| StageError::crm("list tasks", &report))?;

        if tasks.is_empty() {
            self.clear_menu().await;
            self.say(menu::no_tasks()).await?;
            self.flow.done();
            self.flow.enter(DialogState::DealActions)?;
            return self.show_deal(deal).await;
        }

        debug!(deal = %deal.id, count = tasks.len(), "listing tasks");
        let tasks_tag = self.tasks.set(DealTasks {
            deal,
            tasks: tasks.clone(),
        });
        let reply = menu::task_list(&self.options, &tasks, tasks_tag, deal_tag);
        self.ask(reply).await?;
        self.flow.done();
        Ok(())
    }

    async fn complete_task(&mut self, payload: &str) -> StageResult {
        self.flow.enter(DialogState::TaskComplete)?;
        let (tag, index) = decode_indexed(payload).map_err(|e| StageError::payload(e, payload))?;
        let listed = self
            .tasks
            .get(tag)
            .map_err(|e| StageError::payload(e, payload))?;
        let task = listed
            .tasks
            .get(index)
            .cloned()
            .ok_or(StageError::IndexOutOfRange {
                index,
                len: listed.tasks.len(),
            })?;
        let deal = listed.deal.clone();

        self.actor
            .complete_task(task.id)
            .await
            .map_err(|report| StageError::crm("complete the task", &report))?;
        info!(deal = %deal.id, task = %task.id, "task completed");

        self.clear_menu().await;
        self.say(menu::task_completed(&task)).await?;
        self.flow.done();
        self.flow.enter(DialogState::DealActions)?;
        self.show_deal(deal).await
    }

    /// Renders a stage failure to the user.
    async fn recover(&mut self, result: StageResult) -> Result<(), TransportError> {
        let Err(err) = result else {
            return Ok(());
        };
        let reply = self.render(err)?;
        self.say(reply).await?;
        Ok(())
    }

    fn render(&self, err: StageError) -> Result<Reply, TransportError> {
        let state = self.flow.get();
        let reply = match err {
            StageError::Transport(report) => return Err(report),
            StageError::Flow(flow_error) => {
                info!(%state, error = %flow_error, "stage requested out of order");
                menu::out_of_order()
            }
            StageError::Payload { source, raw } => {
                warn!(%state, payload = %raw, error = %source, "rejected callback payload");
                menu::invalid_selection()
            }
            StageError::UnknownAction { raw } => {
                warn!(%state, payload = %raw, "unknown callback action");
                menu::invalid_selection()
            }
            StageError::IndexOutOfRange { index, len } => {
                error!(%state, index, len, "selection index out of range");
                menu::internal_error()
            }
            StageError::Crm { operation, details } => {
                warn!(%state, operation, error = %details, "crm operation failed");
                menu::crm_failure(operation, &details)
            }
        };
        Ok(reply)
    }

    /// Sends a menu, replacing the previous one.
    async fn ask(&mut self, reply: Reply) -> Result<MessageRef, TransportError> {
        self.clear_menu().await;
        let message = self.transport.send(self.user, reply).await?;
        self.last_menu = Some(message);
        Ok(message)
    }

    async fn say(&mut self, reply: Reply) -> Result<MessageRef, TransportError> {
        let message = self.transport.send(self.user, reply).await?;
        Ok(message)
    }

    async fn clear_menu(&mut self) {
        if let Some(menu) = self.last_menu.take() {
            self.discard(menu).await;
        }
    }

    /// Deletes a message; failures are only logged.
    async fn discard(&self, message: MessageRef) {
        if let Err(report) = self.transport.delete(self.user, message).await {
            warn!(message_id = message.message_id, error = %report, "failed to delete message");
        }
    }
}

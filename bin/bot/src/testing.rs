//! Test doubles for the CRM directory and the Bot API.

use crate::error::TelegramError;
use crate::telegram::{BotApi, Update};
use async_trait::async_trait;
use deal_courier_conversation::{MessageRef, Reply, Transport, TransportError};
use deal_courier_core::{CommentId, CrmUserId, DealId, ExternalUserId, Result, TaskId};
use deal_courier_crm::{CrmActor, CrmDirectory, CrmError, CrmUser, Deal, Task};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// The phone number [`OnePerson`] knows.
pub const KNOWN_PHONE: &str = "+79990001122";

/// CRM id of the person behind [`KNOWN_PHONE`].
pub const KNOWN_ID: u64 = 31;

struct Person(CrmUser);

#[async_trait]
impl CrmActor for Person {
    fn profile(&self) -> &CrmUser {
        &self.0
    }

    async fn list_deals(&self) -> Result<Vec<Deal>, CrmError> {
        Ok(Vec::new())
    }

    async fn add_comment_to_deal(
        &self,
        _deal: DealId,
        _comment: &str,
    ) -> Result<CommentId, CrmError> {
        Ok(CommentId::new(1))
    }

    async fn list_deal_tasks(&self, _deal: DealId) -> Result<Vec<Task>, CrmError> {
        Ok(Vec::new())
    }

    async fn complete_task(&self, _task: TaskId) -> Result<(), CrmError> {
        Ok(())
    }
}

fn person() -> Arc<dyn CrmActor> {
    Arc::new(Person(CrmUser {
        id: CrmUserId::new(KNOWN_ID),
        name: "Ivan".to_string(),
        last_name: "Sidorov".to_string(),
    }))
}

/// A directory that knows exactly one person.
pub struct OnePerson;

#[async_trait]
impl CrmDirectory for OnePerson {
    async fn authenticate_by_phone(&self, phone: &str) -> Result<Arc<dyn CrmActor>, CrmError> {
        if phone == KNOWN_PHONE {
            Ok(person())
        } else {
            Err(CrmError::UserNotFound {
                lookup: format!("PERSONAL_MOBILE {phone}"),
            }
            .into())
        }
    }

    async fn authenticate_by_id(&self, id: CrmUserId) -> Result<Arc<dyn CrmActor>, CrmError> {
        if id == CrmUserId::new(KNOWN_ID) {
            Ok(person())
        } else {
            Err(CrmError::UserNotFound {
                lookup: format!("ID {id}"),
            }
            .into())
        }
    }
}

/// Records everything the bot would have sent.
#[derive(Default)]
pub struct FakeBot {
    notices: Mutex<Vec<(ExternalUserId, String)>>,
    contact_requests: Mutex<Vec<ExternalUserId>>,
    replies: Mutex<Vec<Reply>>,
    deleted: Mutex<Vec<MessageRef>>,
    next_message: AtomicI64,
}

impl FakeBot {
    pub fn notices(&self) -> Vec<String> {
        let notices = self.notices.lock().expect("notices");
        notices.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn contact_requests(&self) -> Vec<ExternalUserId> {
        self.contact_requests.lock().expect("requests").clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().expect("replies").clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().expect("deleted").clone()
    }
}

#[async_trait]
impl Transport for FakeBot {
    async fn send(&self, _user: ExternalUserId, reply: Reply) -> Result<MessageRef, TransportError> {
        self.replies.lock().expect("replies").push(reply);
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef::new(id))
    }

    async fn delete(&self, _user: ExternalUserId, message: MessageRef) -> Result<(), TransportError> {
        self.deleted.lock().expect("deleted").push(message);
        Ok(())
    }
}

#[async_trait]
impl BotApi for FakeBot {
    async fn get_updates(&self, _offset: i64) -> Result<Vec<Update>, TelegramError> {
        Ok(Vec::new())
    }

    async fn send_text(&self, user: ExternalUserId, text: &str) -> Result<(), TelegramError> {
        self.notices
            .lock()
            .expect("notices")
            .push((user, text.to_string()));
        Ok(())
    }

    async fn request_contact(
        &self,
        user: ExternalUserId,
        _text: &str,
        _button: &str,
    ) -> Result<(), TelegramError> {
        self.contact_requests.lock().expect("requests").push(user);
        Ok(())
    }

    async fn answer_callback_query(&self, _query_id: &str) -> Result<(), TelegramError> {
        Ok(())
    }
}

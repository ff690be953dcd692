//! Routing Telegram updates to sessions.
//!
//! Updates are polled on one task and fanned out to one worker per user over
//! an unbounded channel, so a user's events are handled strictly in arrival
//! order while different users proceed in parallel. A worker that stays idle
//! for [`WORKER_IDLE`] exits; the next update for that user spawns a new one.

use crate::auth::Authenticator;
use crate::telegram::{BotApi, Update};
use deal_courier_conversation::{
    MessageRef, SessionEvent, SessionManager, SharedSession, TransportError,
};
use deal_courier_core::{ExternalUserId, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::SendError};
use tracing::{debug, error, info, instrument, warn};

const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// How long a per-user worker waits for its next update before exiting.
pub const WORKER_IDLE: Duration = Duration::from_secs(600);

const BOTS_REFUSED: &str = "Bots are not allowed.";
const CONTACT_PROMPT: &str = "Please share your contact so I can find you in the CRM.";
const CONTACT_BUTTON: &str = "Share contact";
const FOREIGN_CONTACT: &str = "Please share your own contact.";
const NOT_IN_CRM: &str =
    "Could not find you in the CRM. Check the mobile phone in your CRM profile and try again.";
const LINKED: &str = "Thanks, you are signed in.";
const STOPPED: &str = "Session closed. Send <code>/start</code> to begin again.";
const UNKNOWN_COMMAND: &str = "Unknown command. Send <code>/start</code> to start over.";

/// A slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Unknown(String),
}

impl Command {
    /// Parses `/name`, `/name@bot` or `/name args`.
    fn parse(text: &str) -> Option<Self> {
        let name = text.strip_prefix('/')?.split_whitespace().next()?;
        let name = name.split('@').next().unwrap_or(name);
        Some(match name {
            "start" => Self::Start,
            "stop" => Self::Stop,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// What a user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Callback {
        query_id: String,
        data: String,
    },
    Text {
        text: String,
        message: MessageRef,
    },
    Contact {
        phone: String,
        owner: Option<ExternalUserId>,
        message: MessageRef,
    },
}

/// An update reduced to what the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub user: ExternalUserId,
    pub is_bot: bool,
    pub inbound: Inbound,
}

/// Classifies an update; updates the bot does not handle yield `None`.
///
/// Only private chats are served. A callback is dropped when the message
/// carrying its button sits in any other chat.
#[must_use]
pub fn classify(update: Update) -> Option<Incoming> {
    if let Some(query) = update.callback_query {
        if let Some(message) = &query.message
            && !message.chat.is_private()
        {
            debug!(
                chat = message.chat.id,
                kind = %message.chat.kind,
                "ignoring callback from non-private chat"
            );
            return None;
        }
        return Some(Incoming {
            user: ExternalUserId::new(query.from.id),
            is_bot: query.from.is_bot,
            inbound: Inbound::Callback {
                query_id: query.id,
                data: query.data?,
            },
        });
    }

    let message = update.message?;
    if !message.chat.is_private() {
        debug!(chat = message.chat.id, kind = %message.chat.kind, "ignoring non-private chat");
        return None;
    }
    let from = message.from?;
    let reference = MessageRef::new(message.message_id);
    let inbound = if let Some(contact) = message.contact {
        Inbound::Contact {
            phone: contact.phone_number,
            owner: contact.user_id.map(ExternalUserId::new),
            message: reference,
        }
    } else {
        let text = message.text?;
        match Command::parse(&text) {
            Some(command) => Inbound::Command(command),
            None => Inbound::Text {
                text,
                message: reference,
            },
        }
    };
    Some(Incoming {
        user: ExternalUserId::new(from.id),
        is_bot: from.is_bot,
        inbound,
    })
}

/// Polls Telegram and drives sessions.
pub struct Dispatcher {
    bot: Arc<dyn BotApi>,
    auth: Authenticator,
    sessions: SessionManager,
}

impl Dispatcher {
    #[must_use]
    pub fn new(bot: Arc<dyn BotApi>, auth: Authenticator, sessions: SessionManager) -> Self {
        Self {
            bot,
            auth,
            sessions,
        }
    }

    /// Polls until `shutdown` resolves.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut workers = HashMap::new();
        let mut offset = 0;
        info!("polling for updates");
        loop {
            let polled = tokio::select! {
                () = &mut shutdown => break,
                polled = self.bot.get_updates(offset) => polled,
            };
            let updates = match polled {
                Ok(updates) => updates,
                Err(report) => {
                    warn!(error = %report, "failed to poll updates");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(incoming) = classify(update) {
                    self.route(&mut workers, incoming);
                }
            }
        }
        info!(sessions = self.sessions.len(), "stopped polling");
    }

    fn route(
        self: &Arc<Self>,
        workers: &mut HashMap<ExternalUserId, UnboundedSender<Incoming>>,
        incoming: Incoming,
    ) {
        let user = incoming.user;
        let incoming = match workers.get(&user) {
            Some(sender) => match sender.send(incoming) {
                Ok(()) => return,
                Err(SendError(incoming)) => incoming,
            },
            None => incoming,
        };

        workers.retain(|_, sender| !sender.is_closed());
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(self).work(user, receiver));
        if sender.send(incoming).is_err() {
            error!(%user, "worker exited before its first update");
        }
        workers.insert(user, sender);
    }

    async fn work(self: Arc<Self>, user: ExternalUserId, mut receiver: UnboundedReceiver<Incoming>) {
        debug!(%user, "worker started");
        loop {
            match tokio::time::timeout(WORKER_IDLE, receiver.recv()).await {
                Ok(Some(incoming)) => self.process(incoming).await,
                Ok(None) => break,
                Err(_) => {
                    receiver.close();
                    while let Ok(incoming) = receiver.try_recv() {
                        self.process(incoming).await;
                    }
                    break;
                }
            }
        }
        debug!(%user, "worker stopped");
    }

    #[instrument(skip(self, incoming), fields(user = %incoming.user))]
    async fn process(&self, incoming: Incoming) {
        let user = incoming.user;
        if incoming.is_bot {
            warn!("refusing bot account");
            self.notify(user, BOTS_REFUSED).await;
            return;
        }
        let result = match incoming.inbound {
            Inbound::Command(Command::Start) => self.deliver(user, SessionEvent::Start).await,
            Inbound::Command(Command::Stop) => {
                self.sessions.stop(user);
                self.notify(user, STOPPED).await;
                Ok(())
            }
            Inbound::Command(Command::Unknown(name)) => {
                debug!(command = %name, "unknown command");
                self.notify(user, UNKNOWN_COMMAND).await;
                Ok(())
            }
            Inbound::Callback { query_id, data } => {
                if let Err(report) = self.bot.answer_callback_query(&query_id).await {
                    debug!(error = %report, "failed to answer callback query");
                }
                self.deliver(user, SessionEvent::Callback { data }).await
            }
            Inbound::Text { text, message } => {
                self.deliver(user, SessionEvent::Text { text, message })
                    .await
            }
            Inbound::Contact {
                phone,
                owner,
                message,
            } => self.link_contact(user, &phone, owner, message).await,
        };
        if let Err(report) = result {
            error!(error = %report, "failed to deliver reply");
        }
    }

    /// Hands an event to the user's session, opening one for linked users.
    async fn deliver(&self, user: ExternalUserId, event: SessionEvent) -> Result<(), TransportError> {
        let Some(session) = self.session_for(user).await else {
            return Ok(());
        };
        let mut session = session.lock().await;
        session.handle(event).await
    }

    async fn session_for(&self, user: ExternalUserId) -> Option<SharedSession> {
        if let Some(session) = self.sessions.get(user) {
            return Some(session);
        }
        match self.auth.resume(user).await {
            Ok(Some(actor)) => Some(self.sessions.start(user, actor)),
            Ok(None) => {
                self.ask_for_contact(user).await;
                None
            }
            Err(report) => {
                warn!(error = %report, "failed to resume linked user");
                self.ask_for_contact(user).await;
                None
            }
        }
    }

    async fn link_contact(
        &self,
        user: ExternalUserId,
        phone: &str,
        owner: Option<ExternalUserId>,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        if owner != Some(user) {
            warn!(owner = ?owner, "contact does not belong to sender");
            self.notify(user, FOREIGN_CONTACT).await;
            return Ok(());
        }
        let actor = match self.auth.link_by_phone(user, phone).await {
            Ok(actor) => actor,
            Err(report) => {
                warn!(error = %report, "contact did not resolve to a crm user");
                self.notify(user, NOT_IN_CRM).await;
                return Ok(());
            }
        };
        if let Err(report) = self.bot.delete(user, message).await {
            debug!(error = %report, "failed to delete contact message");
        }
        self.notify(user, LINKED).await;

        let session = self.sessions.start(user, actor);
        let mut session = session.lock().await;
        session.handle(SessionEvent::Start).await
    }

    async fn notify(&self, user: ExternalUserId, text: &str) {
        if let Err(report) = self.bot.send_text(user, text).await {
            warn!(error = %report, "failed to send notice");
        }
    }

    async fn ask_for_contact(&self, user: ExternalUserId) {
        if let Err(report) = self
            .bot
            .request_contact(user, CONTACT_PROMPT, CONTACT_BUTTON)
            .await
        {
            warn!(error = %report, "failed to request contact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{CallbackQuery, Chat, Contact, Message, User};
    use crate::testing::{FakeBot, KNOWN_ID, KNOWN_PHONE, OnePerson};
    use deal_courier_conversation::DialogOptions;
    use deal_courier_core::CrmUserId;
    use deal_courier_crm::LinkStore;

    const SENDER: i64 = 5;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        bot: Arc<FakeBot>,
        links: Arc<LinkStore>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let links = Arc::new(LinkStore::open(dir.path().join("links.json")));
            let bot = Arc::new(FakeBot::default());
            let auth = Authenticator::new(Arc::new(OnePerson), Arc::clone(&links));
            let sessions = SessionManager::new(bot.clone(), DialogOptions::default());
            Self {
                dispatcher: Arc::new(Dispatcher::new(bot.clone(), auth, sessions)),
                bot,
                links,
                _dir: dir,
            }
        }

        fn linked() -> Self {
            let h = Self::new();
            h.links
                .set(ExternalUserId::new(SENDER), CrmUserId::new(KNOWN_ID));
            h
        }

        async fn send(&self, is_bot: bool, inbound: Inbound) {
            self.dispatcher
                .process(Incoming {
                    user: ExternalUserId::new(SENDER),
                    is_bot,
                    inbound,
                })
                .await;
        }

        fn has_session(&self) -> bool {
            self.dispatcher
                .sessions
                .exists(ExternalUserId::new(SENDER))
        }
    }

    fn contact(owner: i64) -> Inbound {
        Inbound::Contact {
            phone: KNOWN_PHONE.to_string(),
            owner: Some(ExternalUserId::new(owner)),
            message: MessageRef::new(77),
        }
    }

    fn unknown_command(user: i64) -> Incoming {
        Incoming {
            user: ExternalUserId::new(user),
            is_bot: false,
            inbound: Inbound::Command(Command::Unknown("help".to_string())),
        }
    }

    fn user(id: i64, is_bot: bool) -> User {
        User {
            id,
            is_bot,
            first_name: "Ann".to_string(),
        }
    }

    fn message(from: i64, chat_kind: &str) -> Message {
        Message {
            message_id: 77,
            from: Some(user(from, false)),
            chat: Chat {
                id: from,
                kind: chat_kind.to_string(),
            },
            text: None,
            contact: None,
        }
    }

    fn update_with(message: Message) -> Update {
        Update {
            update_id: 1,
            message: Some(message),
            callback_query: None,
        }
    }

    fn text_update(text: &str) -> Update {
        let mut message = message(42, "private");
        message.text = Some(text.to_string());
        update_with(message)
    }

    #[test]
    fn commands_are_recognized() {
        let incoming = classify(text_update("/start")).expect("incoming");
        assert_eq!(incoming.inbound, Inbound::Command(Command::Start));

        let incoming = classify(text_update("/stop@deal_courier_bot")).expect("incoming");
        assert_eq!(incoming.inbound, Inbound::Command(Command::Stop));

        let incoming = classify(text_update("/help me")).expect("incoming");
        assert_eq!(
            incoming.inbound,
            Inbound::Command(Command::Unknown("help".to_string()))
        );
    }

    #[test]
    fn plain_text_keeps_message_reference() {
        let incoming = classify(text_update("Client agreed")).expect("incoming");
        assert_eq!(incoming.user, ExternalUserId::new(42));
        assert_eq!(
            incoming.inbound,
            Inbound::Text {
                text: "Client agreed".to_string(),
                message: MessageRef::new(77),
            }
        );
    }

    #[test]
    fn callback_queries_carry_data() {
        let update = Update {
            update_id: 2,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "q1".to_string(),
                from: user(42, false),
                message: None,
                data: Some("deals".to_string()),
            }),
        };
        let incoming = classify(update).expect("incoming");
        assert_eq!(
            incoming.inbound,
            Inbound::Callback {
                query_id: "q1".to_string(),
                data: "deals".to_string(),
            }
        );
    }

    #[test]
    fn contact_owner_is_reported() {
        let mut message = message(42, "private");
        message.contact = Some(Contact {
            phone_number: "79990001122".to_string(),
            user_id: Some(43),
        });
        let incoming = classify(update_with(message)).expect("incoming");
        assert_eq!(
            incoming.inbound,
            Inbound::Contact {
                phone: "79990001122".to_string(),
                owner: Some(ExternalUserId::new(43)),
                message: MessageRef::new(77),
            }
        );
    }

    #[test]
    fn bots_are_flagged() {
        let mut message = message(42, "private");
        message.from = Some(user(42, true));
        message.text = Some("hi".to_string());
        let incoming = classify(update_with(message)).expect("incoming");
        assert!(incoming.is_bot);
    }

    #[test]
    fn group_chats_are_ignored() {
        let mut message = message(42, "group");
        message.text = Some("/start".to_string());
        assert!(classify(update_with(message)).is_none());
    }

    #[test]
    fn messages_without_text_or_contact_are_ignored() {
        assert!(classify(update_with(message(42, "private"))).is_none());
    }

    #[test]
    fn slash_alone_is_not_a_command() {
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse("start"), None);
    }

    #[test]
    fn callbacks_from_group_chats_are_ignored() {
        let update = Update {
            update_id: 3,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "q2".to_string(),
                from: user(42, false),
                message: Some(message(-100, "supergroup")),
                data: Some("deals".to_string()),
            }),
        };
        assert!(classify(update).is_none());
    }

    #[tokio::test]
    async fn foreign_contact_is_not_linked() {
        let h = Harness::new();
        h.send(false, contact(SENDER + 1)).await;

        assert!(h.links.is_empty());
        assert!(!h.has_session());
        assert_eq!(h.bot.notices(), [FOREIGN_CONTACT]);
        assert!(h.bot.deleted().is_empty());
    }

    #[tokio::test]
    async fn own_contact_links_and_opens_entry_menu() {
        let h = Harness::new();
        h.send(false, contact(SENDER)).await;

        assert_eq!(
            h.links.get(ExternalUserId::new(SENDER)),
            Some(CrmUserId::new(KNOWN_ID))
        );
        assert!(h.has_session());
        assert_eq!(h.bot.notices(), [LINKED]);
        assert!(h.bot.deleted().contains(&MessageRef::new(77)));
        let greeting = h.bot.replies().pop().expect("entry menu");
        assert!(greeting.text.contains("Ivan"));
    }

    #[tokio::test]
    async fn bot_accounts_are_refused() {
        let h = Harness::linked();
        h.send(true, Inbound::Command(Command::Start)).await;
        h.send(true, contact(SENDER)).await;

        assert!(!h.has_session());
        assert_eq!(h.bot.notices(), [BOTS_REFUSED, BOTS_REFUSED]);
        assert!(h.bot.replies().is_empty());
    }

    #[tokio::test]
    async fn unlinked_user_is_asked_for_contact() {
        let h = Harness::new();
        h.send(false, Inbound::Command(Command::Start)).await;

        assert!(!h.has_session());
        assert_eq!(h.bot.contact_requests(), [ExternalUserId::new(SENDER)]);
    }

    #[tokio::test]
    async fn stop_ends_the_session() {
        let h = Harness::linked();
        h.send(false, Inbound::Command(Command::Start)).await;
        assert!(h.has_session());

        h.send(false, Inbound::Command(Command::Stop)).await;
        assert!(!h.has_session());
        assert_eq!(h.bot.notices(), [STOPPED]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workers_are_released() {
        let h = Harness::new();
        let mut workers = HashMap::new();
        let first = ExternalUserId::new(1);
        let second = ExternalUserId::new(2);

        h.dispatcher.route(&mut workers, unknown_command(1));
        tokio::time::sleep(WORKER_IDLE * 2).await;
        assert!(workers[&first].is_closed());
        assert_eq!(h.bot.notices().len(), 1);

        h.dispatcher.route(&mut workers, unknown_command(2));
        assert_eq!(workers.len(), 1);
        assert!(workers.contains_key(&second));

        h.dispatcher.route(&mut workers, unknown_command(1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.bot.notices().len(), 3);
        assert!(!workers[&first].is_closed());
    }
}

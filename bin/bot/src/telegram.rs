//! Minimal Telegram Bot API client.
//!
//! Only the handful of methods the bot uses are covered: long-polling for
//! updates, sending and deleting messages, and acknowledging button presses.
//! Every method is a `POST {api_url}/bot{token}/{method}` with a JSON body
//! answered by `{"ok": bool, "result": ..., "description": ...}`.

use crate::error::TelegramError;
use async_trait::async_trait;
use deal_courier_conversation::{MessageRef, Reply, Transport, TransportError};
use deal_courier_core::{ExternalUserId, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

/// Response envelope of every Bot API method.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

fn parse_response<T: DeserializeOwned>(
    method: &str,
    body: &str,
) -> std::result::Result<T, TelegramError> {
    let response: ApiResponse<T> =
        serde_json::from_str(body).map_err(|e| TelegramError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
    match (response.ok, response.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(TelegramError::InvalidResponse {
            method: method.to_string(),
            reason: "missing result".to_string(),
        }),
        (false, _) => Err(TelegramError::Api {
            method: method.to_string(),
            description: response
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }),
    }
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    /// Telegram user the contact belongs to, when it is a Telegram user.
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Clone, Serialize)]
struct KeyboardButton {
    text: String,
    request_contact: bool,
}

/// Markup attached to an outgoing message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ReplyMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineButton>>,
    },
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
        one_time_keyboard: bool,
    },
    Remove {
        remove_keyboard: bool,
    },
}

impl ReplyMarkup {
    /// One button per row, in option order.
    fn inline(reply: &Reply) -> Option<Self> {
        if reply.options.is_empty() {
            return None;
        }
        let inline_keyboard = reply
            .options
            .iter()
            .map(|option| {
                vec![InlineButton {
                    text: option.label.clone(),
                    callback_data: option.callback_data(),
                }]
            })
            .collect();
        Some(Self::Inline { inline_keyboard })
    }

    fn request_contact(label: &str) -> Self {
        Self::Keyboard {
            keyboard: vec![vec![KeyboardButton {
                text: label.to_string(),
                request_contact: true,
            }]],
            resize_keyboard: true,
            one_time_keyboard: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

/// Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    #[must_use]
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            poll_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    #[instrument(skip(self, params))]
    async fn call<P, T>(
        &self,
        method: &str,
        params: &P,
        timeout: Duration,
    ) -> Result<T, TelegramError>
    where
        P: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| TelegramError::Request {
                method: method.to_string(),
                reason: e.to_string(),
            })?;
        let body = response.text().await.map_err(|e| TelegramError::Request {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        let result = parse_response(method, &body)?;
        Ok(result)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<Message, TelegramError> {
        let params = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            reply_markup,
        };
        self.call("sendMessage", &params, self.request_timeout())
            .await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        let params = json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self
            .call("deleteMessage", &params, self.request_timeout())
            .await?;
        Ok(())
    }
}

/// Bot API calls made outside of session replies: polling, notices, the
/// contact request and callback acknowledgements.
#[async_trait]
pub trait BotApi: Transport {
    /// Long-polls for updates after `offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError>;

    /// Sends plain text and removes any custom keyboard.
    async fn send_text(&self, user: ExternalUserId, text: &str) -> Result<(), TelegramError>;

    /// Asks the user to share their phone contact.
    async fn request_contact(
        &self,
        user: ExternalUserId,
        text: &str,
        button: &str,
    ) -> Result<(), TelegramError>;

    /// Stops the client's progress indicator on a pressed button.
    async fn answer_callback_query(&self, query_id: &str) -> Result<(), TelegramError>;
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &params,
                self.poll_timeout + self.request_timeout(),
            )
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "received updates");
        }
        Ok(updates)
    }

    async fn send_text(&self, user: ExternalUserId, text: &str) -> Result<(), TelegramError> {
        let markup = ReplyMarkup::Remove {
            remove_keyboard: true,
        };
        self.send_message(user.get(), text, Some(markup)).await?;
        Ok(())
    }

    async fn request_contact(
        &self,
        user: ExternalUserId,
        text: &str,
        button: &str,
    ) -> Result<(), TelegramError> {
        let markup = ReplyMarkup::request_contact(button);
        self.send_message(user.get(), text, Some(markup)).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, query_id: &str) -> Result<(), TelegramError> {
        let params = json!({ "callback_query_id": query_id });
        let _: bool = self
            .call("answerCallbackQuery", &params, self.request_timeout())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send(&self, user: ExternalUserId, reply: Reply) -> Result<MessageRef, TransportError> {
        let markup = ReplyMarkup::inline(&reply);
        let message = self
            .send_message(user.get(), &reply.text, markup)
            .await
            .map_err(|report| TransportError::SendFailed {
                reason: report.to_string(),
            })?;
        Ok(MessageRef::new(message.message_id))
    }

    async fn delete(&self, user: ExternalUserId, message: MessageRef) -> Result<(), TransportError> {
        self.delete_message(user.get(), message.message_id)
            .await
            .map_err(|report| TransportError::DeleteFailed {
                reason: report.to_string(),
            })?;
        Ok(())
    }
}

//! deal-courier Telegram bot.
//!
//! Wires the conversation core to the Telegram Bot API and to the CRM's
//! webhook API: configuration, contact-based sign-in, and per-user dispatch
//! of updates to sessions.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod telegram;

#[cfg(test)]
mod testing;

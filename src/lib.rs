//! # DolgoBot
//!
//! A Telegram bot that records who owes whom from one line of free text
//! (`300$ Антон 12.12.2025`), resolves names against per-user contact
//! aliases and reminds both parties before a debt is due.

pub mod bot;
pub mod config;
pub mod contact_resolver;
pub mod db;
pub mod debt_parser;
pub mod dialogue;
pub mod ledger;
pub mod localization;
pub mod reminders;

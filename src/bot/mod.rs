//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: commands and free-text debt entries
//! - `callback_handler`: inline keyboard callback queries
//! - `actions`: recording and closing debts, direct messages
//! - `ui_builder`: keyboards and message formatting

pub mod actions;
pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

// Re-export utility functions that might be used elsewhere
pub use callback_handler::{parse_callback_data, CallbackAction};
pub use message_handler::{parse_command, Command};
pub use ui_builder::{format_debt_list, format_summary};

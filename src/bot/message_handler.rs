//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, info};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::contact_resolver::{normalize_alias, resolve_contact, Resolution};
use crate::db::{self, PgAliasStore};
use crate::debt_parser::{parse_debt_text, ParseError};
use crate::dialogue::{DebtDialogue, DebtDialogueState};

use super::actions::{close_debt_and_notify, record_debt, register_user};
use super::callback_handler::CONTACTS_PAGE_SIZE;
use super::ui_builder::{create_candidate_keyboard, create_contacts_keyboard, format_debt_list, format_summary};

/// Rows shown by `/debtors` and `/mydebts`
pub const DEBT_LIST_LIMIT: i64 = 50;

/// A slash command with its arguments
///
/// Commands with missing or malformed arguments carry `None` so the handler
/// can answer with the usage line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add(Option<String>),
    Alias(Option<(String, String)>),
    Contacts,
    Debtors,
    MyDebts,
    Debts,
    Paid(Option<i64>),
    Unknown(String),
}

fn parse_username(token: &str) -> Option<String> {
    let username = token.trim().trim_start_matches('@');
    let valid = !username.is_empty() && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| username.to_string())
}

/// Parse a slash command; `None` when `text` is not a command at all
///
/// A `@botname` suffix on the command is ignored.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "add" => Command::Add(args.split_whitespace().next().and_then(parse_username)),
        "alias" => Command::Alias(args.split_once(char::is_whitespace).and_then(|(user, alias)| {
            let alias = alias.trim();
            let username = parse_username(user)?;
            (!alias.is_empty()).then(|| (username, alias.to_string()))
        })),
        "contacts" => Command::Contacts,
        "debtors" => Command::Debtors,
        "mydebts" => Command::MyDebts,
        "debts" => Command::Debts,
        "paid" | "close" => Command::Paid(
            args.split_whitespace()
                .next()
                .map(|id| id.trim_start_matches('#'))
                .and_then(|id| id.parse::<i64>().ok())
                .filter(|id| *id > 0),
        ),
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Localized hint for a parse failure
pub fn parse_error_message(error: &ParseError, language_code: Option<&str>) -> String {
    match error {
        ParseError::UnknownMonthName(month) => {
            t_args_lang(error.message_key(), &[("month", month.as_str())], language_code)
        }
        _ => t_lang(error.message_key(), language_code),
    }
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    pool: &PgPool,
    owner_id: i64,
    command: Command,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = owner_id, command = ?command, "Handling command");

    match command {
        Command::Start => {
            bot.send_message(msg.chat.id, t_lang("welcome", language_code)).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, t_lang("help", language_code)).await?;
        }
        Command::Add(None) => {
            bot.send_message(msg.chat.id, t_lang("add-usage", language_code)).await?;
        }
        Command::Add(Some(username)) => {
            let reply = match db::find_user_id_by_username(pool, &username).await? {
                None => t_args_lang("contact-not-registered", &[("username", username.as_str())], language_code),
                Some(contact_id) if contact_id == owner_id => t_lang("contact-self", language_code),
                Some(contact_id) => {
                    db::add_contact(pool, owner_id, contact_id).await?;
                    db::add_alias(pool, owner_id, contact_id, &username).await?;
                    info!(user_id = owner_id, contact_id, "Contact added");
                    let name = format!("@{username}");
                    t_args_lang("contact-added", &[("name", name.as_str())], language_code)
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Alias(None) => {
            bot.send_message(msg.chat.id, t_lang("alias-usage", language_code)).await?;
        }
        Command::Alias(Some((username, alias))) => {
            let normalized = normalize_alias(&alias);
            let reply = match db::find_user_id_by_username(pool, &username).await? {
                None => t_args_lang("contact-not-registered", &[("username", username.as_str())], language_code),
                Some(_) if normalized.is_empty() => t_lang("alias-invalid", language_code),
                Some(contact_id) => {
                    db::add_contact(pool, owner_id, contact_id).await?;
                    db::add_alias(pool, owner_id, contact_id, &normalized).await?;
                    info!(user_id = owner_id, contact_id, alias = %normalized, "Alias added");
                    let name = format!("@{username}");
                    t_args_lang(
                        "alias-added",
                        &[("alias", normalized.as_str()), ("name", name.as_str())],
                        language_code,
                    )
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Contacts => {
            let contacts = db::list_contacts_with_aliases(pool, owner_id, CONTACTS_PAGE_SIZE).await?;
            if contacts.is_empty() {
                bot.send_message(msg.chat.id, t_lang("contacts-empty", language_code)).await?;
            } else {
                bot.send_message(msg.chat.id, t_lang("contacts-title", language_code))
                    .reply_markup(create_contacts_keyboard(&contacts))
                    .await?;
            }
        }
        Command::Debtors => {
            let rows = db::list_debtors(pool, owner_id, DEBT_LIST_LIMIT).await?;
            let text = format_debt_list(&rows, "debtors-title", "debtors-empty", language_code);
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::MyDebts => {
            let rows = db::list_my_debts(pool, owner_id, DEBT_LIST_LIMIT).await?;
            let text = format_debt_list(&rows, "mydebts-title", "mydebts-empty", language_code);
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Debts => {
            let summary = db::summary_by_currency(pool, owner_id).await?;
            bot.send_message(msg.chat.id, format_summary(&summary, language_code)).await?;
        }
        Command::Paid(None) => {
            bot.send_message(msg.chat.id, t_lang("paid-usage", language_code)).await?;
        }
        Command::Paid(Some(debt_id)) => {
            let id = debt_id.to_string();
            let reply = if close_debt_and_notify(bot, pool, owner_id, debt_id).await? {
                t_args_lang("paid-success", &[("id", id.as_str())], language_code)
            } else {
                t_args_lang("paid-not-found", &[("id", id.as_str())], language_code)
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Unknown(name) => {
            debug!(user_id = owner_id, command = %name, "Unknown command");
            bot.send_message(msg.chat.id, t_lang("unknown-command", language_code)).await?;
        }
    }
    Ok(())
}

async fn handle_debt_text(
    bot: &Bot,
    msg: &Message,
    dialogue: DebtDialogue,
    pool: Arc<PgPool>,
    owner_id: i64,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let parsed = match parse_debt_text(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(user_id = owner_id, error = %e, "Debt text not understood");
            bot.send_message(msg.chat.id, parse_error_message(&e, language_code)).await?;
            return Ok(());
        }
    };

    let store = PgAliasStore::new(Arc::clone(&pool));
    let resolution = resolve_contact(&store, owner_id, &parsed.raw_counterparty_name).await?;

    match resolution {
        Resolution::Single(debtor_id) => {
            let confirmation = record_debt(bot, &pool, owner_id, debtor_id, &parsed, language_code).await?;
            dialogue.exit().await?;
            bot.send_message(msg.chat.id, confirmation).await?;
        }
        Resolution::Ambiguous(candidates) => {
            info!(user_id = owner_id, candidates = candidates.len(), "Counterparty is ambiguous");
            let prompt = t_args_lang(
                "resolve-ambiguous",
                &[("name", parsed.raw_counterparty_name.as_str())],
                language_code,
            );
            bot.send_message(msg.chat.id, prompt)
                .reply_markup(create_candidate_keyboard(&candidates, language_code))
                .await?;
            dialogue
                .update(DebtDialogueState::AwaitingCounterparty {
                    parsed,
                    candidates,
                    language_code: language_code.map(str::to_string),
                })
                .await?;
        }
        Resolution::NoMatch => {
            dialogue.exit().await?;
            let hint = t_args_lang(
                "resolve-no-match",
                &[("name", parsed.raw_counterparty_name.as_str())],
                language_code,
            );
            bot.send_message(msg.chat.id, hint).await?;
        }
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    dialogue: DebtDialogue,
    pool: Arc<PgPool>,
    owner_id: i64,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = owner_id, "Received text message from user");

    match parse_command(text) {
        Some(command) => handle_command(bot, msg, &pool, owner_id, command, language_code).await,
        None => handle_debt_text(bot, msg, dialogue, pool, owner_id, text, language_code).await,
    }
}

/// How an inbound message is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Group chats and messages without a sender
    Ignored,
    /// Stickers, photos and the like: the sender is registered and gets help
    NonText,
    Text(&'a str),
}

pub fn classify_message(msg: &Message) -> Inbound<'_> {
    if !msg.chat.is_private() || msg.from.is_none() {
        return Inbound::Ignored;
    }
    match msg.text() {
        Some(text) => Inbound::Text(text),
        None => Inbound::NonText,
    }
}

/// Main message handler for the bot
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    pool: Arc<PgPool>,
    dialogue: DebtDialogue,
) -> Result<()> {
    let inbound = classify_message(&msg);
    let Some(user) = msg.from.as_ref().filter(|_| inbound != Inbound::Ignored) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message outside a private chat");
        return Ok(());
    };
    let language_code = user.language_code.as_deref();

    // Every inbound message refreshes the sender's profile, text or not
    let owner_id = match register_user(&pool, user).await {
        Ok(owner_id) => owner_id,
        Err(e) => {
            error!(user_id = %user.id, error = %e, "Failed to register user");
            bot.send_message(msg.chat.id, t_lang("error-generic", language_code)).await?;
            return Ok(());
        }
    };

    let Inbound::Text(text) = inbound else {
        bot.send_message(msg.chat.id, t_lang("help", language_code)).await?;
        return Ok(());
    };

    if let Err(e) =
        handle_text_message(&bot, &msg, dialogue, Arc::clone(&pool), owner_id, text, language_code).await
    {
        error!(user_id = owner_id, error = %e, "Failed to handle message");
        bot.send_message(msg.chat.id, t_lang("error-generic", language_code)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(chat: serde_json::Value, content: serde_json::Value) -> Message {
        let mut value = serde_json::json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": chat,
            "from": {
                "id": 42,
                "is_bot": false,
                "first_name": "Anton",
                "language_code": "ru"
            }
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), content.as_object()) {
            target.extend(extra.clone());
        }
        serde_json::from_value(value).unwrap()
    }

    fn private_chat() -> serde_json::Value {
        serde_json::json!({ "id": 42, "type": "private", "first_name": "Anton" })
    }

    #[test]
    fn test_non_text_messages_still_reach_registration() {
        let location = message(
            private_chat(),
            serde_json::json!({ "location": { "latitude": 55.75, "longitude": 37.61 } }),
        );
        assert_eq!(classify_message(&location), Inbound::NonText);

        let text = message(private_chat(), serde_json::json!({ "text": "/help" }));
        assert_eq!(classify_message(&text), Inbound::Text("/help"));
    }

    #[test]
    fn test_group_messages_are_ignored() {
        let group = message(
            serde_json::json!({ "id": -100, "type": "group", "title": "Friends" }),
            serde_json::json!({ "text": "300$ Антон 12.12.2025" }),
        );
        assert_eq!(classify_message(&group), Inbound::Ignored);
    }

    #[test]
    fn test_parse_command_basics() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/help@dolgo_bot"), Some(Command::Help));
        assert_eq!(parse_command("/DEBTS"), Some(Command::Debts));
        assert_eq!(parse_command("300$ Антон 12.12.2025"), None);
        assert_eq!(parse_command("/frobnicate"), Some(Command::Unknown("frobnicate".into())));
    }

    #[test]
    fn test_parse_command_arguments() {
        assert_eq!(parse_command("/add @anton"), Some(Command::Add(Some("anton".into()))));
        assert_eq!(parse_command("/add"), Some(Command::Add(None)));
        assert_eq!(parse_command("/add @"), Some(Command::Add(None)));
        assert_eq!(
            parse_command("/alias @anna_k Anna  Karenina"),
            Some(Command::Alias(Some(("anna_k".into(), "Anna  Karenina".into()))))
        );
        assert_eq!(parse_command("/alias @anna_k"), Some(Command::Alias(None)));
        assert_eq!(parse_command("/paid 12"), Some(Command::Paid(Some(12))));
        assert_eq!(parse_command("/close #12"), Some(Command::Paid(Some(12))));
        assert_eq!(parse_command("/paid twelve"), Some(Command::Paid(None)));
        assert_eq!(parse_command("/paid -3"), Some(Command::Paid(None)));
    }
}

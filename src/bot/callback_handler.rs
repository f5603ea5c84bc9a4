//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId};
use tracing::{debug, error, info};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::db;
use crate::dialogue::{DebtDialogue, DebtDialogueState};

use super::actions::{record_debt, register_user};
use super::ui_builder::{create_alias_keyboard, create_contact_menu_keyboard, create_contacts_keyboard};

/// Contacts listed in the `/contacts` keyboard
pub const CONTACTS_PAGE_SIZE: i64 = 50;

/// Decoded `callback_data` of an inline button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    OpenContact(i64),
    ShowAliases(i64),
    DeleteContact(i64),
    DeleteAlias(i64),
    BackToContacts,
    PickCandidate(i64),
    CancelPick,
}

impl CallbackAction {
    /// Encode for `InlineKeyboardButton::callback`
    pub fn to_data(self) -> String {
        match self {
            CallbackAction::OpenContact(id) => format!("contact:{id}"),
            CallbackAction::ShowAliases(id) => format!("contact_aliases:{id}"),
            CallbackAction::DeleteContact(id) => format!("contact_delete:{id}"),
            CallbackAction::DeleteAlias(id) => format!("alias_delete:{id}"),
            CallbackAction::BackToContacts => "back_contacts".to_string(),
            CallbackAction::PickCandidate(id) => format!("pick:{id}"),
            CallbackAction::CancelPick => "cancel_pick".to_string(),
        }
    }
}

/// Decode `callback_data`; `None` for anything this bot did not produce
pub fn parse_callback_data(data: &str) -> Option<CallbackAction> {
    match data {
        "back_contacts" => return Some(CallbackAction::BackToContacts),
        "cancel_pick" => return Some(CallbackAction::CancelPick),
        _ => {}
    }

    let (prefix, id) = data.split_once(':')?;
    let id: i64 = id.parse().ok()?;
    match prefix {
        "contact" => Some(CallbackAction::OpenContact(id)),
        "contact_aliases" => Some(CallbackAction::ShowAliases(id)),
        "contact_delete" => Some(CallbackAction::DeleteContact(id)),
        "alias_delete" => Some(CallbackAction::DeleteAlias(id)),
        "pick" => Some(CallbackAction::PickCandidate(id)),
        _ => None,
    }
}

async fn edit_text(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let request = bot.edit_message_text(chat_id, message_id, text);
    let result = match keyboard {
        Some(keyboard) => request.reply_markup(keyboard).await,
        None => request.await,
    };
    if let Err(e) = result {
        error!(chat_id = %chat_id, error = %e, "Failed to edit message");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn show_aliases(
    bot: &Bot,
    pool: &PgPool,
    chat_id: ChatId,
    message_id: MessageId,
    owner_id: i64,
    contact_id: i64,
    header: Option<String>,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(contact) = db::get_contact(pool, owner_id, contact_id).await? else {
        return edit_text(bot, chat_id, message_id, t_lang("contact-not-found", language_code), None).await;
    };
    let aliases = db::list_contact_aliases(pool, owner_id, contact_id).await?;
    let name = contact.display_name();

    let mut text = String::new();
    if let Some(header) = header {
        text.push_str(&header);
        text.push_str("\n\n");
    }
    if aliases.is_empty() {
        text.push_str(&t_lang("contact-aliases-empty", language_code));
    } else {
        text.push_str(&t_args_lang("contact-aliases-title", &[("name", name.as_str())], language_code));
    }

    let keyboard = create_alias_keyboard(contact_id, &aliases, language_code);
    edit_text(bot, chat_id, message_id, text, Some(keyboard)).await
}

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    pool: Arc<PgPool>,
    dialogue: DebtDialogue,
) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(msg) = &q.message else {
        return Ok(());
    };
    let chat_id = msg.chat().id;
    let message_id = msg.id();
    let language_code = q.from.language_code.as_deref();

    let data = q.data.as_deref().unwrap_or("");
    let Some(action) = parse_callback_data(data) else {
        debug!(user_id = %q.from.id, data, "Ignoring unknown callback data");
        return Ok(());
    };

    let owner_id = register_user(&pool, &q.from).await?;
    debug!(user_id = owner_id, action = ?action, "Handling callback action");

    match action {
        CallbackAction::OpenContact(contact_id) => {
            match db::get_contact(&pool, owner_id, contact_id).await? {
                Some(contact) => {
                    let text = t_args_lang(
                        "contact-menu-title",
                        &[("name", contact.display_name().as_str())],
                        language_code,
                    );
                    let keyboard = create_contact_menu_keyboard(contact_id, language_code);
                    edit_text(&bot, chat_id, message_id, text, Some(keyboard)).await?;
                }
                None => {
                    edit_text(&bot, chat_id, message_id, t_lang("contact-not-found", language_code), None)
                        .await?;
                }
            }
        }
        CallbackAction::ShowAliases(contact_id) => {
            show_aliases(&bot, &pool, chat_id, message_id, owner_id, contact_id, None, language_code).await?;
        }
        CallbackAction::DeleteContact(contact_id) => {
            let text = if db::delete_contact(&pool, owner_id, contact_id).await? {
                info!(user_id = owner_id, contact_id, "Contact deleted");
                t_lang("contact-deleted", language_code)
            } else {
                t_lang("contact-not-found", language_code)
            };
            edit_text(&bot, chat_id, message_id, text, None).await?;
        }
        CallbackAction::DeleteAlias(alias_id) => match db::delete_alias(&pool, owner_id, alias_id).await? {
            Some(contact_id) => {
                info!(user_id = owner_id, alias_id, contact_id, "Alias deleted");
                let header = t_lang("alias-deleted", language_code);
                show_aliases(
                    &bot,
                    &pool,
                    chat_id,
                    message_id,
                    owner_id,
                    contact_id,
                    Some(header),
                    language_code,
                )
                .await?;
            }
            None => {
                edit_text(&bot, chat_id, message_id, t_lang("alias-not-found", language_code), None).await?;
            }
        },
        CallbackAction::BackToContacts => {
            let contacts = db::list_contacts_with_aliases(&pool, owner_id, CONTACTS_PAGE_SIZE).await?;
            if contacts.is_empty() {
                edit_text(&bot, chat_id, message_id, t_lang("contacts-empty", language_code), None).await?;
            } else {
                let keyboard = create_contacts_keyboard(&contacts);
                edit_text(&bot, chat_id, message_id, t_lang("contacts-title", language_code), Some(keyboard))
                    .await?;
            }
        }
        CallbackAction::PickCandidate(contact_id) => {
            let state = dialogue.get().await?.unwrap_or_default();
            // Prefer the language captured when the pick was offered
            let dialogue_lang_code = match &state {
                DebtDialogueState::AwaitingCounterparty { language_code, .. } => language_code.clone(),
                DebtDialogueState::Start => None,
            };
            let effective_language_code = dialogue_lang_code.as_deref().or(language_code);

            match state.picked(contact_id) {
                Some((parsed, candidate)) => {
                    db::add_contact(&pool, owner_id, candidate.contact_id).await?;
                    let confirmation = record_debt(
                        &bot,
                        &pool,
                        owner_id,
                        candidate.contact_id,
                        parsed,
                        effective_language_code,
                    )
                    .await?;
                    dialogue.exit().await?;
                    edit_text(&bot, chat_id, message_id, confirmation, None).await?;
                }
                None => {
                    edit_text(&bot, chat_id, message_id, t_lang("pick-expired", effective_language_code), None)
                        .await?;
                }
            }
        }
        CallbackAction::CancelPick => {
            dialogue.exit().await?;
            edit_text(&bot, chat_id, message_id, t_lang("pick-cancelled", language_code), None).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_data_round_trip() {
        let actions = [
            CallbackAction::OpenContact(42),
            CallbackAction::ShowAliases(42),
            CallbackAction::DeleteContact(7),
            CallbackAction::DeleteAlias(9001),
            CallbackAction::BackToContacts,
            CallbackAction::PickCandidate(3),
            CallbackAction::CancelPick,
        ];
        for action in actions {
            assert_eq!(parse_callback_data(&action.to_data()), Some(action));
        }
    }

    #[test]
    fn test_unknown_callback_data() {
        assert_eq!(parse_callback_data(""), None);
        assert_eq!(parse_callback_data("contact:abc"), None);
        assert_eq!(parse_callback_data("edit_1"), None);
        assert_eq!(parse_callback_data("unknown:5"), None);
    }
}

//! Actions shared by the message and callback handlers

use anyhow::{Context, Result};
use sqlx::postgres::PgPool;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::db::{self, TelegramProfile, User};
use crate::debt_parser::ParsedDebt;
use crate::ledger::{format_money, Debt, NewDebt};
use crate::localization::t_args_lang;

use super::ui_builder::format_date;

/// Upsert the sender of an update, returning their internal id
pub async fn register_user(pool: &PgPool, user: &teloxide::types::User) -> Result<i64> {
    let profile = TelegramProfile {
        username: user.username.as_deref(),
        first_name: Some(user.first_name.as_str()),
        last_name: user.last_name.as_deref(),
        language_code: user.language_code.as_deref(),
    };
    db::upsert_telegram_user(pool, user.id.0 as i64, &profile).await
}

/// Send a private message to a registered user
///
/// Failures are logged and swallowed: the counterparty may have blocked the bot.
pub async fn send_dm(bot: &Bot, user: &User, text: String) {
    match bot.send_message(ChatId(user.telegram_id), text).await {
        Ok(_) => debug!(user_id = user.id, "Direct message delivered"),
        Err(e) => warn!(user_id = user.id, error = %e, "Failed to deliver direct message"),
    }
}

async fn load_user(pool: &PgPool, user_id: i64) -> Result<User> {
    db::get_user_by_id(pool, user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))
}

/// Store a debt for a resolved counterparty and notify the debtor
///
/// Returns the confirmation for the creditor in their language.
pub async fn record_debt(
    bot: &Bot,
    pool: &PgPool,
    creditor_id: i64,
    debtor_id: i64,
    parsed: &ParsedDebt,
    language_code: Option<&str>,
) -> Result<String> {
    // Both parties are loaded first so a failed lookup never leaves a stored debt behind
    let creditor = load_user(pool, creditor_id).await?;
    let debtor = load_user(pool, debtor_id).await?;

    let debt_id = db::create_debt(pool, &NewDebt::from_parsed(creditor_id, debtor_id, parsed)).await?;
    debug!(
        debt_id,
        amount = parsed.amount_minor_units,
        currency = %parsed.currency_code,
        "Debt recorded from text"
    );

    let id = debt_id.to_string();
    let amount = format_money(parsed.amount_minor_units, &parsed.currency_code);
    let date = format_date(parsed.due_date);

    if debtor.id != creditor.id {
        let creditor_name = creditor.display_name();
        let notice = t_args_lang(
            "debt-notify-debtor",
            &[
                ("creditor", creditor_name.as_str()),
                ("amount", amount.as_str()),
                ("date", date.as_str()),
                ("id", id.as_str()),
            ],
            debtor.language_code.as_deref(),
        );
        send_dm(bot, &debtor, notice).await;
    }

    let debtor_name = debtor.display_name();
    Ok(t_args_lang(
        "debt-recorded",
        &[
            ("id", id.as_str()),
            ("name", debtor_name.as_str()),
            ("amount", amount.as_str()),
            ("date", date.as_str()),
        ],
        language_code,
    ))
}

/// Tell the other party that `closer_id` closed `debt`
pub async fn notify_debt_closed(bot: &Bot, pool: &PgPool, closer_id: i64, debt: &Debt) -> Result<()> {
    let other_id = if debt.creditor_id == closer_id {
        debt.debtor_id
    } else {
        debt.creditor_id
    };
    if other_id == closer_id {
        return Ok(());
    }

    let closer = load_user(pool, closer_id).await?;
    let other = load_user(pool, other_id).await?;

    let closer_name = closer.display_name();
    let id = debt.id.to_string();
    let amount = format_money(debt.amount_minor_units, &debt.currency_code);
    let notice = t_args_lang(
        "debt-closed-notify",
        &[
            ("name", closer_name.as_str()),
            ("id", id.as_str()),
            ("amount", amount.as_str()),
        ],
        other.language_code.as_deref(),
    );
    send_dm(bot, &other, notice).await;
    Ok(())
}

/// Close a debt from `/paid` and tell the other party
pub async fn close_debt_and_notify(bot: &Bot, pool: &PgPool, owner_id: i64, debt_id: i64) -> Result<bool> {
    if !db::close_debt(pool, owner_id, debt_id).await? {
        return Ok(false);
    }
    info!(user_id = owner_id, debt_id, "Debt closed");

    if let Some(debt) = db::get_debt(pool, debt_id).await? {
        if let Err(e) = notify_debt_closed(bot, pool, owner_id, &debt).await {
            warn!(user_id = owner_id, debt_id, error = %e, "Failed to notify about closed debt");
        }
    }
    Ok(true)
}

//! # Reminders Module
//!
//! Background sweep that flags overdue debts and reminds both parties a
//! configured number of days before a debt is due.
//!
//! Each `(debt, offset)` pair is claimed in the database before anything is
//! sent, so a reminder goes out at most once even with several bot instances.

use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, info};

use crate::bot::actions::send_dm;
use crate::bot::ui_builder::format_date;
use crate::config::BotConfig;
use crate::db::{self, User};
use crate::ledger::{format_money, Debt};
use crate::localization::{t_args_lang, t_lang};

/// Which side of the debt a reminder is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderRecipient {
    Creditor,
    Debtor,
}

/// "today", "tomorrow" or "in N days"
pub fn reminder_when(offset_days: u32, language_code: Option<&str>) -> String {
    match offset_days {
        0 => t_lang("reminder-when-today", language_code),
        1 => t_lang("reminder-when-tomorrow", language_code),
        days => {
            let days = days.to_string();
            t_args_lang("reminder-when-days", &[("days", days.as_str())], language_code)
        }
    }
}

/// Reminder text for one party; `counterparty_name` names the other party
pub fn reminder_message(
    recipient: ReminderRecipient,
    offset_days: u32,
    debt: &Debt,
    counterparty_name: &str,
    language_code: Option<&str>,
) -> String {
    let key = match recipient {
        ReminderRecipient::Creditor => "reminder-creditor",
        ReminderRecipient::Debtor => "reminder-debtor",
    };
    let when = reminder_when(offset_days, language_code);
    let amount = format_money(debt.amount_minor_units, &debt.currency_code);
    let date = format_date(debt.due_date);
    let id = debt.id.to_string();

    t_args_lang(
        key,
        &[
            ("name", counterparty_name),
            ("amount", amount.as_str()),
            ("when", when.as_str()),
            ("date", date.as_str()),
            ("id", id.as_str()),
        ],
        language_code,
    )
}

/// Date on which debts get the reminder for `offset_days`
pub fn reminder_due_date(today: NaiveDate, offset_days: u32) -> Option<NaiveDate> {
    today.checked_add_days(Days::new(u64::from(offset_days)))
}

async fn remind_parties(bot: &Bot, pool: &PgPool, debt: &Debt, offset_days: u32) -> Result<()> {
    let creditor = db::get_user_by_id(pool, debt.creditor_id).await?;
    let debtor = db::get_user_by_id(pool, debt.debtor_id).await?;
    let (Some(creditor), Some(debtor)) = (creditor, debtor) else {
        debug!(debt_id = debt.id, "Skipping reminder for debt with a missing party");
        return Ok(());
    };

    send_reminder(bot, &creditor, &debtor, ReminderRecipient::Creditor, debt, offset_days).await;
    if debtor.id != creditor.id {
        send_reminder(bot, &debtor, &creditor, ReminderRecipient::Debtor, debt, offset_days).await;
    }
    Ok(())
}

async fn send_reminder(
    bot: &Bot,
    to: &User,
    other: &User,
    recipient: ReminderRecipient,
    debt: &Debt,
    offset_days: u32,
) {
    let text = reminder_message(
        recipient,
        offset_days,
        debt,
        &other.display_name(),
        to.language_code.as_deref(),
    );
    send_dm(bot, to, text).await;
}

/// Run one sweep for `today`, returning how many debts were reminded about
///
/// Storage failures are logged per step and the sweep moves on to the next offset.
pub async fn run_reminder_sweep(
    bot: &Bot,
    pool: &PgPool,
    offsets: &[u32],
    today: NaiveDate,
) -> Result<usize> {
    match db::mark_overdue(pool, today).await {
        Ok(0) => {}
        Ok(count) => info!(count, "Debts marked overdue"),
        Err(e) => error!(error = %e, "Failed to mark overdue debts"),
    }

    let mut reminded = 0;
    for &offset_days in offsets {
        let Some(due_date) = reminder_due_date(today, offset_days) else {
            continue;
        };

        let debts = match db::active_debts_due_on(pool, due_date).await {
            Ok(debts) => debts,
            Err(e) => {
                error!(offset_days, %due_date, error = %e, "Failed to load debts due for reminder");
                continue;
            }
        };

        for debt in debts {
            match db::claim_reminder(pool, debt.id, offset_days).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!(debt_id = debt.id, offset_days, error = %e, "Failed to claim reminder");
                    continue;
                }
            }

            match remind_parties(bot, pool, &debt, offset_days).await {
                Ok(()) => {
                    reminded += 1;
                    debug!(debt_id = debt.id, offset_days, "Reminder sent");
                }
                Err(e) => error!(debt_id = debt.id, offset_days, error = %e, "Failed to send reminder"),
            }
        }
    }

    Ok(reminded)
}

/// Sweep forever on the configured interval
pub async fn run_reminder_worker(bot: Bot, pool: Arc<PgPool>, config: Arc<BotConfig>) {
    info!(
        interval_secs = config.reminder_interval.as_secs(),
        offsets = ?config.remind_days_before,
        "Reminder worker started"
    );

    let mut interval = tokio::time::interval(config.reminder_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let today = Local::now().date_naive();
        match run_reminder_sweep(&bot, &pool, &config.remind_days_before, today).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Reminders sent"),
            Err(e) => error!(error = %e, "Reminder sweep failed"),
        }
    }
}

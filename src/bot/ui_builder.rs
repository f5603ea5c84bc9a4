//! UI Builder module for creating keyboards and formatting messages

use chrono::NaiveDate;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::contact_resolver::ContactCandidate;
use crate::db::{AliasRow, ContactWithAliases, DebtListRow};
use crate::ledger::{format_money, format_signed_money, CurrencySummary, DebtStatus};

use super::callback_handler::CallbackAction;

/// Longest button label before it gets shortened
const MAX_BUTTON_CHARS: usize = 32;

/// Dates are shown the way users type them
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Shorten a label to [`MAX_BUTTON_CHARS`] characters
pub fn truncate_label(label: &str) -> String {
    if label.chars().count() > MAX_BUTTON_CHARS {
        let head: String = label.chars().take(MAX_BUTTON_CHARS - 3).collect();
        format!("{head}...")
    } else {
        label.to_string()
    }
}

fn button(label: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(truncate_label(label), action.to_data())
}

/// One row per contact; tapping opens the contact menu
pub fn create_contacts_keyboard(contacts: &[ContactWithAliases]) -> InlineKeyboardMarkup {
    let rows = contacts
        .iter()
        .map(|contact| {
            let label = match contact.aliases.first() {
                Some(alias) => format!("{} ({alias})", contact.title()),
                None => contact.title(),
            };
            vec![button(&label, CallbackAction::OpenContact(contact.contact_id))]
        })
        .collect::<Vec<_>>();

    InlineKeyboardMarkup::new(rows)
}

/// Aliases, delete and back buttons for a single contact
pub fn create_contact_menu_keyboard(contact_id: i64, language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(
            &t_lang("button-aliases", language_code),
            CallbackAction::ShowAliases(contact_id),
        )],
        vec![button(
            &t_lang("button-delete-contact", language_code),
            CallbackAction::DeleteContact(contact_id),
        )],
        vec![button(&t_lang("button-back", language_code), CallbackAction::BackToContacts)],
    ])
}

/// One delete button per alias plus a way back to the contact menu
pub fn create_alias_keyboard(
    contact_id: i64,
    aliases: &[AliasRow],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = aliases
        .iter()
        .map(|alias| vec![button(&format!("🗑 {}", alias.alias), CallbackAction::DeleteAlias(alias.id))])
        .collect();

    rows.push(vec![button(
        &t_lang("button-back", language_code),
        CallbackAction::OpenContact(contact_id),
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// One button per candidate offered for an ambiguous name, then cancel
pub fn create_candidate_keyboard(
    candidates: &[ContactCandidate],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = candidates
        .iter()
        .map(|candidate| {
            let label = match candidate.username.as_deref() {
                Some(username) if !username.is_empty() && candidate.first_name.is_some() => {
                    format!("{} (@{username})", candidate.display_name())
                }
                _ => candidate.display_name(),
            };
            vec![button(&label, CallbackAction::PickCandidate(candidate.contact_id))]
        })
        .collect();

    rows.push(vec![button(&t_lang("button-cancel", language_code), CallbackAction::CancelPick)]);

    InlineKeyboardMarkup::new(rows)
}

/// Render one open debt: `#12 Anton: 300.00 USD, due 12.12.2025 (overdue)`
pub fn format_debt_line(row: &DebtListRow, language_code: Option<&str>) -> String {
    let debt = &row.debt;
    let date = format_date(debt.due_date);
    let due = t_args_lang("debt-due", &[("date", date.as_str())], language_code);
    let mut line = format!(
        "#{} {}: {}, {}",
        debt.id,
        row.counterparty_name,
        format_money(debt.amount_minor_units, &debt.currency_code),
        due
    );
    if debt.status == DebtStatus::Overdue {
        line.push_str(&format!(" ({})", t_lang("debt-overdue-mark", language_code)));
    }
    line
}

/// A titled list of open debts, or the empty message
pub fn format_debt_list(
    rows: &[DebtListRow],
    title_key: &str,
    empty_key: &str,
    language_code: Option<&str>,
) -> String {
    if rows.is_empty() {
        return t_lang(empty_key, language_code);
    }

    let mut result = t_lang(title_key, language_code);
    for row in rows {
        result.push('\n');
        result.push_str(&format_debt_line(row, language_code));
    }
    result
}

/// Per-currency balance for `/debts`
pub fn format_summary(summary: &[CurrencySummary], language_code: Option<&str>) -> String {
    if summary.is_empty() {
        return t_lang("summary-empty", language_code);
    }

    let mut result = t_lang("summary-title", language_code);
    for line in summary {
        let lent = format_money(line.lent_minor_units, &line.currency_code);
        let owed = format_money(line.owed_minor_units, &line.currency_code);
        let net = format_signed_money(line.net_minor_units, &line.currency_code);
        result.push('\n');
        result.push_str(&t_args_lang(
            "summary-line",
            &[
                ("currency", line.currency_code.as_str()),
                ("lent", lent.as_str()),
                ("owed", owed.as_str()),
                ("net", net.as_str()),
            ],
            language_code,
        ));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_label_counts_characters() {
        let short = "Антон";
        assert_eq!(truncate_label(short), short);

        let long = "Ж".repeat(40);
        let truncated = truncate_label(&long);
        assert_eq!(truncated.chars().count(), MAX_BUTTON_CHARS);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(format_date(date), "04.03.2025");
    }
}

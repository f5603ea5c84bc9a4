use chrono::NaiveDate;
use dolgobot::bot::callback_handler::{parse_callback_data, CallbackAction};
use dolgobot::bot::message_handler::{parse_command, parse_error_message, Command};
use dolgobot::bot::ui_builder::{
    create_alias_keyboard, create_candidate_keyboard, create_contacts_keyboard, format_debt_list,
    format_summary,
};
use dolgobot::contact_resolver::ContactCandidate;
use dolgobot::db::{AliasRow, ContactWithAliases, DebtListRow};
use dolgobot::debt_parser::{parse_debt_text, ParseError};
use dolgobot::ledger::{CurrencySummary, Debt, DebtStatus};
use dolgobot::localization::init_localization;
use teloxide::types::{InlineKeyboardButtonKind, InlineKeyboardMarkup};

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() {
        // Initialize localization if not already done
        let _ = init_localization();
    }

    fn callback_actions(markup: &InlineKeyboardMarkup) -> Vec<Option<CallbackAction>> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => parse_callback_data(data),
                _ => None,
            })
            .collect()
    }

    fn list_row(id: i64, name: &str, status: DebtStatus) -> DebtListRow {
        DebtListRow {
            debt: Debt {
                id,
                creditor_id: 1,
                debtor_id: 2,
                amount_minor_units: 30000,
                currency_code: "USD".to_string(),
                due_date: NaiveDate::from_ymd_opt(2025, 12, 12).unwrap(),
                status,
            },
            counterparty_name: name.to_string(),
        }
    }

    #[test]
    fn test_candidate_keyboard_offers_each_contact_and_cancel() {
        setup_localization();
        let candidates = vec![
            ContactCandidate {
                contact_id: 5,
                username: Some("anna_k".into()),
                first_name: Some("Anna".into()),
                last_name: Some("Karenina".into()),
            },
            ContactCandidate {
                contact_id: 6,
                username: None,
                first_name: Some("Anna".into()),
                last_name: None,
            },
        ];

        let markup = create_candidate_keyboard(&candidates, Some("en"));
        assert_eq!(
            callback_actions(&markup),
            vec![
                Some(CallbackAction::PickCandidate(5)),
                Some(CallbackAction::PickCandidate(6)),
                Some(CallbackAction::CancelPick),
            ]
        );
        assert_eq!(markup.inline_keyboard[0][0].text, "Anna Karenina (@anna_k)");
        assert_eq!(markup.inline_keyboard[1][0].text, "Anna");
    }

    #[test]
    fn test_contacts_and_alias_keyboards() {
        setup_localization();
        let contacts = vec![ContactWithAliases {
            contact_id: 9,
            username: Some("petya".into()),
            first_name: Some("Пётр".into()),
            last_name: None,
            aliases: vec!["петя".into()],
        }];
        let markup = create_contacts_keyboard(&contacts);
        assert_eq!(callback_actions(&markup), vec![Some(CallbackAction::OpenContact(9))]);
        assert_eq!(markup.inline_keyboard[0][0].text, "@petya (петя)");

        let aliases = vec![
            AliasRow { id: 70, alias: "петя".into() },
            AliasRow { id: 71, alias: "пётр".into() },
        ];
        let markup = create_alias_keyboard(9, &aliases, Some("ru"));
        assert_eq!(
            callback_actions(&markup),
            vec![
                Some(CallbackAction::DeleteAlias(70)),
                Some(CallbackAction::DeleteAlias(71)),
                Some(CallbackAction::OpenContact(9)),
            ]
        );
    }

    #[test]
    fn test_debt_list_formatting() {
        setup_localization();
        let rows = vec![
            list_row(3, "антон", DebtStatus::Active),
            list_row(4, "anna", DebtStatus::Overdue),
        ];

        let text = format_debt_list(&rows, "debtors-title", "debtors-empty", Some("en"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "#3 антон: 300.00 USD, due 12.12.2025");
        assert_eq!(lines[2], "#4 anna: 300.00 USD, due 12.12.2025 (overdue)");

        let empty = format_debt_list(&[], "mydebts-title", "mydebts-empty", Some("en"));
        assert_eq!(empty, "You don't owe anyone.");
    }

    #[test]
    fn test_summary_formatting() {
        setup_localization();
        let summary = vec![CurrencySummary {
            currency_code: "EUR".into(),
            lent_minor_units: 500,
            owed_minor_units: 1250,
            net_minor_units: -750,
        }];

        let text = format_summary(&summary, Some("en"));
        assert!(text.contains("EUR: lent 5.00 EUR, owed 12.50 EUR, net -7.50 EUR"));
        assert_eq!(format_summary(&[], Some("ru")), "Открытых долгов нет.");
    }

    #[test]
    fn test_parse_errors_become_hints() {
        setup_localization();
        let error = parse_debt_text("300$ Антон 5 брюмера 2025").unwrap_err();
        assert_eq!(error, ParseError::UnknownMonthName("брюмера".into()));
        assert!(parse_error_message(&error, Some("en")).contains("брюмера"));

        let hint = parse_error_message(&ParseError::DateNotUnderstood, Some("ru"));
        assert!(hint.contains("12.12.2025"));
    }

    #[test]
    fn test_free_text_is_not_a_command() {
        assert_eq!(parse_command("300$ Антон 12.12.2025"), None);
        assert_eq!(parse_command("/mydebts"), Some(Command::MyDebts));
        assert_eq!(parse_command("/debtors@dolgo_bot"), Some(Command::Debtors));
    }
}

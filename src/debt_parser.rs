//! # Debt Parser Module
//!
//! Turns one line of free text such as `300$ Антон 12.12.2025` into a
//! structured [`ParsedDebt`].
//!
//! ## Grammar
//!
//! ```text
//! <amount> <currency?> <name...> <date>
//! ```
//!
//! - Amount: digits with an optional `.` or `,` and one or two fractional digits
//! - Currency: `$ € £ ₽`, `usd eur gbp`, `руб руб. р`, or a three-letter code
//!   glued to the amount (`300chf`)
//! - Date: `12.12.2025` (also `-` or `/`) or `12 декабря 2025`, anywhere after
//!   the amount
//!
//! Each piece is matched by its own small function so it can be tested alone.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::{Captures, Regex};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Currency used when the message carries no currency token
pub const DEFAULT_CURRENCY: &str = "USD";

/// Largest accepted amount in minor units (10 trillion major units)
///
/// Keeps per-currency totals of many debts well inside `i64`.
pub const MAX_AMOUNT_MINOR_UNITS: i64 = 1_000_000_000_000_000;

const AMOUNT_PATTERN: &str = r"(?i)^\s*(?P<amount>[0-9]+(?:[.,][0-9]{1,2})?)(?:\s*(?P<currency>[$€£₽]|usd|eur|gbp|руб\.|руб|р)|(?P<code>[a-z]{3}))?\s+(?P<rest>.+?)\s*$";
// Dates may touch Cyrillic text (`до12.12.2025`, `12.12.2025г`), so the edges
// only exclude ASCII word characters. The span is taken from `day` to `year`.
const NUMERIC_DATE_PATTERN: &str = r"(?:^|[^0-9A-Za-z_])(?P<day>\d{1,2})(?:\.(?P<m_dot>\d{1,2})\.|-(?P<m_dash>\d{1,2})-|/(?P<m_slash>\d{1,2})/)(?P<year>\d{4})(?:$|[^0-9A-Za-z_])";
const WORDED_DATE_PATTERN: &str =
    r"(?i)(?:^|[^0-9A-Za-z_])(?P<day>\d{1,2})\s+(?P<month>[а-яё]+)\s+(?P<year>\d{4})(?:$|[^0-9A-Za-z_])";

lazy_static! {
    static ref AMOUNT_REGEX: Regex = Regex::new(AMOUNT_PATTERN).expect("Amount pattern should be valid");
    static ref NUMERIC_DATE_REGEX: Regex =
        Regex::new(NUMERIC_DATE_PATTERN).expect("Numeric date pattern should be valid");
    static ref WORDED_DATE_REGEX: Regex =
        Regex::new(WORDED_DATE_PATTERN).expect("Worded date pattern should be valid");
}

/// A debt extracted from free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDebt {
    /// Amount in minor currency units (cents, kopecks)
    pub amount_minor_units: i64,
    /// Normalized currency code, e.g. "USD"
    pub currency_code: String,
    /// Counterparty name exactly as typed, trimmed
    pub raw_counterparty_name: String,
    pub due_date: NaiveDate,
}

/// Reasons a line of text could not be read as a debt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("amount not understood, expected e.g. `300$ Антон 12.12.2025`")]
    AmountNotUnderstood,
    #[error("amount format invalid, expected e.g. 300 or 300.50")]
    AmountFormatInvalid,
    #[error("date not understood, expected e.g. `12.12.2025` or `12 декабря 2025`")]
    DateNotUnderstood,
    #[error("unknown month name: {0}")]
    UnknownMonthName(String),
    #[error("name missing, expected e.g. `300$ Антон 12.12.2025`")]
    NameMissingAfterDateRemoval,
}

impl ParseError {
    /// Localization key of the user-facing hint for this error
    pub fn message_key(&self) -> &'static str {
        match self {
            ParseError::AmountNotUnderstood => "parse-amount-not-understood",
            ParseError::AmountFormatInvalid => "parse-amount-format-invalid",
            ParseError::DateNotUnderstood => "parse-date-not-understood",
            ParseError::UnknownMonthName(_) => "parse-unknown-month",
            ParseError::NameMissingAfterDateRemoval => "parse-name-missing",
        }
    }
}

/// Result of the amount matcher: amount text, raw currency token and the rest of the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountMatch<'a> {
    pub amount: &'a str,
    pub currency: &'a str,
    pub rest: &'a str,
}

/// A date found inside the remainder, with its byte span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub start: usize,
    pub end: usize,
}

/// Parse a free-text debt entry
///
/// # Examples
///
/// ```rust
/// use dolgobot::debt_parser::parse_debt_text;
/// use chrono::NaiveDate;
///
/// let parsed = parse_debt_text("300$ Антон 12.12.2025").unwrap();
/// assert_eq!(parsed.amount_minor_units, 30000);
/// assert_eq!(parsed.currency_code, "USD");
/// assert_eq!(parsed.raw_counterparty_name, "Антон");
/// assert_eq!(parsed.due_date, NaiveDate::from_ymd_opt(2025, 12, 12).unwrap());
/// ```
pub fn parse_debt_text(text: &str) -> Result<ParsedDebt, ParseError> {
    let amount_match = match_amount(text).ok_or(ParseError::AmountNotUnderstood)?;
    trace!(
        "Amount matcher: amount='{}' currency='{}' rest='{}'",
        amount_match.amount,
        amount_match.currency,
        amount_match.rest
    );

    let amount_minor_units = amount_to_minor_units(amount_match.amount)?;
    let currency_code = normalize_currency(amount_match.currency);

    let date_match = match match_numeric_date(amount_match.rest)? {
        Some(found) => found,
        None => match_worded_date(amount_match.rest)?.ok_or(ParseError::DateNotUnderstood)?,
    };

    let raw_counterparty_name = remove_span(amount_match.rest, date_match.start, date_match.end);
    if raw_counterparty_name.is_empty() {
        return Err(ParseError::NameMissingAfterDateRemoval);
    }

    debug!(
        "Parsed debt: {} minor units {} for '{}' due {}",
        amount_minor_units, currency_code, raw_counterparty_name, date_match.date
    );

    Ok(ParsedDebt {
        amount_minor_units,
        currency_code,
        raw_counterparty_name,
        due_date: date_match.date,
    })
}

/// Match the leading amount and optional currency token
pub fn match_amount(text: &str) -> Option<AmountMatch<'_>> {
    let caps = AMOUNT_REGEX.captures(text)?;
    let amount = caps.name("amount")?.as_str();
    let currency = caps
        .name("currency")
        .or_else(|| caps.name("code"))
        .map(|m| m.as_str())
        .unwrap_or("");
    let rest = caps.name("rest")?.as_str();
    Some(AmountMatch { amount, currency, rest })
}

/// Convert decimal amount text (`"12,5"`, `"300"`) to minor units, rounding half-up
///
/// Amounts above [`MAX_AMOUNT_MINOR_UNITS`] are rejected as `AmountFormatInvalid`.
pub fn amount_to_minor_units(amount: &str) -> Result<i64, ParseError> {
    let normalized = amount.trim().replace(',', ".");
    let value = Decimal::from_str(&normalized).map_err(|_| ParseError::AmountFormatInvalid)?;
    let cents = value
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(ParseError::AmountFormatInvalid)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents
        .to_i64()
        .filter(|cents| *cents <= MAX_AMOUNT_MINOR_UNITS)
        .ok_or(ParseError::AmountFormatInvalid)
}

/// Map a currency token to its ISO code
///
/// Unknown tokens are passed through uppercased.
pub fn normalize_currency(token: &str) -> String {
    let token = token.trim().to_lowercase();
    match token.as_str() {
        "" => DEFAULT_CURRENCY.to_string(),
        "$" | "usd" => "USD".to_string(),
        "€" | "eur" => "EUR".to_string(),
        "£" | "gbp" => "GBP".to_string(),
        "₽" | "р" | "руб" | "руб." => "RUB".to_string(),
        other => other.to_uppercase(),
    }
}

/// Find a `D.M.YYYY` date (separator `.`, `-` or `/`, used consistently)
pub fn match_numeric_date(text: &str) -> Result<Option<DateMatch>, ParseError> {
    let Some(caps) = NUMERIC_DATE_REGEX.captures(text) else {
        return Ok(None);
    };
    let (start, end) = date_span(&caps)?;
    let month = ["m_dot", "m_dash", "m_slash"]
        .iter()
        .find_map(|name| caps.name(name))
        .ok_or(ParseError::DateNotUnderstood)?
        .as_str()
        .parse::<u32>()
        .map_err(|_| ParseError::DateNotUnderstood)?;

    let date = build_date(&caps, month)?;
    Ok(Some(DateMatch { date, start, end }))
}

/// Find a `D <месяц> YYYY` date with a Russian month name
pub fn match_worded_date(text: &str) -> Result<Option<DateMatch>, ParseError> {
    let Some(caps) = WORDED_DATE_REGEX.captures(text) else {
        return Ok(None);
    };
    let (start, end) = date_span(&caps)?;
    let month_word = caps
        .name("month")
        .ok_or(ParseError::DateNotUnderstood)?
        .as_str()
        .to_lowercase();
    let month = month_number(&month_word).ok_or(ParseError::UnknownMonthName(month_word))?;

    let date = build_date(&caps, month)?;
    Ok(Some(DateMatch { date, start, end }))
}

/// Month number for a lowercase Russian month name, nominative or genitive
pub fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [(&str, &str); 12] = [
        ("январь", "января"),
        ("февраль", "февраля"),
        ("март", "марта"),
        ("апрель", "апреля"),
        ("май", "мая"),
        ("июнь", "июня"),
        ("июль", "июля"),
        ("август", "августа"),
        ("сентябрь", "сентября"),
        ("октябрь", "октября"),
        ("ноябрь", "ноября"),
        ("декабрь", "декабря"),
    ];

    MONTHS
        .iter()
        .position(|(nominative, genitive)| name == *nominative || name == *genitive)
        .map(|index| index as u32 + 1)
}

/// Byte span from the first digit of the day to the last digit of the year
fn date_span(caps: &Captures<'_>) -> Result<(usize, usize), ParseError> {
    let day = caps.name("day").ok_or(ParseError::DateNotUnderstood)?;
    let year = caps.name("year").ok_or(ParseError::DateNotUnderstood)?;
    Ok((day.start(), year.end()))
}

fn build_date(caps: &Captures<'_>, month: u32) -> Result<NaiveDate, ParseError> {
    let day = caps
        .name("day")
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or(ParseError::DateNotUnderstood)?;
    let year = caps
        .name("year")
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .ok_or(ParseError::DateNotUnderstood)?;
    // 31.02.2025 and friends are rejected rather than rolled over
    NaiveDate::from_ymd_opt(year, month, day).ok_or(ParseError::DateNotUnderstood)
}

fn remove_span(text: &str, start: usize, end: usize) -> String {
    let before = text[..start].trim();
    let after = text[end..].trim();
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_string(),
        (false, true) => before.to_string(),
        (false, false) => format!("{before} {after}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_amount_conversion() {
        assert_eq!(amount_to_minor_units("300"), Ok(30000));
        assert_eq!(amount_to_minor_units("12.5"), Ok(1250));
        assert_eq!(amount_to_minor_units("12,50"), Ok(1250));
        assert_eq!(amount_to_minor_units("2.67"), Ok(267));
        assert_eq!(amount_to_minor_units("0,05"), Ok(5));
    }

    #[test]
    fn test_amount_conversion_is_exact_for_half_cents() {
        // Three fractional digits never come from the grammar, but the conversion stays exact
        assert_eq!(amount_to_minor_units("2.675"), Ok(268));
        assert_eq!(amount_to_minor_units("1.005"), Ok(101));
    }

    #[test]
    fn test_amount_overflow_is_format_error() {
        assert_eq!(
            amount_to_minor_units("99999999999999999999999"),
            Err(ParseError::AmountFormatInvalid)
        );
    }

    #[test]
    fn test_amount_ceiling() {
        assert_eq!(amount_to_minor_units("10000000000000"), Ok(MAX_AMOUNT_MINOR_UNITS));
        assert_eq!(
            amount_to_minor_units("10000000000000.01"),
            Err(ParseError::AmountFormatInvalid)
        );
        assert_eq!(
            amount_to_minor_units("90000000000000000"),
            Err(ParseError::AmountFormatInvalid)
        );
    }

    #[test]
    fn test_currency_normalization() {
        assert_eq!(normalize_currency("$"), "USD");
        assert_eq!(normalize_currency("USD"), "USD");
        assert_eq!(normalize_currency("€"), "EUR");
        assert_eq!(normalize_currency("gbp"), "GBP");
        assert_eq!(normalize_currency("руб."), "RUB");
        assert_eq!(normalize_currency("Р"), "RUB");
        assert_eq!(normalize_currency(""), "USD");
        assert_eq!(normalize_currency("xyz"), "XYZ");
    }

    #[test]
    fn test_month_table() {
        assert_eq!(month_number("января"), Some(1));
        assert_eq!(month_number("май"), Some(5));
        assert_eq!(month_number("мая"), Some(5));
        assert_eq!(month_number("декабря"), Some(12));
        assert_eq!(month_number("декабрь"), Some(12));
        assert_eq!(month_number("december"), None);
    }

    #[test]
    fn test_numeric_date_separators() {
        let found = match_numeric_date("Антон 1/2/2026").unwrap().unwrap();
        assert_eq!(found.date, date(2026, 2, 1));
        let found = match_numeric_date("Антон 01-02-2026").unwrap().unwrap();
        assert_eq!(found.date, date(2026, 2, 1));
        assert!(match_numeric_date("Антон 01.02/2026").unwrap().is_none());
    }

    #[test]
    fn test_date_touching_cyrillic_text() {
        let parsed = parse_debt_text("300$ Антон 12.12.2025г").unwrap();
        assert_eq!(parsed.due_date, date(2025, 12, 12));
        assert_eq!(parsed.raw_counterparty_name, "Антон г");

        let parsed = parse_debt_text("300$ Антон до12.12.2025").unwrap();
        assert_eq!(parsed.due_date, date(2025, 12, 12));
        assert_eq!(parsed.raw_counterparty_name, "Антон до");

        let found = match_worded_date("Антон к12 декабря 2025г").unwrap().unwrap();
        assert_eq!(found.date, date(2025, 12, 12));
        assert_eq!(&"Антон к12 декабря 2025г"[found.start..found.end], "12 декабря 2025");
    }

    #[test]
    fn test_date_glued_to_ascii_word_is_ignored() {
        assert!(match_numeric_date("Anton x12.12.2025").unwrap().is_none());
        assert!(match_numeric_date("Anton 12.12.20251").unwrap().is_none());
    }

    #[test]
    fn test_worded_date_case_insensitive() {
        let found = match_worded_date("Антон 3 Марта 2026").unwrap().unwrap();
        assert_eq!(found.date, date(2026, 3, 3));
        assert_eq!(&"Антон 3 Марта 2026"[found.start..found.end], "3 Марта 2026");
    }

    #[test]
    fn test_parse_numeric_date() {
        let parsed = parse_debt_text("300$ Антон 12.12.2025").unwrap();
        assert_eq!(parsed.amount_minor_units, 30000);
        assert_eq!(parsed.currency_code, "USD");
        assert_eq!(parsed.raw_counterparty_name, "Антон");
        assert_eq!(parsed.due_date, date(2025, 12, 12));
    }

    #[test]
    fn test_parse_worded_date() {
        let parsed = parse_debt_text("300$ Антон Потупчик 12 декабря 2025").unwrap();
        assert_eq!(parsed.raw_counterparty_name, "Антон Потупчик");
        assert_eq!(parsed.due_date, date(2025, 12, 12));
    }

    #[test]
    fn test_parse_date_in_the_middle() {
        let parsed = parse_debt_text("50 eur Анна 01.06.2026 за билеты").unwrap();
        assert_eq!(parsed.currency_code, "EUR");
        assert_eq!(parsed.raw_counterparty_name, "Анна за билеты");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_debt_text("300$ Антон"), Err(ParseError::DateNotUnderstood));
        assert_eq!(parse_debt_text("Антон 300$"), Err(ParseError::AmountNotUnderstood));
        assert_eq!(
            parse_debt_text("300$ 12.12.2025"),
            Err(ParseError::NameMissingAfterDateRemoval)
        );
        assert_eq!(
            parse_debt_text("300$ Антон 12 грудня 2025"),
            Err(ParseError::UnknownMonthName("грудня".to_string()))
        );
        assert_eq!(parse_debt_text("300$ Антон 31.02.2025"), Err(ParseError::DateNotUnderstood));
    }

    #[test]
    fn test_parse_rejects_oversized_amounts() {
        assert_eq!(
            parse_debt_text("90000000000000000$ Антон 12.12.2025"),
            Err(ParseError::AmountFormatInvalid)
        );
        assert_eq!(
            parse_debt_text("99999999999999999999999 Антон 12.12.2025"),
            Err(ParseError::AmountFormatInvalid)
        );
        assert!(parse_debt_text("10000000000000$ Антон 12.12.2025").is_ok());
    }

    #[test]
    fn test_message_keys_are_distinct() {
        let keys = [
            ParseError::AmountNotUnderstood.message_key(),
            ParseError::AmountFormatInvalid.message_key(),
            ParseError::DateNotUnderstood.message_key(),
            ParseError::UnknownMonthName("x".into()).message_key(),
            ParseError::NameMissingAfterDateRemoval.message_key(),
        ];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }
}

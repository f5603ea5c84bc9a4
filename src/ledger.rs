//! # Ledger Module
//!
//! Debt records, their lifecycle and the per-currency summary shown by `/debts`.
//!
//! Amounts are integer minor units everywhere; [`format_money`] is the only
//! place they become decimal text.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::debt_parser::ParsedDebt;

/// Lifecycle state of a debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtStatus {
    Active,
    /// Due date has passed and the debt is still unpaid
    Overdue,
    Closed,
}

impl DebtStatus {
    /// Active and overdue debts count towards lists and summaries
    pub fn is_open(self) -> bool {
        matches!(self, DebtStatus::Active | DebtStatus::Overdue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DebtStatus::Active => "active",
            DebtStatus::Overdue => "overdue",
            DebtStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebtStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(DebtStatus::Active),
            "overdue" => Ok(DebtStatus::Overdue),
            "closed" => Ok(DebtStatus::Closed),
            other => Err(anyhow!("unknown debt status: {other}")),
        }
    }
}

/// A recorded debt: `creditor_id` lent `amount_minor_units` to `debtor_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub id: i64,
    pub creditor_id: i64,
    pub debtor_id: i64,
    pub amount_minor_units: i64,
    pub currency_code: String,
    pub due_date: NaiveDate,
    pub status: DebtStatus,
}

/// Data needed to record a new debt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDebt {
    pub creditor_id: i64,
    pub debtor_id: i64,
    pub amount_minor_units: i64,
    pub currency_code: String,
    pub due_date: NaiveDate,
}

impl NewDebt {
    /// Build a debt record from parsed text once the debtor is resolved
    pub fn from_parsed(creditor_id: i64, debtor_id: i64, parsed: &ParsedDebt) -> Self {
        Self {
            creditor_id,
            debtor_id,
            amount_minor_units: parsed.amount_minor_units,
            currency_code: parsed.currency_code.clone(),
            due_date: parsed.due_date,
        }
    }
}

/// Open debts of one owner in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySummary {
    pub currency_code: String,
    /// Total the owner lent out
    pub lent_minor_units: i64,
    /// Total the owner owes
    pub owed_minor_units: i64,
    /// `lent - owed`
    pub net_minor_units: i64,
}

/// Fold open debts involving `owner_id` into per-currency totals, sorted by currency
///
/// Totals that would not fit in `i64` are an error rather than a wrapped value.
pub fn summarize_by_currency(owner_id: i64, debts: &[Debt]) -> Result<Vec<CurrencySummary>> {
    let mut totals: BTreeMap<&str, (i64, i64)> = BTreeMap::new();

    for debt in debts
        .iter()
        .filter(|d| d.status.is_open() && (d.creditor_id == owner_id || d.debtor_id == owner_id))
    {
        let entry = totals.entry(debt.currency_code.as_str()).or_default();
        if debt.creditor_id == owner_id {
            entry.0 = entry
                .0
                .checked_add(debt.amount_minor_units)
                .ok_or_else(|| anyhow!("lent total overflows in {}", debt.currency_code))?;
        }
        if debt.debtor_id == owner_id {
            entry.1 = entry
                .1
                .checked_add(debt.amount_minor_units)
                .ok_or_else(|| anyhow!("owed total overflows in {}", debt.currency_code))?;
        }
    }

    totals
        .into_iter()
        .map(|(currency, (lent, owed))| {
            let net = lent
                .checked_sub(owed)
                .ok_or_else(|| anyhow!("net balance overflows in {currency}"))?;
            Ok(CurrencySummary {
                currency_code: currency.to_string(),
                lent_minor_units: lent,
                owed_minor_units: owed,
                net_minor_units: net,
            })
        })
        .collect()
}

/// Render minor units as `"12.50 USD"`
pub fn format_money(minor_units: i64, currency_code: &str) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02} {currency_code}", abs / 100, abs % 100)
}

/// Render a net balance with an explicit sign: `"+5.00 EUR"`, `"-1.20 USD"`
pub fn format_signed_money(minor_units: i64, currency_code: &str) -> String {
    if minor_units < 0 {
        format_money(minor_units, currency_code)
    } else {
        format!("+{}", format_money(minor_units, currency_code))
    }
}

/// Debt ledger held in memory
///
/// Follows the same rules as the PostgreSQL ledger: ids start at 1, only
/// open debts can be closed and only by one of the two parties.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    debts: Vec<Debt>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a debt and return its id
    pub fn create_debt(&mut self, new_debt: NewDebt) -> i64 {
        let id = self.debts.len() as i64 + 1;
        self.debts.push(Debt {
            id,
            creditor_id: new_debt.creditor_id,
            debtor_id: new_debt.debtor_id,
            amount_minor_units: new_debt.amount_minor_units,
            currency_code: new_debt.currency_code,
            due_date: new_debt.due_date,
            status: DebtStatus::Active,
        });
        id
    }

    /// Close an open debt the caller is party to; `false` when nothing changed
    pub fn close_debt(&mut self, owner_id: i64, debt_id: i64) -> bool {
        match self.debts.iter_mut().find(|d| {
            d.id == debt_id && d.status.is_open() && (d.creditor_id == owner_id || d.debtor_id == owner_id)
        }) {
            Some(debt) => {
                debt.status = DebtStatus::Closed;
                true
            }
            None => false,
        }
    }

    /// Mark open debts due before `today` as overdue, returning how many changed
    pub fn mark_overdue(&mut self, today: NaiveDate) -> usize {
        let mut changed = 0;
        for debt in self
            .debts
            .iter_mut()
            .filter(|d| d.status == DebtStatus::Active && d.due_date < today)
        {
            debt.status = DebtStatus::Overdue;
            changed += 1;
        }
        changed
    }

    pub fn get(&self, debt_id: i64) -> Option<&Debt> {
        self.debts.iter().find(|d| d.id == debt_id)
    }

    /// Open debts where `owner_id` is the creditor
    pub fn list_lent(&self, owner_id: i64) -> Vec<&Debt> {
        self.debts
            .iter()
            .filter(|d| d.creditor_id == owner_id && d.status.is_open())
            .collect()
    }

    /// Open debts where `owner_id` is the debtor
    pub fn list_owed(&self, owner_id: i64) -> Vec<&Debt> {
        self.debts
            .iter()
            .filter(|d| d.debtor_id == owner_id && d.status.is_open())
            .collect()
    }

    pub fn summary(&self, owner_id: i64) -> Result<Vec<CurrencySummary>> {
        summarize_by_currency(owner_id, &self.debts)
    }
}

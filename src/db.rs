//! # Database Module
//!
//! PostgreSQL storage for users, contacts, aliases and debts.
//!
//! Every write that can be repeated (`add_contact`, `add_alias`,
//! `claim_reminder`) is idempotent through `ON CONFLICT DO NOTHING`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, info};

use crate::contact_resolver::{normalize_alias, AliasLookup, ContactCandidate};
use crate::ledger::{summarize_by_currency, CurrencySummary, Debt, DebtStatus, NewDebt};

/// Registered Telegram user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl User {
    pub fn as_candidate(&self) -> ContactCandidate {
        ContactCandidate {
            contact_id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    /// Label shown to other users: full name, then `@username`
    pub fn display_name(&self) -> String {
        self.as_candidate().display_name()
    }
}

/// Profile fields refreshed on every inbound message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelegramProfile<'a> {
    pub username: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub language_code: Option<&'a str>,
}

/// A contact with every alias the owner gave them, longest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactWithAliases {
    pub contact_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub aliases: Vec<String>,
}

impl ContactWithAliases {
    /// Button title: username, then full name, then the raw id
    pub fn title(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => ContactCandidate {
                contact_id: self.contact_id,
                username: None,
                first_name: self.first_name.clone(),
                last_name: self.last_name.clone(),
            }
            .display_name(),
        }
    }
}

/// Stored alias row, used by the alias management menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRow {
    pub id: i64,
    pub alias: String,
}

/// Open debt joined with the best label for the other party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtListRow {
    pub debt: Debt,
    /// Longest alias, else username, else full name of the counterparty
    pub counterparty_name: String,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            language_code TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS users_username_lower_idx ON users (lower(username))")
        .execute(pool)
        .await
        .context("Failed to create users username index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS contacts (
            owner_user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            contact_user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (owner_user_id, contact_user_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create contacts table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS contact_aliases (
            id BIGSERIAL PRIMARY KEY,
            owner_user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            contact_user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            alias TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (owner_user_id, contact_user_id, alias)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create contact_aliases table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS contact_aliases_owner_alias_idx
         ON contact_aliases (owner_user_id, alias)",
    )
    .execute(pool)
    .await
    .context("Failed to create contact_aliases index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS debts (
            id BIGSERIAL PRIMARY KEY,
            creditor_id BIGINT NOT NULL REFERENCES users(id),
            debtor_id BIGINT NOT NULL REFERENCES users(id),
            amount_cents BIGINT NOT NULL CHECK (amount_cents >= 0),
            currency TEXT NOT NULL,
            due_date DATE NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'overdue', 'closed')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            closed_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create debts table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS debts_due_date_idx ON debts (status, due_date)")
        .execute(pool)
        .await
        .context("Failed to create debts due date index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS debt_reminders (
            debt_id BIGINT NOT NULL REFERENCES debts(id) ON DELETE CASCADE,
            offset_days INTEGER NOT NULL,
            sent_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (debt_id, offset_days)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create debt_reminders table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Insert or refresh a Telegram user, returning the internal id
///
/// A missing `language_code` keeps the stored one.
pub async fn upsert_telegram_user(
    pool: &PgPool,
    telegram_id: i64,
    profile: &TelegramProfile<'_>,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (telegram_id, username, first_name, last_name, language_code)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (telegram_id) DO UPDATE
         SET username = EXCLUDED.username,
             first_name = EXCLUDED.first_name,
             last_name = EXCLUDED.last_name,
             language_code = COALESCE(EXCLUDED.language_code, users.language_code)
         RETURNING id",
    )
    .bind(telegram_id)
    .bind(profile.username)
    .bind(profile.first_name)
    .bind(profile.last_name)
    .bind(profile.language_code)
    .fetch_one(pool)
    .await
    .context("Failed to upsert user")?;

    debug!(telegram_id, user_id = id, "User upserted");
    Ok(id)
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        language_code: row.try_get("language_code")?,
    })
}

/// Get a user by internal id
pub async fn get_user_by_id(pool: &PgPool, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, telegram_id, username, first_name, last_name, language_code
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read user by id")?;

    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("Failed to decode user row")
}

/// Get a user's internal id from their Telegram id
pub async fn get_user_id_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read user by telegram id")
}

/// Find a registered user by username, case-insensitively, without the leading `@`
pub async fn find_user_id_by_username(pool: &PgPool, username: &str) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE lower(username) = lower($1) LIMIT 1")
        .bind(username.trim_start_matches('@'))
        .fetch_optional(pool)
        .await
        .context("Failed to find user by username")
}

// ---------------------------------------------------------------------------
// Contacts and aliases
// ---------------------------------------------------------------------------

/// Add `contact_id` to the owner's contacts (no-op when already present)
pub async fn add_contact(pool: &PgPool, owner_id: i64, contact_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO contacts (owner_user_id, contact_user_id)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(owner_id)
    .bind(contact_id)
    .execute(pool)
    .await
    .context("Failed to add contact")?;
    Ok(())
}

/// The owner's contact with this id, `None` when it is not in their contacts
pub async fn get_contact(pool: &PgPool, owner_id: i64, contact_id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT u.id, u.telegram_id, u.username, u.first_name, u.last_name, u.language_code
         FROM contacts c
         JOIN users u ON u.id = c.contact_user_id
         WHERE c.owner_user_id = $1 AND c.contact_user_id = $2",
    )
    .bind(owner_id)
    .bind(contact_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read contact")?;

    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("Failed to decode contact row")
}

/// Store a normalized alias for a contact (no-op when already present)
pub async fn add_alias(pool: &PgPool, owner_id: i64, contact_id: i64, alias: &str) -> Result<()> {
    let alias = normalize_alias(alias);
    if alias.is_empty() {
        anyhow::bail!("alias is empty after normalization");
    }

    sqlx::query(
        "INSERT INTO contact_aliases (owner_user_id, contact_user_id, alias)
         VALUES ($1, $2, $3)
         ON CONFLICT DO NOTHING",
    )
    .bind(owner_id)
    .bind(contact_id)
    .bind(&alias)
    .execute(pool)
    .await
    .context("Failed to add alias")?;
    Ok(())
}

/// Remove a contact and the owner's aliases for them
pub async fn delete_contact(pool: &PgPool, owner_id: i64, contact_id: i64) -> Result<bool> {
    sqlx::query("DELETE FROM contact_aliases WHERE owner_user_id = $1 AND contact_user_id = $2")
        .bind(owner_id)
        .bind(contact_id)
        .execute(pool)
        .await
        .context("Failed to delete contact aliases")?;

    let result = sqlx::query("DELETE FROM contacts WHERE owner_user_id = $1 AND contact_user_id = $2")
        .bind(owner_id)
        .bind(contact_id)
        .execute(pool)
        .await
        .context("Failed to delete contact")?;

    Ok(result.rows_affected() > 0)
}

/// Aliases the owner gave one contact, longest first
pub async fn list_contact_aliases(
    pool: &PgPool,
    owner_id: i64,
    contact_id: i64,
) -> Result<Vec<AliasRow>> {
    let rows = sqlx::query(
        "SELECT id, alias FROM contact_aliases
         WHERE owner_user_id = $1 AND contact_user_id = $2
         ORDER BY length(alias) DESC, id",
    )
    .bind(owner_id)
    .bind(contact_id)
    .fetch_all(pool)
    .await
    .context("Failed to list contact aliases")?;

    rows.iter()
        .map(|row| {
            Ok(AliasRow {
                id: row.try_get("id")?,
                alias: row.try_get("alias")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("Failed to decode alias rows")
}

/// Delete one alias owned by `owner_id`, returning the contact it belonged to
pub async fn delete_alias(pool: &PgPool, owner_id: i64, alias_id: i64) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        "DELETE FROM contact_aliases WHERE id = $1 AND owner_user_id = $2
         RETURNING contact_user_id",
    )
    .bind(alias_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .context("Failed to delete alias")
}

/// The owner's contacts with their aliases, sorted by display title
pub async fn list_contacts_with_aliases(
    pool: &PgPool,
    owner_id: i64,
    limit: i64,
) -> Result<Vec<ContactWithAliases>> {
    let limit = if limit <= 0 { 100 } else { limit };
    let rows = sqlx::query(
        "SELECT c.contact_user_id,
                u.username,
                u.first_name,
                u.last_name,
                COALESCE(
                    array_agg(a.alias ORDER BY length(a.alias) DESC)
                        FILTER (WHERE a.alias IS NOT NULL),
                    ARRAY[]::text[]
                ) AS aliases
         FROM contacts c
         LEFT JOIN users u ON u.id = c.contact_user_id
         LEFT JOIN contact_aliases a
                ON a.owner_user_id = c.owner_user_id
               AND a.contact_user_id = c.contact_user_id
         WHERE c.owner_user_id = $1
         GROUP BY c.contact_user_id, u.username, u.first_name, u.last_name
         ORDER BY COALESCE(NULLIF(u.username, ''), concat_ws(' ', u.first_name, u.last_name)) ASC
         LIMIT $2",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list contacts")?;

    rows.iter()
        .map(|row| {
            Ok(ContactWithAliases {
                contact_id: row.try_get("contact_user_id")?,
                username: row.try_get("username")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                aliases: row.try_get("aliases")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("Failed to decode contact rows")
}

fn candidate_from_row(row: &PgRow) -> Result<ContactCandidate, sqlx::Error> {
    Ok(ContactCandidate {
        contact_id: row.try_get("contact_user_id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
    })
}

/// Alias lookups backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgAliasStore {
    pool: Arc<PgPool>,
}

impl PgAliasStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AliasLookup for PgAliasStore {
    async fn exact_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        let rows = sqlx::query(
            "SELECT ca.contact_user_id, u.username, u.first_name, u.last_name
             FROM contact_aliases ca
             JOIN users u ON u.id = ca.contact_user_id
             WHERE ca.owner_user_id = $1 AND ca.alias = $2
             ORDER BY ca.contact_user_id
             LIMIT $3",
        )
        .bind(owner_id)
        .bind(needle)
        .bind(limit as i64)
        .fetch_all(self.pool.as_ref())
        .await
        .context("Failed to run exact alias lookup")?;

        rows.iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Failed to decode alias candidates")
    }

    async fn fuzzy_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        // Aliases are stored normalized, so a plain substring test is case-insensitive
        let rows = sqlx::query(
            "SELECT DISTINCT ca.contact_user_id, u.username, u.first_name, u.last_name
             FROM contact_aliases ca
             JOIN users u ON u.id = ca.contact_user_id
             WHERE ca.owner_user_id = $1 AND strpos(ca.alias, $2) > 0
             ORDER BY ca.contact_user_id
             LIMIT $3",
        )
        .bind(owner_id)
        .bind(needle)
        .bind(limit as i64)
        .fetch_all(self.pool.as_ref())
        .await
        .context("Failed to run fuzzy alias lookup")?;

        rows.iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Failed to decode alias candidates")
    }
}

// ---------------------------------------------------------------------------
// Debts
// ---------------------------------------------------------------------------

fn debt_from_row(row: &PgRow) -> Result<Debt> {
    let status: String = row.try_get("status")?;
    Ok(Debt {
        id: row.try_get("id")?,
        creditor_id: row.try_get("creditor_id")?,
        debtor_id: row.try_get("debtor_id")?,
        amount_minor_units: row.try_get("amount_cents")?,
        currency_code: row.try_get("currency")?,
        due_date: row.try_get("due_date")?,
        status: status.parse::<DebtStatus>()?,
    })
}

/// Record a new active debt and return its id
pub async fn create_debt(pool: &PgPool, new_debt: &NewDebt) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO debts (creditor_id, debtor_id, amount_cents, currency, due_date)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(new_debt.creditor_id)
    .bind(new_debt.debtor_id)
    .bind(new_debt.amount_minor_units)
    .bind(&new_debt.currency_code)
    .bind(new_debt.due_date)
    .fetch_one(pool)
    .await
    .context("Failed to insert debt")?;

    info!(
        debt_id = id,
        creditor_id = new_debt.creditor_id,
        debtor_id = new_debt.debtor_id,
        "Debt created"
    );
    Ok(id)
}

/// Read a debt by id
pub async fn get_debt(pool: &PgPool, debt_id: i64) -> Result<Option<Debt>> {
    let row = sqlx::query(
        "SELECT id, creditor_id, debtor_id, amount_cents, currency, due_date, status
         FROM debts WHERE id = $1",
    )
    .bind(debt_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read debt")?;

    row.as_ref().map(debt_from_row).transpose()
}

/// Close an open debt the owner is party to
///
/// Returns `false` when the debt does not exist, is already closed or belongs
/// to someone else. Of two concurrent calls at most one returns `true`.
pub async fn close_debt(pool: &PgPool, owner_id: i64, debt_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE debts
         SET status = 'closed', closed_at = now(), updated_at = now()
         WHERE id = $1
           AND status IN ('active', 'overdue')
           AND (creditor_id = $2 OR debtor_id = $2)",
    )
    .bind(debt_id)
    .bind(owner_id)
    .execute(pool)
    .await
    .context("Failed to close debt")?;

    Ok(result.rows_affected() > 0)
}

async fn list_open_debts_for_party(
    pool: &PgPool,
    owner_id: i64,
    owner_column: &str,
    counterparty_column: &str,
    limit: i64,
) -> Result<Vec<DebtListRow>> {
    let limit = if limit <= 0 { 50 } else { limit };
    let sql = format!(
        "SELECT d.id, d.creditor_id, d.debtor_id, d.amount_cents, d.currency, d.due_date, d.status,
                COALESCE(
                    NULLIF(trim(a.alias), ''),
                    NULLIF(u.username, ''),
                    concat_ws(' ', u.first_name, u.last_name)
                ) AS counterparty_name
         FROM debts d
         LEFT JOIN users u ON u.id = d.{counterparty_column}
         LEFT JOIN LATERAL (
             SELECT alias FROM contact_aliases
             WHERE owner_user_id = $1 AND contact_user_id = d.{counterparty_column}
             ORDER BY length(alias) DESC
             LIMIT 1
         ) a ON true
         WHERE d.{owner_column} = $1
           AND d.status IN ('active', 'overdue')
         ORDER BY d.due_date ASC, d.id DESC
         LIMIT $2"
    );

    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list debts")?;

    rows.iter()
        .map(|row| -> Result<DebtListRow> {
            Ok(DebtListRow {
                debt: debt_from_row(row)?,
                counterparty_name: row
                    .try_get::<Option<String>, _>("counterparty_name")?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Open debts where the owner is the creditor
pub async fn list_debtors(pool: &PgPool, owner_id: i64, limit: i64) -> Result<Vec<DebtListRow>> {
    list_open_debts_for_party(pool, owner_id, "creditor_id", "debtor_id", limit).await
}

/// Open debts where the owner is the debtor
pub async fn list_my_debts(pool: &PgPool, owner_id: i64, limit: i64) -> Result<Vec<DebtListRow>> {
    list_open_debts_for_party(pool, owner_id, "debtor_id", "creditor_id", limit).await
}

/// Per-currency totals of the owner's open debts
pub async fn summary_by_currency(pool: &PgPool, owner_id: i64) -> Result<Vec<CurrencySummary>> {
    let rows = sqlx::query(
        "SELECT id, creditor_id, debtor_id, amount_cents, currency, due_date, status
         FROM debts
         WHERE (creditor_id = $1 OR debtor_id = $1)
           AND status IN ('active', 'overdue')",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("Failed to load debts for summary")?;

    let debts = rows.iter().map(debt_from_row).collect::<Result<Vec<_>>>()?;
    summarize_by_currency(owner_id, &debts)
}

/// Flag active debts due before `today` as overdue
pub async fn mark_overdue(pool: &PgPool, today: NaiveDate) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE debts SET status = 'overdue', updated_at = now()
         WHERE status = 'active' AND due_date < $1",
    )
    .bind(today)
    .execute(pool)
    .await
    .context("Failed to mark overdue debts")?;

    Ok(result.rows_affected())
}

/// Active debts due exactly on `due_date`
pub async fn active_debts_due_on(pool: &PgPool, due_date: NaiveDate) -> Result<Vec<Debt>> {
    let rows = sqlx::query(
        "SELECT id, creditor_id, debtor_id, amount_cents, currency, due_date, status
         FROM debts
         WHERE status = 'active' AND due_date = $1
         ORDER BY id",
    )
    .bind(due_date)
    .fetch_all(pool)
    .await
    .context("Failed to load due debts")?;

    rows.iter().map(debt_from_row).collect()
}

/// Record that the reminder for `(debt_id, offset_days)` is being sent
///
/// Returns `true` only for the first caller.
pub async fn claim_reminder(pool: &PgPool, debt_id: i64, offset_days: u32) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO debt_reminders (debt_id, offset_days)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(debt_id)
    .bind(offset_days as i32)
    .execute(pool)
    .await
    .context("Failed to claim reminder")?;

    Ok(result.rows_affected() > 0)
}

//! # Contact Resolver Module
//!
//! Resolves a typed name ("Антон", "anna k") to one of the owner's contacts.
//!
//! The lookup runs in two passes against the owner's alias table:
//!
//! 1. **Exact**: aliases equal to the normalized name. One hit wins, several
//!    hits are returned for disambiguation.
//! 2. **Fuzzy**: aliases containing the normalized name. Only consulted when
//!    the exact pass found nothing.
//!
//! Storage is abstracted behind [`AliasLookup`] so the same tie-break policy
//! runs against PostgreSQL in production and [`InMemoryAliasStore`] in tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// Maximum number of candidates offered for disambiguation
pub const MAX_CANDIDATES: usize = 5;

/// One possible resolution of a typed name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCandidate {
    /// Internal user id of the contact
    pub contact_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ContactCandidate {
    /// Human-readable label: full name, then `@username`, then the raw id
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full_name.is_empty() {
            return full_name;
        }
        match self.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => format!("user_id={}", self.contact_id),
        }
    }
}

/// Outcome of resolving a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one contact matched
    Single(i64),
    /// Several contacts matched; at most [`MAX_CANDIDATES`] are listed
    Ambiguous(Vec<ContactCandidate>),
    /// Nothing matched
    NoMatch,
}

/// Owner-scoped alias queries used by [`resolve_contact`]
///
/// `needle` is always already normalized with [`normalize_alias`].
#[async_trait]
pub trait AliasLookup: Send + Sync {
    /// Contacts having an alias equal to `needle`, one row per matching alias
    async fn exact_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>>;

    /// Distinct contacts having an alias that contains `needle`
    async fn fuzzy_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>>;
}

/// Normalize an alias: trim, lowercase, collapse whitespace runs
///
/// # Examples
///
/// ```rust
/// use dolgobot::contact_resolver::normalize_alias;
///
/// assert_eq!(normalize_alias("  Ann   K "), "ann k");
/// ```
pub fn normalize_alias(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `raw_name` against the aliases of `owner_id`
pub async fn resolve_contact(
    store: &dyn AliasLookup,
    owner_id: i64,
    raw_name: &str,
) -> Result<Resolution> {
    let needle = normalize_alias(raw_name);
    if needle.is_empty() {
        return Ok(Resolution::NoMatch);
    }

    let exact = store
        .exact_alias_matches(owner_id, &needle, MAX_CANDIDATES)
        .await?;
    debug!(owner_id, needle = %needle, hits = exact.len(), "Exact alias pass");
    match exact.len() {
        0 => {}
        1 => return Ok(Resolution::Single(exact[0].contact_id)),
        _ => return Ok(Resolution::Ambiguous(truncate(exact))),
    }

    let fuzzy = store
        .fuzzy_alias_matches(owner_id, &needle, MAX_CANDIDATES)
        .await?;
    debug!(owner_id, needle = %needle, hits = fuzzy.len(), "Fuzzy alias pass");
    Ok(match fuzzy.len() {
        0 => Resolution::NoMatch,
        1 => Resolution::Single(fuzzy[0].contact_id),
        _ => Resolution::Ambiguous(truncate(fuzzy)),
    })
}

fn truncate(mut candidates: Vec<ContactCandidate>) -> Vec<ContactCandidate> {
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Alias table kept in memory, keyed by owner
///
/// Mirrors the PostgreSQL queries: exact matches are returned per alias row,
/// fuzzy matches are distinct contacts ordered by id.
#[derive(Debug, Default)]
pub struct InMemoryAliasStore {
    profiles: RwLock<BTreeMap<i64, ContactCandidate>>,
    aliases: RwLock<Vec<(i64, i64, String)>>,
}

impl InMemoryAliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register display information for a contact
    pub fn add_profile(&self, candidate: ContactCandidate) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(candidate.contact_id, candidate);
        }
    }

    /// Add an alias; duplicates of the same normalized alias are ignored
    pub fn add_alias(&self, owner_id: i64, contact_id: i64, alias: &str) {
        let alias = normalize_alias(alias);
        if alias.is_empty() {
            return;
        }
        if let Ok(mut aliases) = self.aliases.write() {
            let row = (owner_id, contact_id, alias);
            if !aliases.contains(&row) {
                aliases.push(row);
            }
        }
    }

    fn candidate(&self, contact_id: i64) -> ContactCandidate {
        self.profiles
            .read()
            .ok()
            .and_then(|profiles| profiles.get(&contact_id).cloned())
            .unwrap_or(ContactCandidate {
                contact_id,
                username: None,
                first_name: None,
                last_name: None,
            })
    }
}

#[async_trait]
impl AliasLookup for InMemoryAliasStore {
    async fn exact_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        let aliases = self
            .aliases
            .read()
            .map_err(|_| anyhow::anyhow!("alias table lock poisoned"))?;
        Ok(aliases
            .iter()
            .filter(|(owner, _, alias)| *owner == owner_id && alias == needle)
            .take(limit)
            .map(|(_, contact_id, _)| self.candidate(*contact_id))
            .collect())
    }

    async fn fuzzy_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        let aliases = self
            .aliases
            .read()
            .map_err(|_| anyhow::anyhow!("alias table lock poisoned"))?;
        let mut contact_ids: Vec<i64> = aliases
            .iter()
            .filter(|(owner, _, alias)| *owner == owner_id && alias.contains(needle))
            .map(|(_, contact_id, _)| *contact_id)
            .collect();
        contact_ids.sort_unstable();
        contact_ids.dedup();
        Ok(contact_ids
            .into_iter()
            .take(limit)
            .map(|contact_id| self.candidate(contact_id))
            .collect())
    }
}

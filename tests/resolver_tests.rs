//! Contact resolution policy tests against the in-memory alias store

use anyhow::Result;
use async_trait::async_trait;
use dolgobot::contact_resolver::{
    resolve_contact, AliasLookup, ContactCandidate, InMemoryAliasStore, Resolution, MAX_CANDIDATES,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a store and counts how often each pass runs
struct CountingStore {
    inner: InMemoryAliasStore,
    exact_calls: AtomicUsize,
    fuzzy_calls: AtomicUsize,
}

impl CountingStore {
    fn new(inner: InMemoryAliasStore) -> Self {
        Self {
            inner,
            exact_calls: AtomicUsize::new(0),
            fuzzy_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AliasLookup for CountingStore {
    async fn exact_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        self.exact_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exact_alias_matches(owner_id, needle, limit).await
    }

    async fn fuzzy_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        self.fuzzy_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fuzzy_alias_matches(owner_id, needle, limit).await
    }
}

/// A store that ignores the requested limit and returns every match
struct UnlimitedStore(InMemoryAliasStore);

#[async_trait]
impl AliasLookup for UnlimitedStore {
    async fn exact_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        _limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        self.0.exact_alias_matches(owner_id, needle, usize::MAX).await
    }

    async fn fuzzy_alias_matches(
        &self,
        owner_id: i64,
        needle: &str,
        _limit: usize,
    ) -> Result<Vec<ContactCandidate>> {
        self.0.fuzzy_alias_matches(owner_id, needle, usize::MAX).await
    }
}

#[tokio::test]
async fn test_exact_hit_skips_fuzzy_pass() {
    let inner = InMemoryAliasStore::new();
    inner.add_alias(1, 10, "Ann");
    inner.add_alias(1, 11, "Annabel");
    let store = CountingStore::new(inner);

    let resolution = resolve_contact(&store, 1, "  ANN ").await.unwrap();

    assert_eq!(resolution, Resolution::Single(10));
    assert_eq!(store.exact_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.fuzzy_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shared_alias_is_ambiguous() {
    let store = InMemoryAliasStore::new();
    store.add_alias(1, 20, "friend");
    store.add_alias(1, 21, "friend");

    match resolve_contact(&store, 1, "Friend").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            let ids: Vec<i64> = candidates.iter().map(|c| c.contact_id).collect();
            assert_eq!(ids.len(), 2);
            assert!(ids.contains(&20) && ids.contains(&21));
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[tokio::test]
async fn test_substring_single_match() {
    let store = InMemoryAliasStore::new();
    store.add_profile(ContactCandidate {
        contact_id: 30,
        username: Some("anna_k".to_string()),
        first_name: Some("Anna".to_string()),
        last_name: Some("Karenina".to_string()),
    });
    store.add_alias(1, 30, "Anna Karenina");

    let resolution = resolve_contact(&store, 1, "karen").await.unwrap();
    assert_eq!(resolution, Resolution::Single(30));
}

#[tokio::test]
async fn test_fuzzy_ambiguity_is_capped_and_deduplicated() {
    let store = InMemoryAliasStore::new();
    for contact_id in 100..110 {
        store.add_alias(1, contact_id, &format!("sasha {contact_id}"));
        store.add_alias(1, contact_id, &format!("alexander sasha {contact_id}"));
    }

    match resolve_contact(&store, 1, "sasha").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            let ids: Vec<i64> = candidates.iter().map(|c| c.contact_id).collect();
            assert_eq!(ids, vec![100, 101, 102, 103, 104]);
            assert_eq!(ids.len(), MAX_CANDIDATES);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[tokio::test]
async fn test_candidates_carry_display_info() {
    let store = InMemoryAliasStore::new();
    store.add_profile(ContactCandidate {
        contact_id: 40,
        username: Some("petya".to_string()),
        first_name: None,
        last_name: None,
    });
    store.add_alias(1, 40, "Петя");
    store.add_alias(1, 41, "Петя");

    match resolve_contact(&store, 1, "петя").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            let names: Vec<String> = candidates.iter().map(ContactCandidate::display_name).collect();
            assert!(names.contains(&"@petya".to_string()));
            assert!(names.contains(&"user_id=41".to_string()));
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exact_ambiguity_is_capped() {
    let inner = InMemoryAliasStore::new();
    for contact_id in 200..207 {
        inner.add_alias(1, contact_id, "Sasha");
    }
    let store = CountingStore::new(inner);

    match resolve_contact(&store, 1, "sasha").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            let ids: Vec<i64> = candidates.iter().map(|c| c.contact_id).collect();
            assert_eq!(ids, vec![200, 201, 202, 203, 204]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert_eq!(store.fuzzy_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resolver_caps_stores_that_ignore_the_limit() {
    let inner = InMemoryAliasStore::new();
    for contact_id in 300..306 {
        inner.add_alias(1, contact_id, "Sasha");
        inner.add_alias(1, contact_id + 100, &format!("sasha {contact_id}"));
    }
    let store = UnlimitedStore(inner);

    match resolve_contact(&store, 1, "sasha").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            assert_eq!(candidates.len(), MAX_CANDIDATES);
            assert!(candidates.iter().all(|c| (300..306).contains(&c.contact_id)));
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    match resolve_contact(&store, 1, "sasha 30").await.unwrap() {
        Resolution::Ambiguous(candidates) => {
            let ids: Vec<i64> = candidates.iter().map(|c| c.contact_id).collect();
            assert_eq!(ids, vec![400, 401, 402, 403, 404]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

//! Tenant model and the directory that owns tenant existence and pending status.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tenancy_common::{TenancyError, TenancyResult, TenantKey};

/// A tenant: identity plus pending flag. Its data store is resolved through
/// [`TenantContext`](crate::TenantContext) by key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub key: TenantKey,
    pub pending: bool,
}

impl Tenant {
    pub fn new(key: impl Into<TenantKey>) -> Self {
        Self {
            key: key.into(),
            pending: false,
        }
    }

    pub fn pending(key: impl Into<TenantKey>) -> Self {
        Self {
            key: key.into(),
            pending: true,
        }
    }
}

/// Tenant selection for a migration run.
#[derive(Clone, Debug, Default)]
pub struct TenantFilter {
    /// Restrict to these keys. `None` selects every tenant.
    pub keys: Option<Vec<TenantKey>>,
    /// Include tenants that are still pending.
    pub with_pending: bool,
}

impl TenantFilter {
    pub fn matches(&self, tenant: &Tenant) -> bool {
        if tenant.pending && !self.with_pending {
            return false;
        }
        match &self.keys {
            Some(keys) => keys.contains(&tenant.key),
            None => true,
        }
    }
}

/// Sole writer of tenant existence and pending status.
///
/// Every call must hit the backing store; callers rely on `count_pending`
/// returning a live value.
pub trait TenantDirectory: Send + Sync {
    /// Provision one new pending tenant.
    fn create_pending(&self) -> TenancyResult<Tenant>;

    /// Number of pending tenants right now.
    fn count_pending(&self) -> TenancyResult<usize>;

    /// Tenants matching `filter`, in creation order.
    fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>>;
}

impl<D: TenantDirectory + ?Sized> TenantDirectory for std::sync::Arc<D> {
    fn create_pending(&self) -> TenancyResult<Tenant> {
        (**self).create_pending()
    }

    fn count_pending(&self) -> TenancyResult<usize> {
        (**self).count_pending()
    }

    fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
        (**self).tenants(filter)
    }
}

struct Entry {
    seq: u64,
    pending: bool,
}

/// Thread-safe in-memory directory.
///
/// Uses `DashMap` so concurrent actors can create and consume pending tenants
/// while a replenishment run is in flight.
pub struct InMemoryDirectory {
    tenants: DashMap<TenantKey, Entry>,
    next_seq: AtomicU64,
    next_key: AtomicU64,
    prefix: String,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::with_prefix("tenant")
    }

    /// Generated pending keys are `{prefix}-{n}`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            tenants: DashMap::new(),
            next_seq: AtomicU64::new(1),
            next_key: AtomicU64::new(1),
            prefix: prefix.into(),
        }
    }

    /// Register an existing tenant. Returns `false` if the key is taken.
    pub fn insert(&self, tenant: Tenant) -> bool {
        use dashmap::mapref::entry::Entry as MapEntry;
        match self.tenants.entry(tenant.key) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(v) => {
                v.insert(Entry {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    pending: tenant.pending,
                });
                true
            }
        }
    }

    /// Assign a pending tenant, taking it out of the pool.
    /// Returns `false` if the tenant is unknown or already active.
    pub fn activate(&self, key: &TenantKey) -> bool {
        match self.tenants.get_mut(key) {
            Some(mut entry) if entry.pending => {
                entry.pending = false;
                true
            }
            _ => false,
        }
    }

    /// Take any one pending tenant out of the pool.
    pub fn claim_pending(&self) -> Option<TenantKey> {
        let key = self
            .tenants
            .iter()
            .filter(|e| e.value().pending)
            .min_by_key(|e| e.value().seq)
            .map(|e| e.key().clone())?;
        self.activate(&key).then_some(key)
    }

    pub fn count(&self) -> usize {
        self.tenants.len()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn create_pending(&self) -> TenancyResult<Tenant> {
        // Keys taken by an explicit insert are skipped.
        for _ in 0..=self.tenants.len() {
            let n = self.next_key.fetch_add(1, Ordering::Relaxed);
            let tenant = Tenant::pending(TenantKey::new(format!("{}-{n}", self.prefix)));
            if self.insert(tenant.clone()) {
                return Ok(tenant);
            }
        }
        Err(TenancyError::Provisioning(format!(
            "no free key with prefix '{}'",
            self.prefix
        )))
    }

    fn count_pending(&self) -> TenancyResult<usize> {
        Ok(self.tenants.iter().filter(|e| e.value().pending).count())
    }

    fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
        let mut selected: Vec<(u64, Tenant)> = self
            .tenants
            .iter()
            .map(|e| {
                (
                    e.value().seq,
                    Tenant {
                        key: e.key().clone(),
                        pending: e.value().pending,
                    },
                )
            })
            .filter(|(_, t)| filter.matches(t))
            .collect();
        selected.sort_by_key(|(seq, _)| *seq);
        Ok(selected.into_iter().map(|(_, t)| t).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(tenants: &[Tenant]) -> Vec<&str> {
        tenants.iter().map(|t| t.key.as_str()).collect()
    }

    #[test]
    fn insert_rejects_duplicate_key() {
        let dir = InMemoryDirectory::new();
        assert!(dir.insert(Tenant::new("a")));
        assert!(!dir.insert(Tenant::new("a")));
        assert_eq!(dir.count(), 1);
    }

    #[test]
    fn create_pending_counts() {
        let dir = InMemoryDirectory::new();
        dir.insert(Tenant::new("active"));
        let t = dir.create_pending().unwrap();
        assert!(t.pending);
        dir.create_pending().unwrap();
        assert_eq!(dir.count_pending().unwrap(), 2);
        assert_eq!(dir.count(), 3);
    }

    #[test]
    fn create_pending_skips_taken_keys() {
        let dir = InMemoryDirectory::with_prefix("p");
        // Pre-occupy the key the next create would generate.
        dir.tenants.insert(
            TenantKey::new("p-1"),
            Entry {
                seq: 0,
                pending: false,
            },
        );
        let t = dir.create_pending().unwrap();
        assert_ne!(t.key.as_str(), "p-1");
        assert_eq!(dir.count_pending().unwrap(), 1);
    }

    #[test]
    fn activate_and_claim() {
        let dir = InMemoryDirectory::new();
        let t = dir.create_pending().unwrap();
        assert!(dir.activate(&t.key));
        assert!(!dir.activate(&t.key));
        assert_eq!(dir.count_pending().unwrap(), 0);
        assert!(dir.claim_pending().is_none());

        let t2 = dir.create_pending().unwrap();
        assert_eq!(dir.claim_pending(), Some(t2.key));
    }

    #[test]
    fn tenants_in_creation_order() {
        let dir = InMemoryDirectory::new();
        for k in ["c", "a", "b"] {
            dir.insert(Tenant::new(k));
        }
        let all = dir.tenants(&TenantFilter::default()).unwrap();
        assert_eq!(keys(&all), vec!["c", "a", "b"]);
    }

    #[test]
    fn filter_excludes_pending_by_default() {
        let dir = InMemoryDirectory::with_prefix("p");
        dir.insert(Tenant::new("a"));
        dir.create_pending().unwrap();

        let without = dir.tenants(&TenantFilter::default()).unwrap();
        assert_eq!(keys(&without), vec!["a"]);

        let with = dir
            .tenants(&TenantFilter {
                keys: None,
                with_pending: true,
            })
            .unwrap();
        assert_eq!(with.len(), 2);
    }

    #[test]
    fn filter_by_keys_ignores_unknown() {
        let dir = InMemoryDirectory::new();
        for k in ["a", "b", "c"] {
            dir.insert(Tenant::new(k));
        }
        let filter = TenantFilter {
            keys: Some(vec![TenantKey::new("c"), TenantKey::new("a"), TenantKey::new("zz")]),
            with_pending: false,
        };
        let selected = dir.tenants(&filter).unwrap();
        assert_eq!(keys(&selected), vec!["a", "c"]);
    }
}

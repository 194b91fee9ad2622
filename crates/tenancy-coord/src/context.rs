//! Active tenant context: which tenant's data store is the current target.

use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashSet;
use tenancy_common::{TenancyError, TenancyResult, TenantKey};

use crate::tenant::Tenant;

/// Switches the active data store for the duration of a callback.
///
/// Implementations must restore the previously active context on every exit
/// path of `f`: success, error, or unwinding panic.
pub trait TenantContext: Send + Sync {
    fn with_active(
        &self,
        tenant: &Tenant,
        f: &mut dyn FnMut() -> TenancyResult<()>,
    ) -> TenancyResult<()>;
}

/// A slot holding the active value, entered through a drop guard.
///
/// Guards must be dropped in reverse order of entry, so a slot serves one
/// worker at a time. Concurrent workers each get their own context.
#[derive(Debug)]
pub struct ScopedSlot<T> {
    current: Mutex<Option<T>>,
}

impl<T> Default for ScopedSlot<T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<T: Clone> ScopedSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }

    /// Make `value` current until the returned guard is dropped.
    pub fn enter(&self, value: T) -> SlotGuard<'_, T> {
        let previous = self.lock().replace(value);
        SlotGuard {
            slot: self,
            previous,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Restores the slot's previous value on drop.
pub struct SlotGuard<'a, T: Clone> {
    slot: &'a ScopedSlot<T>,
    previous: Option<T>,
}

impl<T: Clone> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        *self.slot.lock() = self.previous.take();
    }
}

/// In-memory context keyed by tenant. Stores can be dropped to simulate a
/// database vanishing mid-run.
#[derive(Default)]
pub struct InMemoryContext {
    active: ScopedSlot<TenantKey>,
    missing: DashSet<TenantKey>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently active tenant, if any.
    pub fn active(&self) -> Option<TenantKey> {
        self.active.get()
    }

    /// Make the tenant's data store unavailable.
    pub fn drop_store(&self, key: TenantKey) {
        self.missing.insert(key);
    }
}

impl TenantContext for InMemoryContext {
    fn with_active(
        &self,
        tenant: &Tenant,
        f: &mut dyn FnMut() -> TenancyResult<()>,
    ) -> TenancyResult<()> {
        if self.missing.contains(&tenant.key) {
            return Err(TenancyError::DataStoreMissing {
                tenant: tenant.key.clone(),
            });
        }
        let _guard = self.active.enter(tenant.key.clone());
        f()
    }
}

//! Pending pool replenishment.

use tenancy_common::TenancyResult;
use tracing::{debug, info};

use crate::tenant::TenantDirectory;

/// Drives the pending pool up to a target size.
pub struct PoolReplenisher<'a> {
    directory: &'a dyn TenantDirectory,
}

impl<'a> PoolReplenisher<'a> {
    pub fn new(directory: &'a dyn TenantDirectory) -> Self {
        Self { directory }
    }

    /// Create pending tenants until the live pending count reaches `target`.
    /// Returns the number of tenants this call created.
    ///
    /// The count is re-queried after every creation, so tenants created or
    /// consumed concurrently by other actors are accounted for. A negative
    /// target is treated as zero. Creation errors propagate immediately.
    pub fn replenish(&self, target: i64) -> TenancyResult<usize> {
        info!("Deploying pending tenants.");
        let target = usize::try_from(target).unwrap_or(0);

        let mut current = self.directory.count_pending()?;
        let mut deployed = 0;
        while current < target {
            let tenant = self.directory.create_pending()?;
            deployed += 1;
            debug!(tenant = %tenant.key, "pending tenant created");
            current = self.directory.count_pending()?;
        }

        info!("{deployed} tenants deployed, {target} tenant(s) are ready to be used.");
        Ok(deployed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{InMemoryDirectory, Tenant, TenantFilter};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tenancy_common::TenancyError;

    #[test]
    fn fills_empty_pool() {
        let dir = InMemoryDirectory::new();
        let deployed = PoolReplenisher::new(&dir).replenish(4).unwrap();
        assert_eq!(deployed, 4);
        assert_eq!(dir.count_pending().unwrap(), 4);
    }

    #[test]
    fn tops_up_partial_pool() {
        let dir = InMemoryDirectory::new();
        dir.create_pending().unwrap();
        dir.create_pending().unwrap();
        let deployed = PoolReplenisher::new(&dir).replenish(5).unwrap();
        assert_eq!(deployed, 3);
        assert_eq!(dir.count_pending().unwrap(), 5);
    }

    #[test]
    fn full_pool_is_noop() {
        let dir = InMemoryDirectory::new();
        for _ in 0..3 {
            dir.create_pending().unwrap();
        }
        assert_eq!(PoolReplenisher::new(&dir).replenish(2).unwrap(), 0);
        assert_eq!(PoolReplenisher::new(&dir).replenish(3).unwrap(), 0);
        assert_eq!(dir.count_pending().unwrap(), 3);
    }

    #[test]
    fn negative_and_zero_target() {
        let dir = InMemoryDirectory::new();
        assert_eq!(PoolReplenisher::new(&dir).replenish(-3).unwrap(), 0);
        assert_eq!(PoolReplenisher::new(&dir).replenish(0).unwrap(), 0);
        assert_eq!(dir.count(), 0);
    }

    #[test]
    fn active_tenants_do_not_count() {
        let dir = InMemoryDirectory::new();
        dir.insert(Tenant::new("live-1"));
        dir.insert(Tenant::new("live-2"));
        assert_eq!(PoolReplenisher::new(&dir).replenish(2).unwrap(), 2);
    }

    /// Directory whose pool is drained by another actor on every creation.
    struct Draining {
        inner: InMemoryDirectory,
        drains_left: AtomicUsize,
    }

    impl TenantDirectory for Draining {
        fn create_pending(&self) -> TenancyResult<Tenant> {
            let tenant = self.inner.create_pending()?;
            if self
                .drains_left
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                self.inner.claim_pending();
            }
            Ok(tenant)
        }

        fn count_pending(&self) -> TenancyResult<usize> {
            self.inner.count_pending()
        }

        fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
            self.inner.tenants(filter)
        }
    }

    #[test]
    fn concurrent_consumption_does_not_undershoot() {
        let dir = Draining {
            inner: InMemoryDirectory::new(),
            drains_left: AtomicUsize::new(3),
        };
        let deployed = PoolReplenisher::new(&dir).replenish(4).unwrap();
        assert_eq!(dir.count_pending().unwrap(), 4);
        assert_eq!(deployed, 7);
    }

    /// Directory where another actor also creates a pending tenant each round.
    struct Racing {
        inner: InMemoryDirectory,
    }

    impl TenantDirectory for Racing {
        fn create_pending(&self) -> TenancyResult<Tenant> {
            self.inner.create_pending()?;
            self.inner.create_pending()
        }

        fn count_pending(&self) -> TenancyResult<usize> {
            self.inner.count_pending()
        }

        fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
            self.inner.tenants(filter)
        }
    }

    #[test]
    fn concurrent_creation_limits_overshoot() {
        let dir = Racing {
            inner: InMemoryDirectory::new(),
        };
        let deployed = PoolReplenisher::new(&dir).replenish(4).unwrap();
        assert_eq!(deployed, 2);
        assert_eq!(dir.count_pending().unwrap(), 4);
    }

    struct Broken {
        created: AtomicUsize,
    }

    impl TenantDirectory for Broken {
        fn create_pending(&self) -> TenancyResult<Tenant> {
            if self.created.fetch_add(1, Ordering::Relaxed) >= 1 {
                return Err(TenancyError::Provisioning("database unreachable".into()));
            }
            Ok(Tenant::pending("first"))
        }

        fn count_pending(&self) -> TenancyResult<usize> {
            Ok(self.created.load(Ordering::Relaxed).min(1))
        }

        fn tenants(&self, _filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn provisioning_failure_is_not_retried() {
        let dir = Broken {
            created: AtomicUsize::new(0),
        };
        let err = PoolReplenisher::new(&dir).replenish(3).unwrap_err();
        assert!(matches!(err, TenancyError::Provisioning(_)));
        assert_eq!(dir.created.load(Ordering::Relaxed), 2);
    }

    proptest! {
        #[test]
        fn pool_converges_to_target(initial in 0usize..20, target in -5i64..30) {
            let dir = InMemoryDirectory::new();
            for _ in 0..initial {
                dir.create_pending().unwrap();
            }
            // Active tenants never count towards the pool.
            dir.insert(Tenant::new("active"));

            let deployed = PoolReplenisher::new(&dir).replenish(target).unwrap();
            let wanted = usize::try_from(target).unwrap_or(0);
            prop_assert_eq!(deployed, wanted.saturating_sub(initial));
            prop_assert_eq!(dir.count_pending().unwrap(), initial.max(wanted));
        }
    }
}

//! File-backed tenant directory and data store context.
//!
//! Layout in the workspace root:
//!   tenants.json   : every tenant with its pending flag, in creation order
//!   stores/<key>/  : the tenant's data store

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tenancy_common::{TenancyError, TenancyResult, TenantKey};
use tenancy_coord::{ScopedSlot, Tenant, TenantContext, TenantDirectory, TenantFilter};
use tracing::debug;

const TENANTS_FILE: &str = "tenants.json";
const STORES_DIR: &str = "stores";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TenantsFile {
    tenants: Vec<Tenant>,
}

/// Tenant directory persisted in `tenants.json`.
///
/// Every operation reopens and locks the file, so several processes can
/// create and consume pending tenants against the same workspace.
pub struct FileDirectory {
    root: PathBuf,
}

impl FileDirectory {
    pub fn open(root: &Path) -> TenancyResult<Self> {
        fs::create_dir_all(root.join(STORES_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn stores_dir(&self) -> PathBuf {
        self.root.join(STORES_DIR)
    }

    /// Run `f` on the file contents under a lock. `f` returns its result and
    /// whether the contents must be written back.
    fn locked<T>(
        &self,
        exclusive: bool,
        f: impl FnOnce(&mut TenantsFile) -> TenancyResult<(T, bool)>,
    ) -> TenancyResult<T> {
        let path = self.root.join(TENANTS_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }

        let result = Self::read(&mut file, &path).and_then(|mut data| {
            let (value, dirty) = f(&mut data)?;
            if dirty {
                Self::write(&mut file, &data)?;
            }
            Ok(value)
        });
        // Closing the file releases the lock.
        drop(file);
        result
    }

    fn read(file: &mut File, path: &Path) -> TenancyResult<TenantsFile> {
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Ok(TenantsFile::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            TenancyError::Unclassified(format!("cannot parse '{}': {e}", path.display()))
        })
    }

    fn write(file: &mut File, data: &TenantsFile) -> TenancyResult<()> {
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| TenancyError::Unclassified(format!("cannot encode tenants: {e}")))?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&json)?;
        file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
impl FileDirectory {
    /// Register an existing, already provisioned tenant.
    pub fn insert(&self, tenant: Tenant) -> TenancyResult<bool> {
        self.locked(true, |data| {
            if data.tenants.iter().any(|t| t.key == tenant.key) {
                return Ok((false, false));
            }
            data.tenants.push(tenant);
            Ok((true, true))
        })
    }

    /// Mark a pending tenant as assigned.
    pub fn activate(&self, key: &TenantKey) -> TenancyResult<bool> {
        self.locked(true, |data| {
            match data.tenants.iter_mut().find(|t| &t.key == key && t.pending) {
                Some(tenant) => {
                    tenant.pending = false;
                    Ok((true, true))
                }
                None => Ok((false, false)),
            }
        })
    }
}

impl TenantDirectory for FileDirectory {
    fn create_pending(&self) -> TenancyResult<Tenant> {
        let tenant = Tenant::pending(TenantKey::new(uuid::Uuid::new_v4().to_string()));
        let store = self.stores_dir().join(tenant.key.as_str());
        fs::create_dir_all(&store).map_err(|e| {
            TenancyError::Provisioning(format!(
                "cannot create data store '{}': {e}",
                store.display()
            ))
        })?;

        let inserted = self.locked(true, |data| {
            data.tenants.push(tenant.clone());
            Ok(((), true))
        });
        if let Err(e) = inserted {
            let _ = fs::remove_dir_all(&store);
            return Err(TenancyError::Provisioning(e.to_string()));
        }

        debug!(tenant = %tenant.key, "data store provisioned");
        Ok(tenant)
    }

    fn count_pending(&self) -> TenancyResult<usize> {
        self.locked(false, |data| {
            Ok((data.tenants.iter().filter(|t| t.pending).count(), false))
        })
    }

    fn tenants(&self, filter: &TenantFilter) -> TenancyResult<Vec<Tenant>> {
        self.locked(false, |data| {
            let selected = data
                .tenants
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect();
            Ok((selected, false))
        })
    }
}

/// Data store currently targeted by the migration command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveStore {
    pub key: TenantKey,
    pub path: PathBuf,
}

/// Activates `stores/<key>` for the duration of a callback.
pub struct StoreContext {
    stores: PathBuf,
    active: ScopedSlot<ActiveStore>,
}

impl StoreContext {
    pub fn new(stores: PathBuf) -> Self {
        Self {
            stores,
            active: ScopedSlot::new(),
        }
    }

    pub fn active(&self) -> Option<ActiveStore> {
        self.active.get()
    }
}

impl TenantContext for StoreContext {
    fn with_active(
        &self,
        tenant: &Tenant,
        f: &mut dyn FnMut() -> TenancyResult<()>,
    ) -> TenancyResult<()> {
        let path = self.stores.join(tenant.key.as_str());
        if !path.is_dir() {
            return Err(TenancyError::DataStoreMissing {
                tenant: tenant.key.clone(),
            });
        }
        let _guard = self.active.enter(ActiveStore {
            key: tenant.key.clone(),
            path,
        });
        f()
    }
}

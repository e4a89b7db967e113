//! Per-tenant serialization of compose operations

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive access to one tenant's compose project
pub type TenantGuard = OwnedMutexGuard<()>;

/// One async mutex per server id. Compose runs for the same project must
/// not overlap; runs for different servers proceed in parallel.
#[derive(Debug, Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `server_id`
    pub async fn acquire(&self, server_id: &str) -> TenantGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(server_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a decommissioned server
    pub fn forget(&self, server_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(server_id);
    }
}

//! Mountpoint table
//!
//! The process-scoped registry of every live [`MountState`]. It is created
//! once by the server, shared as `Arc<MountpointTable>`, and torn down with
//! [`MountpointTable::shutdown`]. All access to mountpoints goes through it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::session::CloseReason;
use crate::stats::MountStats;

use super::config::MountConfig;
use super::mount::MountState;

/// Central table of mountpoints
///
/// Each mountpoint locks independently; the table lock is only taken to
/// look up, insert or remove entries.
pub struct MountpointTable {
    /// Map of mountpoint name to state
    mounts: RwLock<HashMap<String, Arc<MountState>>>,

    /// Configuration for mounts created without an explicit one
    default_config: MountConfig,
}

impl MountpointTable {
    /// Create a table using the default mount configuration
    pub fn new() -> Self {
        Self::with_config(MountConfig::default())
    }

    /// Create a table with a custom default mount configuration
    pub fn with_config(default_config: MountConfig) -> Self {
        Self {
            mounts: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Configuration used by [`get_or_create`](Self::get_or_create)
    pub fn default_config(&self) -> &MountConfig {
        &self.default_config
    }

    /// Look up `name`, creating it with the default configuration if absent
    pub async fn get_or_create(&self, name: &str) -> Arc<MountState> {
        self.get_or_create_with(name, &self.default_config).await
    }

    /// Look up `name`, creating it with `config` if absent
    ///
    /// Idempotent: an existing mount keeps the configuration it was created
    /// with.
    pub async fn get_or_create_with(&self, name: &str, config: &MountConfig) -> Arc<MountState> {
        if let Some(mount) = self.mounts.read().await.get(name) {
            return Arc::clone(mount);
        }

        let mut mounts = self.mounts.write().await;
        let mount = mounts.entry(name.to_owned()).or_insert_with(|| {
            tracing::debug!(mount = %name, "Mountpoint created");
            Arc::new(MountState::new(name, config.clone()))
        });
        Arc::clone(mount)
    }

    /// Look up a mountpoint
    pub async fn lookup(&self, name: &str) -> Option<Arc<MountState>> {
        self.mounts.read().await.get(name).cloned()
    }

    /// Remove `name` if it has no producer and no subscribers
    ///
    /// Returns true if the mount was removed. A busy mount is left alone.
    pub async fn remove(&self, name: &str) -> bool {
        let mut mounts = self.mounts.write().await;

        let removable = match mounts.get(name) {
            Some(mount) => mount.retire_if_empty(),
            None => return false,
        };

        if removable {
            mounts.remove(name);
            tracing::debug!(mount = %name, "Mountpoint removed");
        }
        removable
    }

    /// Names of all mountpoints
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.mounts.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics for every mountpoint, sorted by name
    pub async fn snapshot(&self) -> Vec<MountStats> {
        let mounts: Vec<_> = self.mounts.read().await.values().cloned().collect();
        let mut stats: Vec<_> = mounts.iter().map(|m| m.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Total number of mountpoints
    pub async fn mount_count(&self) -> usize {
        self.mounts.read().await.len()
    }

    /// Run one maintenance pass
    ///
    /// Closes subscribers that sat idle without a source for longer than
    /// their mount's timeout, then removes mounts that are left empty.
    pub async fn sweep(&self) -> usize {
        let now = tokio::time::Instant::now();
        let mounts: Vec<_> = self.mounts.read().await.values().cloned().collect();

        for mount in &mounts {
            mount.expire_idle(now);
        }

        let mut removed = 0;
        let mut table = self.mounts.write().await;
        table.retain(|name, mount| {
            if mount.retire_if_empty() {
                tracing::debug!(mount = %name, "Mountpoint removed by sweep");
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Spawn the periodic sweep task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let table = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                table.sweep().await;
            }
        })
    }

    /// Tear down every mountpoint
    ///
    /// Producers are cancelled and subscribers drained; the table is empty
    /// afterwards.
    pub async fn shutdown(&self) {
        let mounts: Vec<_> = self.mounts.write().await.drain().collect();

        for (name, mount) in mounts {
            mount.retire(CloseReason::Shutdown);
            tracing::debug!(mount = %name, "Mountpoint shut down");
        }
    }
}

impl Default for MountpointTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registry::MountError;
    use crate::session::{SessionPhase, SubscriberSession};

    #[tokio::test]
    async fn test_get_or_create_idempotent() {
        let table = MountpointTable::new();

        let a = table.get_or_create("RTCM3").await;
        let b = table.get_or_create("RTCM3").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.mount_count().await, 1);
        assert!(table.lookup("RTCM3").await.is_some());
        assert!(table.lookup("OTHER").await.is_none());
    }

    #[tokio::test]
    async fn test_existing_mount_keeps_config() {
        let table = MountpointTable::new();
        let custom = MountConfig::default().ring_capacity(1);

        table.get_or_create("RTCM3").await;
        let mount = table.get_or_create_with("RTCM3", &custom).await;

        assert_eq!(mount.config().ring_capacity, MountConfig::default().ring_capacity);
    }

    #[tokio::test]
    async fn test_remove_only_when_empty() {
        let table = MountpointTable::new();
        let mount = table.get_or_create("RTCM3").await;

        let guard = mount.attach_producer(1).unwrap();
        assert!(!table.remove("RTCM3").await);
        assert!(table.lookup("RTCM3").await.is_some());

        drop(guard);
        assert!(table.remove("RTCM3").await);
        assert!(table.lookup("RTCM3").await.is_none());
        assert!(!table.remove("RTCM3").await);
    }

    #[tokio::test]
    async fn test_removed_mount_is_retired() {
        let table = MountpointTable::new();
        let stale = table.get_or_create("RTCM3").await;
        assert!(table.remove("RTCM3").await);

        // A caller holding the old state is sent back to the table
        assert!(matches!(stale.attach_producer(1), Err(MountError::Retired(_))));

        let fresh = table.get_or_create("RTCM3").await;
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.attach_producer(1).is_ok());
    }

    #[tokio::test]
    async fn test_sweep_removes_empty_and_keeps_busy() {
        let table = MountpointTable::new();
        table.get_or_create("EMPTY").await;
        let busy = table.get_or_create("BUSY").await;
        let _guard = busy.attach_producer(1).unwrap();

        assert_eq!(table.sweep().await, 1);
        assert_eq!(table.names().await, vec!["BUSY".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_subscribers() {
        let config = MountConfig::default().subscriber_idle_timeout(Duration::ZERO);
        let table = MountpointTable::with_config(config.clone());
        let mount = table.get_or_create("RTCM3").await;

        let sub = Arc::new(SubscriberSession::new(5, "RTCM3", &config));
        sub.activate();
        mount.attach_subscriber(&sub).unwrap();

        table.sweep().await;
        assert_eq!(sub.phase(), SessionPhase::Draining);
        // Subscriber set is now empty, so the mount went with it
        assert!(table.lookup("RTCM3").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let table = MountpointTable::new();
        let b = table.get_or_create("B").await;
        table.get_or_create("A").await;

        let guard = b.attach_producer(1).unwrap();
        guard.publish(Bytes::from_static(b"xyz")).unwrap();

        let stats = table.snapshot().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "A");
        assert_eq!(stats[1].name, "B");
        assert_eq!(stats[1].bytes_in, 3);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_producers() {
        let table = MountpointTable::new();
        let mount = table.get_or_create("RTCM3").await;
        let guard = mount.attach_producer(1).unwrap();

        table.shutdown().await;

        assert!(guard.is_cancelled());
        assert_eq!(table.mount_count().await, 0);
    }
}

//! Typed read/write of model znodes at `/models/{warming,active,cooling}/{id}`
//! and the control plane's own presence entry (spec.md §4.2 "Discovery Store
//! Adapter").
//!
//! The teacher has no direct ZooKeeper client (`raftcat` instead watches k8s
//! CRDs via `kube::runtime::Reflector`); per spec.md §3/§6 the discovery
//! store here really is a ZooKeeper-style hierarchical znode store, so this
//! wraps the synchronous `zookeeper` crate in `tokio::task::spawn_blocking`
//! (SPEC_FULL.md §10.7), matching the teacher's habit of keeping I/O behind
//! a small typed struct rather than exposed as raw client calls.

use std::sync::Arc;
use std::time::Duration;

use zookeeper::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZooKeeper};

use deployer_core::{Config, DeploymentRecord, LifecycleState};

use crate::{Error, ErrorKind, Result};

struct NoopWatcher;
impl Watcher for NoopWatcher {
    fn handle(&self, _event: WatchedEvent) {}
}

/// Thin typed wrapper around a ZooKeeper session. `Clone` is cheap (an
/// `Arc` bump) so `deployerd` can share one session between the
/// `Orchestrator`'s boxed `StoreApi` and its presence-heartbeat task.
#[derive(Clone)]
pub struct DiscoveryStore {
    zk: Arc<ZooKeeper>,
}

impl DiscoveryStore {
    pub fn connect(cfg: &Config) -> Result<Self> {
        let hosts = cfg.discovery_hosts_csv();
        let zk = ZooKeeper::connect(&hosts, Duration::from_secs(15), NoopWatcher)
            .map_err(|e| Error::from(ErrorKind::ZooKeeper(e)))?;
        Ok(DiscoveryStore { zk: Arc::new(zk) })
    }

    fn model_path(state: LifecycleState, id: &str) -> String {
        format!("/models/{}/{}", state.path_segment(), id)
    }

    async fn ensure_parent(zk: Arc<ZooKeeper>, path: String) -> Result<()> {
        tokio::task::spawn_blocking(move || {
            let mut prefix = String::new();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                prefix.push('/');
                prefix.push_str(segment);
                match zk.exists(&prefix, false) {
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        match zk.create(&prefix, vec![], Acl::open_unsafe().clone(), CreateMode::Persistent) {
                            Ok(_) | Err(ZkError::NodeExists) => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
        .await
        .expect("blocking task panicked")
        .map_err(|e| ErrorKind::ZooKeeper(e).into())
    }

    /// Idempotent create-or-set of `/models/{state}/{id}` (spec.md §4.2 `put`).
    pub async fn put(&self, state: LifecycleState, id: &str, payload: &DeploymentRecord) -> Result<()> {
        let path = Self::model_path(state, id);
        let parent = path.rsplitn(2, '/').nth(1).unwrap_or("").to_string();
        if !parent.is_empty() {
            Self::ensure_parent(self.zk.clone(), parent).await?;
        }
        let data = serde_json::to_vec(payload)?;
        let zk = self.zk.clone();
        let path_for_task = path.clone();
        let result = tokio::task::spawn_blocking(move || match zk.create(&path_for_task, data.clone(), Acl::open_unsafe().clone(), CreateMode::Persistent) {
            Ok(_) => Ok(()),
            Err(ZkError::NodeExists) => zk.set_data(&path_for_task, data, None).map(|_| ()),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked");
        result.map_err(|e| ErrorKind::ZooKeeper(e).into())
    }

    /// Delete `/models/{state}/{id}` if present; missing is not an error
    /// (spec.md §4.2 `remove`).
    pub async fn remove(&self, state: LifecycleState, id: &str) -> Result<()> {
        let path = Self::model_path(state, id);
        let zk = self.zk.clone();
        let result = tokio::task::spawn_blocking(move || match zk.delete(&path, None) {
            Ok(()) | Err(ZkError::NoNode) => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked");
        result.map_err(|e| ErrorKind::ZooKeeper(e).into())
    }

    /// Returns the payload at `/models/{state}/{id}`, tolerating the legacy
    /// bare-IP format on decode failure (spec.md §4.2 `get`, §8 scenario 6).
    pub async fn get(&self, state: LifecycleState, id: &str) -> Result<Option<DeploymentRecord>> {
        let path = Self::model_path(state, id);
        let zk = self.zk.clone();
        let result = tokio::task::spawn_blocking(move || match zk.get_data(&path, false) {
            Ok((data, _)) => Ok(Some(data)),
            Err(ZkError::NoNode) => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked")
        .map_err(|e| Error::from(ErrorKind::ZooKeeper(e)))?;
        Ok(result.map(|raw| DeploymentRecord::decode(&raw)))
    }

    /// Returns all `(id, payload)` under `state` (spec.md §4.2 `list`).
    pub async fn list(&self, state: LifecycleState) -> Result<Vec<(String, DeploymentRecord)>> {
        let dir = format!("/models/{}", state.path_segment());
        let zk = self.zk.clone();
        let ids = tokio::task::spawn_blocking(move || match zk.get_children(&dir, false) {
            Ok(ids) => Ok(ids),
            Err(ZkError::NoNode) => Ok(vec![]),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked")
        .map_err(|e| Error::from(ErrorKind::ZooKeeper(e)))?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rec) = self.get(state, &id).await? {
                out.push((id, rec));
            }
        }
        Ok(out)
    }

    /// Registers the control plane's own presence at `path` with body
    /// `host:port` (spec.md §4.2/§6). Ephemeral so it disappears if this
    /// process dies without a clean shutdown.
    pub async fn register_service(&self, path: &str, host_port: &str) -> Result<()> {
        Self::ensure_parent(self.zk.clone(), path.rsplitn(2, '/').nth(1).unwrap_or("").to_string()).await?;
        let zk = self.zk.clone();
        let path = path.to_string();
        let data = host_port.as_bytes().to_vec();
        let result = tokio::task::spawn_blocking(move || match zk.create(&path, data.clone(), Acl::open_unsafe().clone(), CreateMode::Ephemeral) {
            Ok(_) => Ok(()),
            Err(ZkError::NodeExists) => zk.set_data(&path, data, None).map(|_| ()),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked");
        result.map_err(|e| ErrorKind::ZooKeeper(e).into())
    }

    pub async fn clear_service(&self, path: &str) -> Result<()> {
        let zk = self.zk.clone();
        let path = path.to_string();
        let result = tokio::task::spawn_blocking(move || match zk.delete(&path, None) {
            Ok(()) | Err(ZkError::NoNode) => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .expect("blocking task panicked");
        result.map_err(|e| ErrorKind::ZooKeeper(e).into())
    }
}

#[async_trait::async_trait]
impl crate::traits::StoreApi for DiscoveryStore {
    async fn put(&self, state: LifecycleState, id: &str, payload: &DeploymentRecord) -> Result<()> {
        DiscoveryStore::put(self, state, id, payload).await
    }
    async fn remove(&self, state: LifecycleState, id: &str) -> Result<()> {
        DiscoveryStore::remove(self, state, id).await
    }
    async fn get(&self, state: LifecycleState, id: &str) -> Result<Option<DeploymentRecord>> {
        DiscoveryStore::get(self, state, id).await
    }
    async fn list(&self, state: LifecycleState) -> Result<Vec<(String, DeploymentRecord)>> {
        DiscoveryStore::list(self, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_uses_state_segment() {
        assert_eq!(DiscoveryStore::model_path(LifecycleState::Warming, "A"), "/models/warming/A");
        assert_eq!(DiscoveryStore::model_path(LifecycleState::Active, "A"), "/models/active/A");
        assert_eq!(DiscoveryStore::model_path(LifecycleState::Cooling, "A"), "/models/cooling/A");
    }
}

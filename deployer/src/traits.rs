//! Trait seams for the Orchestrator's collaborators.
//!
//! The saga (spec.md §4.7) is the thing worth testing without a live cluster
//! or ZooKeeper ensemble; spec.md §8's concrete scenarios (no-fit, readiness
//! timeout, rollback on LB failure, stop rollback, legacy znode read) are
//! all properties of the Orchestrator's control flow, not of any one
//! collaborator's I/O. Each collaborator that does real I/O gets a trait
//! here so `Orchestrator` can be built against fakes in tests
//! (SPEC_FULL.md §10.5 "hand-built fakes for the collaborator traits") and
//! against the live structs in `deployer`/`deployer_api`'s binaries.
//!
//! `PlacementEngine` has no trait: it is already pure (spec.md §4.3 only
//! reads a `PoolInventory` value), so tests exercise it directly instead of
//! faking it.

use std::time::Duration;

use async_trait::async_trait;

use deployer_core::{DeploymentRecord, LifecycleState, PoolInventory};

use crate::Result;

/// spec.md §4.2 "Discovery Store Adapter".
#[async_trait]
pub trait StoreApi: Send + Sync {
    async fn put(&self, state: LifecycleState, id: &str, payload: &DeploymentRecord) -> Result<()>;
    async fn remove(&self, state: LifecycleState, id: &str) -> Result<()>;
    async fn get(&self, state: LifecycleState, id: &str) -> Result<Option<DeploymentRecord>>;
    async fn list(&self, state: LifecycleState) -> Result<Vec<(String, DeploymentRecord)>>;
}

/// spec.md §4.4 "Manifest Service".
#[async_trait]
pub trait ManifestsApi: Send + Sync {
    async fn fetch_manifest(&self, model_name: &str) -> Result<String>;
    async fn apply(&self, model_id: &str, model_name: &str) -> Result<()>;
    async fn remove(&self, model_name: &str) -> Result<()>;
}

/// spec.md §4.5 "Exposure Layer".
#[async_trait]
pub trait ExposureApi: Send + Sync {
    async fn create_load_balancer(&self, model_name: &str) -> Result<()>;
    async fn remove_load_balancer(&self, model_name: &str) -> Result<()>;
    async fn get_external_address(&self, model_name: &str, timeout: Duration) -> Result<Option<String>>;
    async fn create_external_name(&self, model_name: &str, lb_ip: &str) -> Result<()>;
    async fn remove_external_name(&self, model_name: &str) -> Result<()>;
    async fn create_ingress(&self, model_name: &str, host: &str) -> Result<()>;
    async fn remove_ingress(&self, model_name: &str) -> Result<()>;
}

/// spec.md §4.6 "Readiness Gate".
#[async_trait]
pub trait ReadinessApi: Send + Sync {
    async fn wait(&self, exposure: &dyn ExposureApi, model_name: &str) -> Result<bool>;
}

/// spec.md §4.8 "Resource Inventory" (the admission-relevant half; `residents()`
/// is read separately by the CLI/HTTP surface and has no saga dependency).
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn snapshot(&self) -> Result<PoolInventory>;
}

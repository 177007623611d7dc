//! Saga-level tests for the Lifecycle Orchestrator, driven against
//! hand-built fakes for each collaborator trait rather than a live cluster
//! or ZooKeeper ensemble (SPEC_FULL.md §10.5). These exercise the concrete
//! end-to-end scenarios of spec.md §8.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use deployer::traits::{ExposureApi, InventoryApi, ManifestsApi, ReadinessApi, StoreApi};
use deployer::{Error, ErrorKind, ModelRequest, Orchestrator, PlacementEngine, Result};
use deployer_core::pool::{GpuSpec, NodeResourceStat, PoolConfig, PoolSnapshot};
use deployer_core::{DeploymentRecord, LifecycleState, PoolInventory, ResourceAsk};

const ISVC_2CPU_8GI_1GPU: &str = r#"
kind: InferenceService
metadata:
  name: alpha
spec:
  predictor:
    containers:
    - name: predictor
      resources:
        requests:
          cpu: "2"
          memory: "8Gi"
          nvidia.com/gpu: "1"
        limits:
          cpu: "2"
          memory: "8Gi"
          nvidia.com/gpu: "1"
"#;

#[derive(Default)]
struct FakeStore {
    inner: Mutex<HashMap<(&'static str, String), DeploymentRecord>>,
}

#[async_trait]
impl StoreApi for FakeStore {
    async fn put(&self, state: LifecycleState, id: &str, payload: &DeploymentRecord) -> Result<()> {
        self.inner.lock().unwrap().insert((state.path_segment(), id.to_string()), payload.clone());
        Ok(())
    }
    async fn remove(&self, state: LifecycleState, id: &str) -> Result<()> {
        self.inner.lock().unwrap().remove(&(state.path_segment(), id.to_string()));
        Ok(())
    }
    async fn get(&self, state: LifecycleState, id: &str) -> Result<Option<DeploymentRecord>> {
        Ok(self.inner.lock().unwrap().get(&(state.path_segment(), id.to_string())).cloned())
    }
    async fn list(&self, state: LifecycleState) -> Result<Vec<(String, DeploymentRecord)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .iter()
            .filter(|((s, _), _)| *s == state.path_segment())
            .map(|((_, id), rec)| (id.clone(), rec.clone()))
            .collect())
    }
}

#[derive(Default)]
struct FakeManifests {
    yaml: String,
    fail_apply: bool,
    fail_remove: bool,
}

#[async_trait]
impl ManifestsApi for FakeManifests {
    async fn fetch_manifest(&self, _model_name: &str) -> Result<String> {
        Ok(self.yaml.clone())
    }
    async fn apply(&self, _model_id: &str, _model_name: &str) -> Result<()> {
        if self.fail_apply {
            return Err(Error::from(ErrorKind::Core(deployer_core::ErrorKind::TransientAPI("manifest apply failed".into()))));
        }
        Ok(())
    }
    async fn remove(&self, _model_name: &str) -> Result<()> {
        if self.fail_remove {
            return Err(Error::from(ErrorKind::Core(deployer_core::ErrorKind::TransientAPI("manifest remove failed".into()))));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeExposure {
    fail_create_lb: bool,
    lb_ip: String,
    removed: Mutex<Vec<String>>,
}

#[async_trait]
impl ExposureApi for FakeExposure {
    async fn create_load_balancer(&self, _model_name: &str) -> Result<()> {
        if self.fail_create_lb {
            return Err(Error::from(ErrorKind::Core(deployer_core::ErrorKind::TransientAPI("lb create failed".into()))));
        }
        Ok(())
    }
    async fn remove_load_balancer(&self, model_name: &str) -> Result<()> {
        self.removed.lock().unwrap().push(format!("lb:{}", model_name));
        Ok(())
    }
    async fn get_external_address(&self, _model_name: &str, _timeout: Duration) -> Result<Option<String>> {
        Ok(Some(self.lb_ip.clone()))
    }
    async fn create_external_name(&self, _model_name: &str, _lb_ip: &str) -> Result<()> {
        Ok(())
    }
    async fn remove_external_name(&self, model_name: &str) -> Result<()> {
        self.removed.lock().unwrap().push(format!("external:{}", model_name));
        Ok(())
    }
    async fn create_ingress(&self, _model_name: &str, _host: &str) -> Result<()> {
        Ok(())
    }
    async fn remove_ingress(&self, model_name: &str) -> Result<()> {
        self.removed.lock().unwrap().push(format!("ingress:{}", model_name));
        Ok(())
    }
}

struct FakeReadiness {
    ready: bool,
}

#[async_trait]
impl ReadinessApi for FakeReadiness {
    async fn wait(&self, _exposure: &dyn ExposureApi, _model_name: &str) -> Result<bool> {
        Ok(self.ready)
    }
}

struct FakeInventory {
    snapshot: PoolInventory,
}

#[async_trait]
impl InventoryApi for FakeInventory {
    async fn snapshot(&self) -> Result<PoolInventory> {
        Ok(PoolInventory { pools: self.snapshot.pools.clone() })
    }
}

fn pool_with_headroom(name: &str, cpu: f64, mem_gib: f64, gpu: u32) -> PoolSnapshot {
    let config = PoolConfig {
        labels: Default::default(),
        machine_type: "n1-standard-8".into(),
        instances: 1,
        gpu: if gpu > 0 { Some(GpuSpec { gpu_type: "nvidia-tesla-t4".into(), count: gpu }) } else { None },
    };
    let node = NodeResourceStat {
        capacity: ResourceAsk { cpu_cores: cpu, mem_gib, gpu_count: gpu },
        allocatable: ResourceAsk { cpu_cores: cpu, mem_gib, gpu_count: gpu },
        used: ResourceAsk::default(),
    };
    PoolSnapshot::new(name, config, vec![node])
}

fn request() -> ModelRequest {
    ModelRequest {
        model_id: "A".into(),
        model_name: "alpha".into(),
        model_repo_id: "org/alpha".into(),
        model_type: "text-generation".into(),
        cross_cluster: false,
        ingress_host: None,
    }
}

/// spec.md §8 scenario 1: happy path start.
#[tokio::test]
async fn happy_path_start_promotes_to_active() {
    let orchestrator = Orchestrator::new(
        Box::new(FakeStore::default()),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: false }),
        Box::new(FakeExposure { lb_ip: "10.0.0.5".into(), ..Default::default() }),
        Box::new(FakeReadiness { ready: true }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![pool_with_headroom("t4", 14.0, 48.0, 1)] } }),
    );

    let outcome = orchestrator.start(&request()).await.unwrap();
    assert_eq!(outcome.ip, "10.0.0.5:80");
    assert!(!outcome.degraded);

    let active = orchestrator.store.get(LifecycleState::Active, "A").await.unwrap().unwrap();
    assert_eq!(active.ip, "10.0.0.5:80");
    assert!(orchestrator.store.get(LifecycleState::Warming, "A").await.unwrap().is_none());
}

/// spec.md §8 scenario 2: no-fit aborts before any mutation.
#[tokio::test]
async fn no_fit_aborts_before_any_mutation() {
    let orchestrator = Orchestrator::new(
        Box::new(FakeStore::default()),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: false }),
        Box::new(FakeExposure { lb_ip: "10.0.0.5".into(), ..Default::default() }),
        Box::new(FakeReadiness { ready: true }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![pool_with_headroom("t4", 1.0, 2.0, 1)] } }),
    );

    let err = orchestrator.start(&request()).await.unwrap_err();
    assert!(err.to_string().contains("no pool fits") || err.to_string().contains("NoFit"));
    assert!(orchestrator.store.get(LifecycleState::Warming, "A").await.unwrap().is_none());
    assert!(orchestrator.store.get(LifecycleState::Active, "A").await.unwrap().is_none());
}

/// spec.md §8 scenario 3: readiness timeout promotes with degraded=true
/// (SPEC_FULL.md §12 Open Question 1's resolution).
#[tokio::test]
async fn readiness_timeout_promotes_degraded() {
    let orchestrator = Orchestrator::new(
        Box::new(FakeStore::default()),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: false }),
        Box::new(FakeExposure { lb_ip: "10.0.0.5".into(), ..Default::default() }),
        Box::new(FakeReadiness { ready: false }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![pool_with_headroom("t4", 14.0, 48.0, 1)] } }),
    );

    let outcome = orchestrator.start(&request()).await.unwrap();
    assert!(outcome.degraded);
    let active = orchestrator.store.get(LifecycleState::Active, "A").await.unwrap().unwrap();
    assert_eq!(active.ip, "10.0.0.5:80");
}

/// spec.md §8 scenario 4: apply succeeds, LB create fails -> compensation
/// removes the inference service and the warming znode; no residual state.
#[tokio::test]
async fn lb_failure_triggers_compensation() {
    let orchestrator = Orchestrator::new(
        Box::new(FakeStore::default()),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: false }),
        Box::new(FakeExposure { fail_create_lb: true, ..Default::default() }),
        Box::new(FakeReadiness { ready: true }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![pool_with_headroom("t4", 14.0, 48.0, 1)] } }),
    );

    let err = orchestrator.start(&request()).await.unwrap_err();
    assert!(err.to_string().contains("transient"), "unexpected error: {}", err);
    assert!(orchestrator.store.get(LifecycleState::Warming, "A").await.unwrap().is_none());
    assert!(orchestrator.store.get(LifecycleState::Active, "A").await.unwrap().is_none());
}

/// spec.md §8 scenario 5: stop rollback restores the original active record
/// when cluster teardown fails mid-flight.
#[tokio::test]
async fn stop_restores_original_state_on_teardown_failure() {
    let store = FakeStore::default();
    let original = DeploymentRecord::new("10.0.0.9:80", "beta", "text-generation", "org/beta");
    store.put(LifecycleState::Active, "B", &original).await.unwrap();

    let orchestrator = Orchestrator::new(
        Box::new(store),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: true }),
        Box::new(FakeExposure::default()),
        Box::new(FakeReadiness { ready: true }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![] } }),
    );

    let err = orchestrator.stop("B", "beta").await.unwrap_err();
    assert!(err.to_string().contains("transient"), "unexpected error: {}", err);

    let restored = orchestrator.store.get(LifecycleState::Active, "B").await.unwrap().unwrap();
    assert_eq!(restored, original);
    assert!(orchestrator.store.get(LifecycleState::Cooling, "B").await.unwrap().is_none());
}

/// spec.md §8 scenario: Start -> Stop -> Start leaves the system as if a
/// single Start had run.
#[tokio::test]
async fn start_stop_start_is_idempotent_overall() {
    let orchestrator = Orchestrator::new(
        Box::new(FakeStore::default()),
        Box::new(FakeManifests { yaml: ISVC_2CPU_8GI_1GPU.into(), fail_apply: false, fail_remove: false }),
        Box::new(FakeExposure { lb_ip: "10.0.0.5".into(), ..Default::default() }),
        Box::new(FakeReadiness { ready: true }),
        PlacementEngine::new(true),
        Box::new(FakeInventory { snapshot: PoolInventory { pools: vec![pool_with_headroom("t4", 14.0, 48.0, 1)] } }),
    );

    orchestrator.start(&request()).await.unwrap();
    orchestrator.stop("A", "alpha").await.unwrap();
    let outcome = orchestrator.start(&request()).await.unwrap();
    assert!(!outcome.degraded);

    assert!(orchestrator.store.get(LifecycleState::Warming, "A").await.unwrap().is_none());
    assert!(orchestrator.store.get(LifecycleState::Cooling, "A").await.unwrap().is_none());
    assert!(orchestrator.store.get(LifecycleState::Active, "A").await.unwrap().is_some());
}

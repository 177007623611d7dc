//! The saga: drives a model through warming -> active (start) and
//! active/warming -> cooling -> removed (stop), with compensating rollback
//! on failure (spec.md §4.7 "Lifecycle Orchestrator").
//!
//! Grounded in spec.md §9 "Mixin composition in the source maps to a single
//! `Orchestrator` aggregate that holds typed collaborators": this struct
//! owns every collaborator and the state machine lives here, not split
//! across inherited mixins.

use std::time::Duration;

use deployer_core::{DeploymentRecord, LifecycleState, ModelIdentity};

use crate::placement::PlacementEngine;
use crate::traits::{ExposureApi, InventoryApi, ManifestsApi, ReadinessApi, StoreApi};
use crate::{Error, ErrorKind, Result};

/// Caller inputs for `start` (spec.md §3 "Model Identity").
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub model_id: String,
    pub model_name: String,
    pub model_repo_id: String,
    pub model_type: String,
    /// Whether the secondary-cluster façade (ExternalName + Ingress) should
    /// be created for this model (spec.md §4.5 "optional").
    pub cross_cluster: bool,
    pub ingress_host: Option<String>,
}

/// Outcome of a successful `start` (spec.md §7 "A start that completes
/// readiness-with-warning returns success with a `degraded=true` flag").
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub ip: String,
    pub degraded: bool,
}

/// Which forward steps of `start` completed, so failure can run exactly the
/// matching compensations in reverse (spec.md §4.7).
#[derive(Default)]
struct StartProgress {
    warming_written: bool,
    manifest_applied: bool,
    lb_created: bool,
    external_name_created: bool,
    ingress_created: bool,
}

/// Holds typed collaborators as trait objects rather than concrete structs
/// (spec.md §9 "Mixin composition... maps to a single `Orchestrator`
/// aggregate that holds typed collaborators") so the saga can be driven
/// against fakes in tests without a live cluster or ZooKeeper ensemble.
pub struct Orchestrator {
    pub store: Box<dyn StoreApi>,
    pub manifests: Box<dyn ManifestsApi>,
    pub exposure: Box<dyn ExposureApi>,
    pub readiness: Box<dyn ReadinessApi>,
    pub placement: PlacementEngine,
    pub inventory: Box<dyn InventoryApi>,
}

impl Orchestrator {
    pub fn new(
        store: Box<dyn StoreApi>,
        manifests: Box<dyn ManifestsApi>,
        exposure: Box<dyn ExposureApi>,
        readiness: Box<dyn ReadinessApi>,
        placement: PlacementEngine,
        inventory: Box<dyn InventoryApi>,
    ) -> Self {
        Orchestrator { store, manifests, exposure, readiness, placement, inventory }
    }

    /// Drives `Absent -> Warming -> Active` (spec.md §4.7 `Start`).
    pub async fn start(&self, req: &ModelRequest) -> Result<StartOutcome> {
        // Identity validation before anything else: a non-DNS-safe
        // model_name would fail object creation deep inside the saga, after
        // the warming znode is already written (spec.md §3 "Model Identity").
        ModelIdentity::new(req.model_id.as_str(), req.model_name.as_str(), req.model_repo_id.as_str(), req.model_type.as_str())?;

        // Admission: select a pool before any mutation (spec.md §8 scenario 2
        // "No-fit... no cluster mutation; no znode write").
        let manifest_yaml = self.manifests_blob_precheck(&req.model_name).await?;
        let manifest = deployer_core::ServingManifest::parse(&manifest_yaml)?;
        manifest.verify_identity(&req.model_name)?;
        let snapshot = self.inventory.snapshot().await?;
        self.placement.place(&manifest, &snapshot)?;

        if self.store.get(LifecycleState::Warming, &req.model_id).await?.is_some() {
            bail!(ErrorKind::Core(deployer_core::ErrorKind::Conflict(format!(
                "start already in flight for model '{}'",
                req.model_id
            ))));
        }

        let mut progress = StartProgress::default();
        match self.start_inner(req, &mut progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.compensate_start(req, &progress).await;
                Err(e)
            }
        }
    }

    async fn manifests_blob_precheck(&self, model_name: &str) -> Result<String> {
        // The manifest is fetched twice by design: once here to make the
        // placement decision before any mutation, once inside
        // ManifestService::apply to label and apply it. Both reads are
        // idempotent GETs against blob storage.
        self.manifests.fetch_manifest(model_name).await
    }

    async fn start_inner(&self, req: &ModelRequest, progress: &mut StartProgress) -> Result<StartOutcome> {
        // Step 1: put(warming, id, {ip=WARMING,...})
        let warming = DeploymentRecord::warming(req.model_name.as_str(), req.model_type.as_str(), req.model_repo_id.as_str());
        self.store.put(LifecycleState::Warming, &req.model_id, &warming).await?;
        progress.warming_written = true;

        // Step 2: ManifestService.apply(id, name)
        self.manifests.apply(&req.model_id, &req.model_name).await?;
        progress.manifest_applied = true;

        // Step 3: ExposureLayer.create_load_balancer(name)
        self.exposure.create_load_balancer(&req.model_name).await?;
        progress.lb_created = true;

        let lb_ip = self
            .exposure
            .get_external_address(&req.model_name, Duration::from_secs(120))
            .await?
            .ok_or_else(|| Error::from(ErrorKind::Core(deployer_core::ErrorKind::ExposureTimeout(format!(
                "load balancer for '{}' never received an external address",
                req.model_name
            )))))?;

        // Steps 4-5 (optional): cross-cluster façade
        if req.cross_cluster {
            self.exposure.create_external_name(&req.model_name, &lb_ip).await?;
            progress.external_name_created = true;
            if let Some(host) = &req.ingress_host {
                self.exposure.create_ingress(&req.model_name, host).await?;
                progress.ingress_created = true;
            }
        }

        // Step 6: ReadinessGate.wait(name) -- timeout promotes with
        // degraded=true rather than failing the saga (SPEC_FULL.md §12
        // Open Question 1).
        let ready = self.readiness.wait(&self.exposure, &req.model_name).await?;
        let degraded = !ready;
        if degraded {
            warn!("model '{}' promoted to active without a successful readiness probe", req.model_name);
        }

        // Step 7: remove(warming, id) then put(active, id, {ip=lb_ip:80,...})
        self.store.remove(LifecycleState::Warming, &req.model_id).await?;
        let mut active = DeploymentRecord::new(format!("{}:80", lb_ip), req.model_name.as_str(), req.model_type.as_str(), req.model_repo_id.as_str());
        if degraded {
            active.extra.insert("degraded".into(), serde_json::Value::Bool(true));
        }
        self.store.put(LifecycleState::Active, &req.model_id, &active).await?;

        Ok(StartOutcome { ip: format!("{}:80", lb_ip), degraded })
    }

    /// Reverse of whatever succeeded: unregister active if set, remove
    /// ingress, remove external-name, remove load balancer, remove
    /// inference service, unregister warming. Best-effort: errors are
    /// logged and do not abort the rollback (spec.md §4.7 Compensations).
    async fn compensate_start(&self, req: &ModelRequest, progress: &StartProgress) {
        let mut residual = Vec::new();

        if let Err(e) = self.store.remove(LifecycleState::Active, &req.model_id).await {
            warn!("compensation: failed to unregister active znode for '{}': {}", req.model_id, e);
            residual.push(format!("active znode for {}", req.model_id));
        }
        if progress.ingress_created {
            if let Err(e) = self.exposure.remove_ingress(&req.model_name).await {
                warn!("compensation: failed to remove ingress for '{}': {}", req.model_name, e);
                residual.push(format!("ingress {}-ingress", req.model_name));
            }
        }
        if progress.external_name_created {
            if let Err(e) = self.exposure.remove_external_name(&req.model_name).await {
                warn!("compensation: failed to remove external-name for '{}': {}", req.model_name, e);
                residual.push(format!("external-name {}-external", req.model_name));
            }
        }
        if progress.lb_created {
            if let Err(e) = self.exposure.remove_load_balancer(&req.model_name).await {
                warn!("compensation: failed to remove load balancer for '{}': {}", req.model_name, e);
                residual.push(format!("load balancer {}-lb", req.model_name));
            }
        }
        if progress.manifest_applied {
            if let Err(e) = self.manifests.remove(&req.model_name).await {
                warn!("compensation: failed to remove InferenceService for '{}': {}", req.model_name, e);
                residual.push(format!("InferenceService {}", req.model_name));
            }
        }
        if progress.warming_written {
            if let Err(e) = self.store.remove(LifecycleState::Warming, &req.model_id).await {
                warn!("compensation: failed to unregister warming znode for '{}': {}", req.model_id, e);
                residual.push(format!("warming znode for {}", req.model_id));
            }
        }

        if !residual.is_empty() {
            error!(
                "start compensation for '{}' left residual resources in unknown state: {}",
                req.model_id,
                residual.join(", ")
            );
        }
    }

    /// Drives `Active/Warming -> Cooling -> Absent`, restoring on failure
    /// (spec.md §4.7 `Stop`).
    pub async fn stop(&self, model_id: &str, model_name: &str) -> Result<()> {
        if self.store.get(LifecycleState::Cooling, model_id).await?.is_some() {
            bail!(ErrorKind::Core(deployer_core::ErrorKind::Conflict(format!(
                "stop already in flight for model '{}'",
                model_id
            ))));
        }

        // Step 1: determine current state and capture original payload.
        let (original_state, original_payload) = match self.store.get(LifecycleState::Active, model_id).await? {
            Some(p) => (LifecycleState::Active, p),
            None => match self.store.get(LifecycleState::Warming, model_id).await? {
                Some(p) => (LifecycleState::Warming, p),
                None => {
                    bail!(ErrorKind::Core(deployer_core::ErrorKind::NotFound(format!(
                        "model '{}' is neither active nor warming",
                        model_id
                    ))))
                }
            },
        };

        // Step 2: put(cooling, id, {ip=COOLING, original_state, original_payload}).
        let cooling = DeploymentRecord::cooling(original_state, &original_payload)?;
        self.store.put(LifecycleState::Cooling, model_id, &cooling).await?;

        // Step 3: cluster-side teardown, restoring on any failure (step 5).
        if let Err(e) = self.teardown_cluster(model_name).await {
            if let Err(restore_err) = self.store.put(original_state, model_id, &original_payload).await {
                error!(
                    "stop rollback for '{}' failed to restore original state {:?}: {}",
                    model_id, original_state, restore_err
                );
            } else {
                self.store.remove(LifecycleState::Cooling, model_id).await.ok();
            }
            return Err(e);
        }

        // Step 4: remove(warming,id); remove(active,id); remove(cooling,id).
        self.store.remove(LifecycleState::Warming, model_id).await?;
        self.store.remove(LifecycleState::Active, model_id).await?;
        self.store.remove(LifecycleState::Cooling, model_id).await?;
        Ok(())
    }

    async fn teardown_cluster(&self, model_name: &str) -> Result<()> {
        self.manifests.remove(model_name).await?;
        self.exposure.remove_load_balancer(model_name).await?;
        self.exposure.remove_external_name(model_name).await?;
        self.exposure.remove_ingress(model_name).await?;
        Ok(())
    }
}

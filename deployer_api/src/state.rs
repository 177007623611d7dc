//! The canonical shared state for `deployerd`'s actix handlers: a
//! long-lived `Orchestrator` built once at startup (spec.md §9 "Global
//! module state becomes a `Config` value constructed at startup and
//! injected"), plus a background task that keeps the control plane's own
//! presence znode alive (SPEC_FULL.md §11 "Redis-mixin-style presence
//! heartbeat").
//!
//! Grounded in the teacher's `raftcat::state::State`/`init` split: a plain
//! struct built once, cloned into the actix app factory per worker, with a
//! background `tokio::spawn` loop for anything that needs to refresh itself.

use std::time::Duration;

use deployer::{
    BlobStore, ClusterGateway, Config, DiscoveryStore, ExposureLayer, ManifestService, Orchestrator, PlacementEngine, ReadinessGate, ResourceInventory,
};

use crate::Result;

const PRESENCE_PATH: &str = "/services/kube-model-deployer";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Shared across actix workers behind an `Arc` (set up by `main`); cheap to
/// clone since the fields it holds are themselves reference-counted or
/// immutable after construction.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: Config,
}

impl AppState {
    /// Build the live collaborators from process configuration: the only
    /// place in this crate that touches environment variables or
    /// constructs real cluster/discovery-store/blob clients.
    pub async fn new(cfg: Config) -> Result<Self> {
        let gateway = ClusterGateway::from_config(&cfg).await?;
        let primary = gateway.get(&cfg.primary_context)?.client.clone();
        let secondary = match &cfg.secondary_context {
            Some(ctx) => Some(gateway.get(ctx)?.client.clone()),
            None => None,
        };

        let blobs = BlobStore::new(&cfg);
        let node_pools = blobs.fetch_node_pools().await?;

        let store = DiscoveryStore::connect(&cfg)?;
        let heartbeat_store = store.clone();

        let manifests = ManifestService::new(BlobStore::new(&cfg), primary.clone(), cfg.serving_namespace.clone());
        let exposure = ExposureLayer::new(primary.clone(), secondary, cfg.serving_namespace.clone());
        let readiness = ReadinessGate::new();
        let placement = PlacementEngine::default();
        let inventory = ResourceInventory::new(primary, cfg.serving_namespace.clone(), node_pools);

        let orchestrator = Orchestrator::new(Box::new(store), Box::new(manifests), Box::new(exposure), Box::new(readiness), placement, Box::new(inventory));

        spawn_heartbeat(heartbeat_store);

        Ok(AppState { orchestrator, config: cfg })
    }
}

/// Re-registers the control plane's presence entry every 30s so a session
/// expiry or a znode TTL sweep doesn't leave it permanently unregistered
/// (SPEC_FULL.md §11). Best-effort: a single failed refresh is logged, not
/// fatal, since the next tick will retry.
fn spawn_heartbeat(store: DiscoveryStore) {
    let host_port = std::env::var("POD_IP").map(|ip| format!("{}:8080", ip)).unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tokio::spawn(async move {
        loop {
            if let Err(e) = store.register_service(PRESENCE_PATH, &host_port).await {
                warn!("presence heartbeat failed to refresh {}: {}", PRESENCE_PATH, e);
            } else {
                debug!("refreshed presence at {}", PRESENCE_PATH);
            }
            tokio::time::delay_for(HEARTBEAT_INTERVAL).await;
        }
    });
}

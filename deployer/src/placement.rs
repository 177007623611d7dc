//! Maps a manifest's resource ask to the first pool that fits it
//! (spec.md §4.3 "Placement Engine").
//!
//! The algorithm itself is pure (it only reads a [`PoolInventory`] snapshot)
//! so it is grounded directly on `deployer_core::pool`/`resources`; this
//! module is a thin policy layer kept in `deployer` because it is the thing
//! the Orchestrator calls mid-saga, the same split the teacher keeps between
//! `shipcat_definitions` (data) and `shipcat_cli` (the thing that acts on it).

use deployer_core::{PoolInventory, ResourceAsk, ServingManifest};

use crate::{Error, ErrorKind, Result};

/// Detail record returned alongside `NoFit`, listing the ask and each pool's
/// available triple (spec.md §4.3 step 3).
#[derive(Debug, Clone)]
pub struct NoFitDetail {
    pub ask: ResourceAsk,
    pub pools: Vec<(String, ResourceAsk)>,
}

impl std::fmt::Display for NoFitDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ask cpu={:.2} mem_gib={:.2} gpu={} vs pools [{}]",
            self.ask.cpu_cores,
            self.ask.mem_gib,
            self.ask.gpu_count,
            self.pools
                .iter()
                .map(|(name, avail)| format!("{}: cpu={:.2} mem_gib={:.2} gpu={}", name, avail.cpu_cores, avail.mem_gib, avail.gpu_count))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

pub struct PlacementEngine {
    /// If false, the manifest's container *requests* are used instead of
    /// *limits* when computing the ask (spec.md §4.3 "a use-limits flag").
    pub use_limits: bool,
}

impl Default for PlacementEngine {
    fn default() -> Self {
        PlacementEngine { use_limits: true }
    }
}

impl PlacementEngine {
    pub fn new(use_limits: bool) -> Self {
        PlacementEngine { use_limits }
    }

    /// Select the first pool, in declared order, whose available resources
    /// satisfy the manifest's ask (spec.md §4.3). Intentionally greedy and
    /// stable in declaration order (spec.md §9); callers wanting best-fit
    /// must sort pools before calling.
    pub fn place(&self, manifest: &ServingManifest, inventory: &PoolInventory) -> Result<String> {
        let ask = manifest.requirement(self.use_limits)?;
        let mut seen = Vec::with_capacity(inventory.pools.len());
        for pool in &inventory.pools {
            let available = pool.totals.base;
            seen.push((pool.name.clone(), available));
            if ask.gpu_count > 0 && pool.gpu_count() == 0 {
                continue;
            }
            if ask.fits_in(&available) {
                return Ok(pool.name.clone());
            }
        }
        Err(Error::from(ErrorKind::Core(deployer_core::ErrorKind::PlacementNoFit(
            NoFitDetail { ask, pools: seen }.to_string(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer_core::pool::{NodeResourceStat, PoolConfig, PoolSnapshot};
    use std::collections::BTreeMap;

    fn manifest(cpu: &str, mem: &str, gpu: Option<&str>) -> ServingManifest {
        let gpu_line = gpu.map(|g| format!("          nvidia.com/gpu: \"{}\"\n", g)).unwrap_or_default();
        let yaml = format!(
            "kind: InferenceService\nmetadata:\n  name: alpha\nspec:\n  predictor:\n    containers:\n    - name: predictor\n      resources:\n        requests:\n          cpu: \"{cpu}\"\n          memory: \"{mem}\"\n{gpu_line}        limits:\n          cpu: \"{cpu}\"\n          memory: \"{mem}\"\n{gpu_line}",
            cpu = cpu, mem = mem, gpu_line = gpu_line
        );
        ServingManifest::parse(&yaml).unwrap()
    }

    fn pool(name: &str, cpu: f64, mem_gib: f64, gpu: u32) -> PoolSnapshot {
        let config = PoolConfig {
            labels: BTreeMap::new(),
            machine_type: "n1-standard-4".into(),
            instances: 1,
            gpu: if gpu > 0 { Some(deployer_core::pool::GpuSpec { gpu_type: "nvidia-tesla-t4".into(), count: gpu }) } else { None },
        };
        let node = NodeResourceStat {
            capacity: ResourceAsk { cpu_cores: cpu, mem_gib, gpu_count: gpu },
            allocatable: ResourceAsk { cpu_cores: cpu, mem_gib, gpu_count: gpu },
            used: ResourceAsk::default(),
        };
        PoolSnapshot::new(name, config, vec![node])
    }

    #[test]
    fn picks_first_pool_that_fits_gpu_aware() {
        let inventory = PoolInventory { pools: vec![pool("cpu-pool", 8.0, 32.0, 0), pool("t4", 14.0, 48.0, 1)] };
        let m = manifest("2", "8Gi", Some("1"));
        let engine = PlacementEngine::new(true);
        assert_eq!(engine.place(&m, &inventory).unwrap(), "t4");
    }

    #[test]
    fn no_fit_when_all_pools_full() {
        let inventory = PoolInventory { pools: vec![pool("t4", 1.0, 2.0, 1)] };
        let m = manifest("2", "8Gi", Some("1"));
        let engine = PlacementEngine::new(true);
        assert!(engine.place(&m, &inventory).is_err());
    }

    #[test]
    fn stable_declaration_order_picks_first_match_not_best_fit() {
        let inventory = PoolInventory { pools: vec![pool("big", 32.0, 128.0, 0), pool("small", 4.0, 16.0, 0)] };
        let m = manifest("2", "8Gi", None);
        let engine = PlacementEngine::new(true);
        assert_eq!(engine.place(&m, &inventory).unwrap(), "big");
    }
}

//! Node pool configuration, pool inventory snapshot, and the resident-model
//! entity read back out of a namespace's live pods (spec.md §3/§4.8).
//!
//! `deployer_core` only holds the shapes and the pure aggregation math; the
//! actual node/pod listing lives in `deployer::inventory` (an I/O
//! collaborator), mirroring the split the teacher keeps between
//! `shipcat_definitions::structs` (plain data) and `shipcat_cli::kube`
//! (the thing that walks a live cluster to fill it in).

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::resources::ResourceAsk;

/// One accelerator declaration on a pool (`node_pools.json`'s `gpu` key).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GpuSpec {
    #[serde(rename = "type")]
    pub gpu_type: String,
    pub count: u32,
}

/// A single declared node pool, as read from blob storage's `node_pools.json`
/// (spec.md §6 "Blob storage"). `labels` is the selector used both to find
/// member nodes (spec.md §4.8) and, historically, to create them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PoolConfig {
    pub labels: BTreeMap<String, String>,
    pub machine_type: String,
    #[serde(default)]
    pub instances: u32,
    #[serde(default)]
    pub gpu: Option<GpuSpec>,
}

impl PoolConfig {
    /// Declared GPU count for this pool (0 if the pool has no accelerator).
    pub fn gpu_count(&self) -> u32 {
        self.gpu.as_ref().map(|g| g.count).unwrap_or(0)
    }

    /// True if `node`'s labels satisfy every `key=value` pair this pool
    /// declares (spec.md §4.8 "Node membership is derived by matching all
    /// key=value pairs in pool.labels against node labels").
    pub fn matches(&self, node_labels: &BTreeMap<String, String>) -> bool {
        self.labels.iter().all(|(k, v)| node_labels.get(k) == Some(v))
    }
}

/// Per-machine-type CPU/memory baseline (`node_pools.json`'s `machine_specs`
/// map), used to estimate capacity before a pool's nodes are all observed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MachineSpec {
    pub cpu: f64,
    pub memory_gi: f64,
}

/// The full `node_pools.json` document (spec.md §6).
///
/// `node_pools` is an [`IndexMap`] rather than a `BTreeMap` because
/// placement is declared-order-sensitive (spec.md §4.3 step 2, §9 "greedy
/// and stable in pool declaration order") — a sorted map would silently
/// reorder pools alphabetically and break that guarantee.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct NodePoolsDocument {
    #[serde(default)]
    pub node_pools: IndexMap<String, PoolConfig>,
    #[serde(default)]
    pub machine_specs: BTreeMap<String, MachineSpec>,
}

/// Capacity/allocatable/used triple for one node, already normalised into
/// cores/GiB/count by whichever caller built it (spec.md §3 "Pool Inventory
/// Entity").
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeResourceStat {
    pub capacity: ResourceAsk,
    pub allocatable: ResourceAsk,
    pub used: ResourceAsk,
}

impl NodeResourceStat {
    /// `allocatable - used`, clamped at zero component-wise.
    pub fn available(&self) -> ResourceAsk {
        ResourceAsk {
            cpu_cores: crate::resources::round2((self.allocatable.cpu_cores - self.used.cpu_cores).max(0.0)),
            mem_gib: (self.allocatable.mem_gib - self.used.mem_gib).max(0.0),
            gpu_count: self.allocatable.gpu_count.saturating_sub(self.used.gpu_count),
        }
    }

    /// `capacity - allocatable`: resources kubelet reserves out of the
    /// schedulable pool, surfaced as headroom (spec.md §11 "Autoscaler-aware
    /// placement headroom").
    pub fn reserved_headroom(&self) -> ResourceAsk {
        ResourceAsk {
            cpu_cores: crate::resources::round2((self.capacity.cpu_cores - self.allocatable.cpu_cores).max(0.0)),
            mem_gib: (self.capacity.mem_gib - self.allocatable.mem_gib).max(0.0),
            gpu_count: self.capacity.gpu_count.saturating_sub(self.allocatable.gpu_count),
        }
    }
}

/// `base` is currently schedulable headroom (Σ allocatable − used); `extra`
/// is the additional margin reserved by kubelet out of raw node capacity
/// (Σ capacity − allocatable). Grounded in the teacher's
/// `shipcat_definitions::math::ResourceTotals` split between a resolved
/// total and an additional ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResourceTotals {
    pub base: ResourceAsk,
    pub extra: ResourceAsk,
}

/// A named pool's live snapshot: its member nodes and their aggregated
/// totals (spec.md §4.8 `snapshot()`).
#[derive(Clone, Debug)]
pub struct PoolSnapshot {
    pub name: String,
    pub config: PoolConfig,
    pub nodes: Vec<NodeResourceStat>,
    pub totals: ResourceTotals,
}

impl PoolSnapshot {
    pub fn new(name: impl Into<String>, config: PoolConfig, nodes: Vec<NodeResourceStat>) -> Self {
        let mut totals = ResourceTotals::default();
        for n in &nodes {
            let avail = n.available();
            totals.base.cpu_cores = crate::resources::round2(totals.base.cpu_cores + avail.cpu_cores);
            totals.base.mem_gib += avail.mem_gib;
            totals.base.gpu_count += avail.gpu_count;
            let headroom = n.reserved_headroom();
            totals.extra.cpu_cores = crate::resources::round2(totals.extra.cpu_cores + headroom.cpu_cores);
            totals.extra.mem_gib += headroom.mem_gib;
            totals.extra.gpu_count += headroom.gpu_count;
        }
        PoolSnapshot { name: name.into(), config, nodes, totals }
    }

    /// Declared GPU count, for the Placement Engine's GPU-aware skip
    /// (spec.md §4.3 step 2: "skip if pool GPU count is 0").
    pub fn gpu_count(&self) -> u32 {
        self.config.gpu_count()
    }
}

/// The full inventory: every configured pool's live snapshot, in the
/// declared order from `node_pools.json` (placement is order-sensitive,
/// spec.md §9).
#[derive(Clone, Debug, Default)]
pub struct PoolInventory {
    pub pools: Vec<PoolSnapshot>,
}

impl PoolInventory {
    pub fn get(&self, name: &str) -> Option<&PoolSnapshot> {
        self.pools.iter().find(|p| p.name == name)
    }
}

/// One model's footprint inside a pool, collapsed from its (possibly
/// several) pods (spec.md §3 "Resident Model Entity").
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResidentModel {
    pub name: String,
    pub model_id: Option<String>,
    pub namespace: String,
    pub node: String,
    pub status: String,
    pub url: Option<String>,
    pub resources: ResourceAsk,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pool(labels: &[(&str, &str)]) -> PoolConfig {
        PoolConfig {
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            machine_type: "n1-standard-4".into(),
            instances: 2,
            gpu: None,
        }
    }

    #[test]
    fn pool_matches_requires_all_labels() {
        let p = pool(&[("pool", "t4"), ("zone", "us-east1-b")]);
        let mut node_labels = BTreeMap::new();
        node_labels.insert("pool".into(), "t4".into());
        assert!(!p.matches(&node_labels));
        node_labels.insert("zone".into(), "us-east1-b".into());
        assert!(p.matches(&node_labels));
    }

    #[test]
    fn node_available_clamps_at_zero() {
        let stat = NodeResourceStat {
            capacity: ResourceAsk { cpu_cores: 4.0, mem_gib: 16.0, gpu_count: 0 },
            allocatable: ResourceAsk { cpu_cores: 3.5, mem_gib: 14.0, gpu_count: 0 },
            used: ResourceAsk { cpu_cores: 4.0, mem_gib: 2.0, gpu_count: 0 },
        };
        let avail = stat.available();
        assert_eq!(avail.cpu_cores, 0.0);
        assert_eq!(avail.mem_gib, 12.0);
    }

    #[test]
    fn snapshot_aggregates_totals_across_nodes() {
        let nodes = vec![
            NodeResourceStat {
                capacity: ResourceAsk { cpu_cores: 4.0, mem_gib: 16.0, gpu_count: 1 },
                allocatable: ResourceAsk { cpu_cores: 3.8, mem_gib: 15.0, gpu_count: 1 },
                used: ResourceAsk { cpu_cores: 1.0, mem_gib: 4.0, gpu_count: 0 },
            },
            NodeResourceStat {
                capacity: ResourceAsk { cpu_cores: 4.0, mem_gib: 16.0, gpu_count: 1 },
                allocatable: ResourceAsk { cpu_cores: 3.8, mem_gib: 15.0, gpu_count: 1 },
                used: ResourceAsk { cpu_cores: 2.0, mem_gib: 6.0, gpu_count: 1 },
            },
        ];
        let snap = PoolSnapshot::new("t4", pool(&[("pool", "t4")]), nodes);
        assert_eq!(snap.totals.base.cpu_cores, 4.6);
        assert_eq!(snap.totals.base.gpu_count, 1);
    }

    #[test]
    fn node_pools_document_parses() {
        let json = r#"{
            "node_pools": {
                "t4": {"labels": {"pool": "t4"}, "machine_type": "n1-standard-8", "instances": 3, "gpu": {"type": "nvidia-tesla-t4", "count": 1}},
                "cpu": {"labels": {"pool": "cpu"}, "machine_type": "n1-standard-4", "instances": 5}
            },
            "machine_specs": {"n1-standard-8": {"cpu": 8.0, "memory_gi": 30.0}}
        }"#;
        let doc: NodePoolsDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.node_pools.len(), 2);
        assert_eq!(doc.node_pools["t4"].gpu_count(), 1);
        assert_eq!(doc.node_pools["cpu"].gpu_count(), 0);
    }
}

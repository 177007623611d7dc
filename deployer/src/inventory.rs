//! Reads live nodes/pods in the serving namespace and aggregates per-pool
//! capacity/usage/residents (spec.md §4.8 "Resource Inventory").

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::client::APIClient;

use deployer_core::pool::{NodeResourceStat, NodePoolsDocument, PoolInventory, PoolSnapshot, ResidentModel};
use deployer_core::resources::{parse_cpu, parse_memory, round2};
use deployer_core::ResourceAsk;

use crate::{ErrorKind, Result};

/// Sidecar whose resources are excluded from resident model summation
/// (spec.md §4.8 "The queue-proxy sidecar's resources are excluded").
const EXCLUDED_SIDECAR: &str = "queue-proxy";
/// Label carrying the owning InferenceService name on a predictor pod.
const INFERENCESERVICE_LABEL: &str = "serving.kserve.io/inferenceservice";
const MODEL_ID_LABEL: &str = "model-id";

pub struct ResourceInventory {
    client: APIClient,
    namespace: String,
    node_pools: NodePoolsDocument,
}

impl ResourceInventory {
    pub fn new(client: APIClient, namespace: impl Into<String>, node_pools: NodePoolsDocument) -> Self {
        ResourceInventory { client, namespace: namespace.into(), node_pools }
    }

    /// Returns, per pool, its member nodes and aggregated totals
    /// (spec.md §4.8 `snapshot()`).
    pub async fn snapshot(&self) -> Result<PoolInventory> {
        let nodes_api: Api<Node> = Api::all(self.client.clone());
        let nodes = nodes_api.list(&ListParams::default()).await.map_err(ErrorKind::Kube)?;

        let pods_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = pods_api.list(&ListParams::default()).await.map_err(ErrorKind::Kube)?;

        let mut used_by_node: BTreeMap<String, ResourceAsk> = BTreeMap::new();
        for pod in &pods.items {
            if is_terminal(pod) {
                continue;
            }
            let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else { continue };
            let entry = used_by_node.entry(node_name).or_insert_with(ResourceAsk::default);
            add_assign(entry, &pod_requests(pod));
        }

        let mut claimed: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut pools: Vec<PoolSnapshot> = Vec::with_capacity(self.node_pools.node_pools.len());
        for (name, config) in &self.node_pools.node_pools {
            let mut members = Vec::new();
            for node in &nodes.items {
                let identity = node_identity(node);
                // spec.md §4.8: a node belongs to the *first* pool whose
                // labels match; skip if already claimed by an earlier pool.
                if claimed.contains(&identity) {
                    continue;
                }
                let node_labels = node.metadata.as_ref().and_then(|m| m.labels.clone()).unwrap_or_default();
                if !config.matches(&node_labels) {
                    continue;
                }
                claimed.insert(identity.clone());
                let stat = node_stat(node, used_by_node.get(&identity).copied().unwrap_or_default());
                members.push(stat);
            }
            pools.push(PoolSnapshot::new(name.clone(), config.clone(), members));
        }
        Ok(PoolInventory { pools })
    }

    /// Walks namespaced pods and collapses duplicate pods for one model
    /// into a [`ResidentModel`] per pool (spec.md §4.8 `residents()`).
    pub async fn residents(&self) -> Result<BTreeMap<String, Vec<ResidentModel>>> {
        let nodes_api: Api<Node> = Api::all(self.client.clone());
        let nodes = nodes_api.list(&ListParams::default()).await.map_err(ErrorKind::Kube)?;

        let pods_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = pods_api.list(&ListParams::default()).await.map_err(ErrorKind::Kube)?;

        let mut grouped: BTreeMap<(String, String), ResidentModel> = BTreeMap::new();
        for pod in &pods.items {
            if is_terminal(pod) {
                continue;
            }
            let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default();
            let pool_name = match self.pool_for_node(&nodes.items, &node_name) {
                Some(p) => p,
                None => continue,
            };
            let pod_meta = pod.metadata.as_ref();
            let labels = pod_meta.and_then(|m| m.labels.clone()).unwrap_or_default();
            let model_key = resident_key(pod_meta.and_then(|m| m.name.clone()).unwrap_or_default(), &labels);
            let model_id = labels.get(MODEL_ID_LABEL).cloned();
            let status = pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_else(|| "Unknown".into());
            let resources = pod_requests_excluding_sidecars(pod);

            let entry = grouped.entry((pool_name.clone(), model_key.clone())).or_insert_with(|| ResidentModel {
                name: model_key.clone(),
                model_id: model_id.clone(),
                namespace: self.namespace.clone(),
                node: node_name.clone(),
                status: status.clone(),
                url: None,
                resources: ResourceAsk::default(),
            });
            entry.resources.cpu_cores = round2(entry.resources.cpu_cores + resources.cpu_cores);
            entry.resources.mem_gib += resources.mem_gib;
            entry.resources.gpu_count += resources.gpu_count;
            if entry.model_id.is_none() {
                entry.model_id = model_id;
            }
        }

        let mut out: BTreeMap<String, Vec<ResidentModel>> = BTreeMap::new();
        for ((pool, _key), resident) in grouped {
            out.entry(pool).or_default().push(resident);
        }
        Ok(out)
    }

    fn pool_for_node(&self, nodes: &[Node], node_name: &str) -> Option<String> {
        let node = nodes.iter().find(|n| node_identity(n) == node_name)?;
        let node_labels = node.metadata.as_ref().and_then(|m| m.labels.clone()).unwrap_or_default();
        self.node_pools.node_pools.iter().find(|(_, cfg)| cfg.matches(&node_labels)).map(|(name, _)| name.clone())
    }
}

#[async_trait::async_trait]
impl crate::traits::InventoryApi for ResourceInventory {
    async fn snapshot(&self) -> Result<PoolInventory> {
        ResourceInventory::snapshot(self).await
    }
}

fn node_identity(node: &Node) -> String {
    node.metadata.as_ref().and_then(|m| m.name.clone()).unwrap_or_default()
}

fn is_terminal(pod: &Pod) -> bool {
    matches!(pod.status.as_ref().and_then(|s| s.phase.as_deref()), Some("Succeeded") | Some("Failed"))
}

fn add_assign(acc: &mut ResourceAsk, other: &ResourceAsk) {
    acc.cpu_cores = round2(acc.cpu_cores + other.cpu_cores);
    acc.mem_gib += other.mem_gib;
    acc.gpu_count += other.gpu_count;
}

fn pod_requests(pod: &Pod) -> ResourceAsk {
    sum_containers(pod, |_name| true)
}

fn pod_requests_excluding_sidecars(pod: &Pod) -> ResourceAsk {
    sum_containers(pod, |name| name != EXCLUDED_SIDECAR)
}

fn sum_containers(pod: &Pod, include: impl Fn(&str) -> bool) -> ResourceAsk {
    let mut total = ResourceAsk::default();
    let Some(spec) = pod.spec.as_ref() else { return total };
    for c in &spec.containers {
        if !include(&c.name) {
            continue;
        }
        let Some(resources) = c.resources.as_ref() else { continue };
        let Some(requests) = resources.requests.as_ref() else { continue };
        if let Some(cpu) = requests.get("cpu") {
            total.cpu_cores = round2(total.cpu_cores + parse_cpu(&cpu.0).unwrap_or(0.0));
        }
        if let Some(mem) = requests.get("memory") {
            total.mem_gib += parse_memory(&mem.0).unwrap_or(0.0) / (1024.0 * 1024.0 * 1024.0);
        }
        for (key, qty) in requests {
            if key.ends_with("/gpu") {
                total.gpu_count += qty.0.trim().parse::<u32>().unwrap_or(0);
            }
        }
    }
    total
}

/// Collapse duplicate pods for one model: prefer the owning InferenceService
/// label, else the deployment-name prefix up to `-predictor-`, else the
/// pod-name prefix up to the last `-` (spec.md §4.8 `residents()`).
fn resident_key(pod_name: String, labels: &BTreeMap<String, String>) -> String {
    if let Some(isvc) = labels.get(INFERENCESERVICE_LABEL) {
        return isvc.clone();
    }
    if let Some(idx) = pod_name.find("-predictor-") {
        return pod_name[..idx].to_string();
    }
    match pod_name.rfind('-') {
        Some(idx) => pod_name[..idx].to_string(),
        None => pod_name,
    }
}

fn node_stat(node: &Node, used: ResourceAsk) -> NodeResourceStat {
    let status = node.status.as_ref();
    let capacity = status.and_then(|s| s.capacity.as_ref()).map(quantities_to_ask).unwrap_or_default();
    let allocatable = status.and_then(|s| s.allocatable.as_ref()).map(quantities_to_ask).unwrap_or(capacity);
    NodeResourceStat { capacity, allocatable, used }
}

fn quantities_to_ask(map: &BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>) -> ResourceAsk {
    let mut ask = ResourceAsk::default();
    if let Some(cpu) = map.get("cpu") {
        ask.cpu_cores = parse_cpu(&cpu.0).unwrap_or(0.0);
    }
    if let Some(mem) = map.get("memory") {
        ask.mem_gib = parse_memory(&mem.0).unwrap_or(0.0) / (1024.0 * 1024.0 * 1024.0);
    }
    for (key, qty) in map {
        if key.ends_with("/gpu") {
            ask.gpu_count += qty.0.trim().parse::<u32>().unwrap_or(0);
        }
    }
    ask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_key_prefers_inferenceservice_label() {
        let mut labels = BTreeMap::new();
        labels.insert(INFERENCESERVICE_LABEL.to_string(), "alpha".to_string());
        assert_eq!(resident_key("alpha-predictor-00001-deployment-abc".to_string(), &labels), "alpha");
    }

    #[test]
    fn resident_key_falls_back_to_predictor_prefix() {
        let labels = BTreeMap::new();
        assert_eq!(resident_key("alpha-predictor-00001-deployment-abc".to_string(), &labels), "alpha");
    }

    #[test]
    fn resident_key_falls_back_to_pod_name_prefix() {
        let labels = BTreeMap::new();
        assert_eq!(resident_key("alpha-7d8f9c-xyz".to_string(), &labels), "alpha-7d8f9c");
    }
}

#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate error_chain;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Core(deployer_core::Error, deployer_core::ErrorKind);
    }
    foreign_links {
        Io(::std::io::Error);
        SerdeJ(serde_json::Error);
        SerdeY(serde_yaml::Error);
        Kube(kube::Error);
        Http(reqwest::Error);
        ZooKeeper(zookeeper::ZkError);
        Blob(cloud_storage::Error);
    }
}

/// Holds per-context cluster clients; returns a bound client for a named
/// context (spec.md §4.1 "Cluster Gateway").
pub mod gateway;

/// Typed read/write of model znodes and the control plane's own presence
/// entry (spec.md §4.2 "Discovery Store Adapter").
pub mod store;

/// Maps a manifest's resource ask to the first pool inventory snapshot it
/// fits (spec.md §4.3 "Placement Engine").
pub mod placement;

/// Fetches, labels, and applies/removes the serving custom resource
/// (spec.md §4.4 "Manifest Service").
pub mod manifest_service;

/// Creates/removes the LoadBalancer, ExternalName, and Ingress that front a
/// serving resource (spec.md §4.5 "Exposure Layer").
pub mod exposure;

/// Polls the external health endpoint until ready or timed out
/// (spec.md §4.6 "Readiness Gate").
pub mod readiness;

/// Reads live nodes/pods and aggregates per-pool capacity/usage/residents
/// (spec.md §4.8 "Resource Inventory").
pub mod inventory;

/// Blob storage client for per-model manifests and node-pool configuration
/// (spec.md §6 "Blob storage").
pub mod blob;

/// The saga: drives a model through warming/active/cooling with
/// compensating rollback (spec.md §4.7 "Lifecycle Orchestrator").
pub mod orchestrator;

/// Trait seams for the Orchestrator's collaborators, so the saga can be
/// driven against hand-built fakes in tests (SPEC_FULL.md §10.5).
pub mod traits;

pub use crate::blob::BlobStore;
pub use crate::exposure::ExposureLayer;
pub use crate::gateway::ClusterGateway;
pub use crate::inventory::ResourceInventory;
pub use crate::manifest_service::ManifestService;
pub use crate::orchestrator::{ModelRequest, Orchestrator, StartOutcome};
pub use crate::placement::PlacementEngine;
pub use crate::readiness::ReadinessGate;
pub use crate::store::DiscoveryStore;
pub use crate::traits::{ExposureApi, InventoryApi, ManifestsApi, ReadinessApi, StoreApi};

pub use deployer_core::Config;

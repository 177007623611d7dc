#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate chrono;
extern crate regex;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Io(::std::io::Error);
        Float(::std::num::ParseFloatError);
        Int(::std::num::ParseIntError);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
    }
    errors {
        /// Missing required env/context/credentials; fatal at startup.
        ConfigError(what: String) {
            description("configuration error")
            display("configuration error: {}", what)
        }
        /// Named manifest, znode, or cluster object absent where required.
        NotFound(what: String) {
            description("not found")
            display("not found: {}", what)
        }
        /// Resource already exists; create paths recover this locally into a replace.
        Conflict(what: String) {
            description("conflict")
            display("already exists: {}", what)
        }
        /// No pool satisfies the ask; start aborts before any mutation.
        PlacementNoFit(detail: String) {
            description("no pool fits the requested resources")
            display("no pool fits: {}", detail)
        }
        /// LB external address or readiness probe did not succeed in time.
        ExposureTimeout(what: String) {
            description("exposure or readiness timed out")
            display("timed out waiting for {}", what)
        }
        /// A compensation step itself failed; residuals are unknown-state resources.
        PartialRollback(residuals: Vec<String>) {
            description("rollback left residual resources")
            display("rollback incomplete, residual resources: {}", residuals.join(", "))
        }
        /// Other cluster/store errors, surfaced after compensations run.
        TransientAPI(what: String) {
            description("transient API failure")
            display("transient API failure: {}", what)
        }
    }
}

/// Resource quantities (CPU cores, memory bytes, GPU count) and the
/// Kubernetes unit grammar used to parse/format them.
pub mod resources;

/// Stable identity of a deployment (model_id/model_name/model_repo_id/model_type).
pub mod identity;

/// Lifecycle states and the znode payload shape, including the legacy format.
pub mod lifecycle;

/// Parsed serving manifest (InferenceService / Deployment) and resource extraction.
pub mod manifest;

/// Node pool configuration, pool inventory snapshot, and resident model entity.
pub mod pool;

/// Process configuration assembled from environment variables.
pub mod config;

pub use crate::config::Config;
pub use crate::identity::ModelIdentity;
pub use crate::lifecycle::{DeploymentRecord, LifecycleState};
pub use crate::manifest::ServingManifest;
pub use crate::pool::{MachineSpec, PoolConfig, PoolInventory, ResidentModel};
pub use crate::resources::{ResourceAsk, Resources};

//! Blob storage client for per-model manifests and node-pool configuration
//! (spec.md §6 "Blob storage"; SPEC_FULL.md §10.8, grounded in
//! `original_source/cloud/gcp/storage/storage_manager.py`).
//!
//! Wraps the `cloud-storage` crate (a real, `reqwest`-backed GCS client) in
//! a small typed struct, the same shape the teacher uses for its own
//! `reqwest`-backed API clients.

use deployer_core::pool::NodePoolsDocument;
use deployer_core::Config;

use crate::{Error, ErrorKind, Result};

pub struct BlobStore {
    bucket: String,
    client: cloud_storage::Client,
}

impl BlobStore {
    pub fn new(cfg: &Config) -> Self {
        BlobStore { bucket: cfg.resource_bucket_name.clone(), client: cloud_storage::Client::default() }
    }

    /// Fetch the YAML manifest bytes keyed by `model_name` (spec.md §6
    /// `{model_name}.yaml`); `NotFound` if absent (spec.md §4.4 step 1).
    pub async fn fetch_manifest(&self, model_name: &str) -> Result<String> {
        let key = format!("{}.yaml", model_name);
        let bytes = self.client.object().download(&self.bucket, &key).await.map_err(|e| match e {
            cloud_storage::Error::Google(ref g) if g.error.code == 404 => {
                Error::from(ErrorKind::Core(deployer_core::ErrorKind::NotFound(format!("manifest '{}'", key))))
            }
            other => Error::from(ErrorKind::Blob(other)),
        })?;
        String::from_utf8(bytes).map_err(|e| Error::from(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(format!("manifest '{}' is not valid utf-8: {}", key, e)))))
    }

    /// Fetch and parse `node_pools.json` (spec.md §6).
    pub async fn fetch_node_pools(&self) -> Result<NodePoolsDocument> {
        let bytes = self
            .client
            .object()
            .download(&self.bucket, "node_pools.json")
            .await
            .map_err(|e| match e {
                cloud_storage::Error::Google(ref g) if g.error.code == 404 => {
                    Error::from(ErrorKind::Core(deployer_core::ErrorKind::NotFound("node_pools.json".into())))
                }
                other => Error::from(ErrorKind::Blob(other)),
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

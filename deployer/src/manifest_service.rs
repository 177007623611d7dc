//! Fetches a model's serving manifest, stamps identity labels, and
//! applies/removes it against the serving cluster (spec.md §4.4 "Manifest
//! Service").
//!
//! `InferenceService` follows the teacher's own `#[derive(CustomResource)]`
//! pattern (`shipcat_definitions::manifest::Manifest` / `ShipcatManifest`)
//! rather than the raw `Resource`+`client.request` path `kubeapi.rs` falls
//! back to for non-derived CRDs — the spec/status shapes here are opaque
//! (`serde_json::Value`) since `kind: InferenceService` is an external
//! contract (spec.md §1) whose full schema this control plane does not own.

use kube::api::{Api, DeleteParams, PatchParams, PostParams};
use kube::client::APIClient;
use kube_derive::CustomResource;
use serde_json::Value;

use deployer_core::ServingManifest;

use crate::blob::BlobStore;
use crate::{Error, ErrorKind, Result};

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default)]
#[kube(group = "serving.kserve.io", kind = "InferenceService", version = "v1beta1", namespaced)]
#[kube(apiextensions = "v1beta1")]
pub struct InferenceServiceSpec {
    #[serde(flatten)]
    pub inner: Value,
}

pub struct ManifestService {
    blobs: BlobStore,
    client: APIClient,
    namespace: String,
}

impl ManifestService {
    pub fn new(blobs: BlobStore, client: APIClient, namespace: impl Into<String>) -> Self {
        ManifestService { blobs, client, namespace: namespace.into() }
    }

    /// Fetch the raw manifest YAML, used by the Placement Engine to decide
    /// admission before any mutation happens (spec.md §8 scenario 2).
    pub async fn fetch_manifest(&self, model_name: &str) -> Result<String> {
        self.blobs.fetch_manifest(model_name).await
    }

    /// Fetch + parse + label + apply-or-patch (spec.md §4.4 `apply`).
    pub async fn apply(&self, model_id: &str, model_name: &str) -> Result<()> {
        let yaml = self.blobs.fetch_manifest(model_name).await?;
        let mut manifest = ServingManifest::parse(&yaml)?;
        manifest.verify_identity(model_name)?;
        manifest.inject_model_id_label(model_id)?;

        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(model_name).await {
            Ok(_) => {
                let patch = serde_json::to_vec(&manifest.raw)?;
                api.patch(model_name, &PatchParams::default(), patch).await.map_err(ErrorKind::Kube)?;
                debug!("Patched existing InferenceService '{}'", model_name);
            }
            Err(kube::Error::Api(ref e)) if e.code == 404 => {
                let crd = InferenceService::new(model_name, InferenceServiceSpec { inner: manifest.raw.into() });
                // create-path Conflict (409) is recovered locally, spec.md §7.
                match api.create(&PostParams::default(), &crd).await {
                    Ok(_) => info!("Created InferenceService '{}'", model_name),
                    Err(kube::Error::Api(ref e)) if e.code == 409 => {
                        let patch = serde_json::to_vec(&crd.spec.inner)?;
                        api.patch(model_name, &PatchParams::default(), patch).await.map_err(ErrorKind::Kube)?;
                    }
                    Err(e) => return Err(ErrorKind::Kube(e).into()),
                }
            }
            Err(e) => return Err(ErrorKind::Kube(e).into()),
        }
        Ok(())
    }

    /// Delete the custom object; `NotFound` is success (spec.md §4.4 `remove`).
    pub async fn remove(&self, model_name: &str) -> Result<()> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.delete(model_name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ref e)) if e.code == 404 => Ok(()),
            Err(e) => Err(Error::from(ErrorKind::Kube(e))),
        }
    }
}

#[async_trait::async_trait]
impl crate::traits::ManifestsApi for ManifestService {
    async fn fetch_manifest(&self, model_name: &str) -> Result<String> {
        ManifestService::fetch_manifest(self, model_name).await
    }
    async fn apply(&self, model_id: &str, model_name: &str) -> Result<()> {
        ManifestService::apply(self, model_id, model_name).await
    }
    async fn remove(&self, model_name: &str) -> Result<()> {
        ManifestService::remove(self, model_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_manifest_with_wrong_object_name() {
        let yaml = "kind: InferenceService\nmetadata:\n  name: beta\nspec: {}\n";
        let manifest = ServingManifest::parse(yaml).unwrap();
        assert!(manifest.verify_identity("alpha").is_err());
    }
}

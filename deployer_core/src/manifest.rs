//! Parsed serving manifest (`InferenceService` / `Deployment`) and the
//! resource-requirement extraction the Placement Engine consumes.
//!
//! Grounded in the teacher's `manifest::manifest` module: a YAML document is
//! deserialized into a typed shape, then a handful of fields are read back
//! out for a specific purpose (there, templating; here, placement and label
//! injection) rather than the whole document being round-tripped typed.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::resources::{ResourceAsk, Resources};
use crate::{ErrorKind, Result};

/// `model-id` label key injected at both metadata levels (spec.md §4.4 step 3).
pub const MODEL_ID_LABEL: &str = "model-id";

/// Opaque YAML document describing a serving custom resource (spec.md §3
/// "Manifest Entity"). Only `kind`, `metadata.name`, labels, and container
/// resource requests/limits are inspected; everything else round-trips
/// untouched through `raw`.
#[derive(Clone, Debug)]
pub struct ServingManifest {
    pub raw: Value,
}

impl ServingManifest {
    pub fn parse(yaml: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(yaml)?;
        Ok(ServingManifest { raw })
    }

    pub fn kind(&self) -> &str {
        self.raw.get("kind").and_then(Value::as_str).unwrap_or("")
    }

    pub fn metadata_name(&self) -> &str {
        self.raw
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Reject if `kind != InferenceService` or the object name doesn't match
    /// the caller's `model_name` (spec.md §4.4 step 2).
    pub fn verify_identity(&self, model_name: &str) -> Result<()> {
        if self.kind() != "InferenceService" {
            bail!(ErrorKind::ConfigError(format!(
                "manifest for '{}' has kind '{}', expected InferenceService",
                model_name,
                self.kind()
            )));
        }
        if self.metadata_name() != model_name {
            bail!(ErrorKind::ConfigError(format!(
                "manifest metadata.name '{}' does not match model_name '{}'",
                self.metadata_name(),
                model_name
            )));
        }
        Ok(())
    }

    /// Inject `model-id` at `metadata.labels` and
    /// `spec.predictor.template.metadata.labels` (spec.md §4.4 step 3).
    pub fn inject_model_id_label(&mut self, model_id: &str) -> Result<()> {
        insert_label(&mut self.raw, &["metadata", "labels"], MODEL_ID_LABEL, model_id)?;
        insert_label(
            &mut self.raw,
            &["spec", "predictor", "template", "metadata", "labels"],
            MODEL_ID_LABEL,
            model_id,
        )?;
        Ok(())
    }

    /// Extract the resource requirement triple (spec.md §4.3 step 1):
    /// the first predictor container for `InferenceService`, summed across
    /// containers for a generic `Deployment`.
    pub fn requirement(&self, use_limits: bool) -> Result<ResourceAsk> {
        let containers = match self.kind() {
            "InferenceService" => self.predictor_containers()?,
            "Deployment" => self.deployment_containers()?,
            other => bail!(ErrorKind::ConfigError(format!("unsupported manifest kind '{}'", other))),
        };
        if containers.is_empty() {
            bail!(ErrorKind::ConfigError("manifest declares no containers".into()));
        }
        if self.kind() == "InferenceService" {
            Ok(containers[0].ask(use_limits))
        } else {
            let mut total = ResourceAsk::default();
            for c in &containers {
                let ask = c.ask(use_limits);
                total.cpu_cores += ask.cpu_cores;
                total.mem_gib += ask.mem_gib;
                total.gpu_count += ask.gpu_count;
            }
            total.cpu_cores = crate::resources::round2(total.cpu_cores);
            Ok(total)
        }
    }

    fn predictor_containers(&self) -> Result<Vec<Resources<f64>>> {
        let resources_node = self
            .raw
            .get("spec")
            .and_then(|s| s.get("predictor"))
            .and_then(|p| p.get("containers"))
            .cloned();
        let node = match resources_node {
            Some(Value::Sequence(seq)) => seq,
            _ => {
                // single-container predictor shorthand: spec.predictor.<runtime>.resources
                let single = self
                    .raw
                    .get("spec")
                    .and_then(|s| s.get("predictor"))
                    .and_then(find_resources_block);
                return match single {
                    Some(r) => Ok(vec![parse_resources(r)?]),
                    None => Ok(vec![]),
                };
            }
        };
        let mut out = Vec::with_capacity(node.len());
        for c in node {
            if let Some(r) = c.get("resources") {
                out.push(parse_resources(r)?);
            }
        }
        Ok(out)
    }

    fn deployment_containers(&self) -> Result<Vec<Resources<f64>>> {
        let seq = self
            .raw
            .get("spec")
            .and_then(|s| s.get("template"))
            .and_then(|t| t.get("spec"))
            .and_then(|s| s.get("containers"))
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(seq.len());
        for c in seq {
            if let Some(r) = c.get("resources") {
                out.push(parse_resources(r)?);
            }
        }
        Ok(out)
    }
}

/// Walk a predictor block (e.g. `spec.predictor.sklearn`) looking for the
/// first nested `resources:` map, tolerating the runtime-keyed shorthand
/// InferenceService manifests commonly use.
fn find_resources_block(predictor: &Value) -> Option<&Value> {
    if let Value::Mapping(map) = predictor {
        for (_, v) in map {
            if let Some(r) = v.get("resources") {
                return Some(r);
            }
        }
    }
    None
}

fn parse_resources(node: &Value) -> Result<Resources<f64>> {
    let cpu = |section: &str, key: &str| -> String {
        node.get(section)
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                node.get(section)
                    .and_then(|s| s.get(key))
                    .and_then(Value::as_i64)
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            })
    };
    let gpu = |section: &str| -> Option<String> {
        node.get(section).and_then(Value::as_mapping).and_then(|m| {
            m.iter().find_map(|(k, v)| {
                let key = k.as_str()?;
                if key.ends_with("/gpu") {
                    v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string()))
                } else {
                    None
                }
            })
        })
    };
    let stringy = Resources {
        requests: crate::resources::ResourceRequest {
            cpu: cpu("requests", "cpu"),
            memory: cpu("requests", "memory"),
            gpu: gpu("requests"),
        },
        limits: crate::resources::ResourceLimit {
            cpu: cpu("limits", "cpu"),
            memory: cpu("limits", "memory"),
            gpu: gpu("limits"),
        },
    };
    stringy.normalised()
}

/// Set `labels[key] = value` at the mapping reached by `path`, creating any
/// missing intermediate mappings (the manifest may not declare `labels` yet).
fn insert_label(root: &mut Value, path: &[&str], key: &str, value: &str) -> Result<()> {
    let mut cur = root;
    for segment in path {
        if !matches!(cur, Value::Mapping(_)) {
            *cur = Value::Mapping(Default::default());
        }
        let map = cur.as_mapping_mut().unwrap();
        cur = map
            .entry(Value::String((*segment).to_string()))
            .or_insert_with(|| Value::Mapping(Default::default()));
    }
    if !matches!(cur, Value::Mapping(_)) {
        *cur = Value::Mapping(Default::default());
    }
    cur.as_mapping_mut()
        .unwrap()
        .insert(Value::String(key.to_string()), Value::String(value.to_string()));
    Ok(())
}

/// Flatten a manifest's top-level labels, for reverse lookup by `model-id`.
pub fn top_level_labels(m: &ServingManifest) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(Value::Mapping(map)) = m.raw.get("metadata").and_then(|md| md.get("labels")) {
        for (k, v) in map {
            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                out.insert(k.to_string(), v.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISVC: &str = r#"
apiVersion: serving.kserve.io/v1beta1
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
          cpu: "4"
          memory: "16Gi"
          nvidia.com/gpu: "1"
"#;

    #[test]
    fn verifies_kind_and_name() {
        let m = ServingManifest::parse(ISVC).unwrap();
        assert!(m.verify_identity("alpha").is_ok());
        assert!(m.verify_identity("beta").is_err());
    }

    #[test]
    fn injects_model_id_labels_at_both_levels() {
        let mut m = ServingManifest::parse(ISVC).unwrap();
        m.inject_model_id_label("A").unwrap();
        assert_eq!(top_level_labels(&m).get(MODEL_ID_LABEL).unwrap(), "A");
        let predictor_label = m
            .raw
            .get("spec")
            .and_then(|s| s.get("predictor"))
            .and_then(|p| p.get("template"))
            .and_then(|t| t.get("metadata"))
            .and_then(|md| md.get("labels"))
            .and_then(|l| l.get(MODEL_ID_LABEL))
            .and_then(Value::as_str);
        assert_eq!(predictor_label, Some("A"));
    }

    #[test]
    fn extracts_predictor_requirement_using_limits() {
        let m = ServingManifest::parse(ISVC).unwrap();
        let ask = m.requirement(true).unwrap();
        assert_eq!(ask.cpu_cores, 4.0);
        assert_eq!(ask.mem_gib, 16.0);
        assert_eq!(ask.gpu_count, 1);
    }

    #[test]
    fn extracts_predictor_requirement_using_requests() {
        let m = ServingManifest::parse(ISVC).unwrap();
        let ask = m.requirement(false).unwrap();
        assert_eq!(ask.cpu_cores, 2.0);
        assert_eq!(ask.mem_gib, 8.0);
    }

    #[test]
    fn rejects_non_inference_service_kind() {
        let m = ServingManifest::parse("kind: Pod\nmetadata:\n  name: x\n").unwrap();
        assert!(m.verify_identity("x").is_err());
    }

    #[test]
    fn deployment_sums_across_containers() {
        let yaml = r#"
kind: Deployment
metadata:
  name: alpha
spec:
  template:
    spec:
      containers:
      - name: a
        resources:
          requests: {cpu: "1", memory: "2Gi"}
          limits: {cpu: "2", memory: "4Gi"}
      - name: b
        resources:
          requests: {cpu: "1", memory: "2Gi"}
          limits: {cpu: "2", memory: "4Gi"}
"#;
        let m = ServingManifest::parse(yaml).unwrap();
        let ask = m.requirement(true).unwrap();
        assert_eq!(ask.cpu_cores, 4.0);
        assert_eq!(ask.mem_gib, 8.0);
    }
}

//! Lifecycle states and the discovery-store (znode) payload shape.
//!
//! Grounded in the teacher's `states::ManifestType` enum shape (a small
//! closed set of states with a `Default` impl) and in `crds::Crd<T>` for the
//! "wrap plain data for the wire" pattern — here the wire is a JSON znode
//! payload rather than a CRD, per spec.md §3/§9 ("Dynamic typing around JSON
//! payloads becomes a tagged sum for znode payload").

use std::collections::BTreeMap;

use serde_json::Value;

use crate::Result;

/// `{Absent, Warming, Active, Cooling}` — spec.md §3 "Lifecycle States".
///
/// `Absent` has no znode representation (it is the absence of a record in
/// all three state directories) so it is not a variant of [`DeploymentRecord`]
/// but is used by the Orchestrator to describe "no record found".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Warming,
    Active,
    Cooling,
}

impl LifecycleState {
    /// The znode directory segment for this state, e.g. `/models/active/{id}`.
    pub fn path_segment(self) -> &'static str {
        match self {
            LifecycleState::Warming => "warming",
            LifecycleState::Active => "active",
            LifecycleState::Cooling => "cooling",
        }
    }

    pub fn all() -> [LifecycleState; 3] {
        [LifecycleState::Warming, LifecycleState::Active, LifecycleState::Cooling]
    }
}

/// Sentinel values `ip` can hold while a model is warming or cooling
/// (spec.md §3 "Deployment Record").
pub const WARMING_SENTINEL: &str = "WARMING";
pub const COOLING_SENTINEL: &str = "COOLING";

/// The JSON payload stored at `/models/{state}/{id}` (spec.md §3/§6).
///
/// Writers always emit the modern shape; readers additionally tolerate a
/// bare legacy IP string (spec.md §4.2, §8 scenario 6). `extra` carries any
/// additional keys a payload may hold, in particular the `original_state` /
/// `original_payload` pair a Cooling record stores for restoration
/// (spec.md §3 "Cooling additionally carries...").
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeploymentRecord {
    pub ip: String,
    pub model_name: String,
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub model_repo_id: String,
    #[serde(default)]
    pub deployment_type: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DeploymentRecord {
    pub fn new(ip: impl Into<String>, model_name: impl Into<String>, model_type: impl Into<String>, model_repo_id: impl Into<String>) -> Self {
        DeploymentRecord {
            ip: ip.into(),
            model_name: model_name.into(),
            model_type: model_type.into(),
            model_repo_id: model_repo_id.into(),
            deployment_type: "modern".into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn warming(model_name: &str, model_type: &str, model_repo_id: &str) -> Self {
        Self::new(WARMING_SENTINEL, model_name, model_type, model_repo_id)
    }

    pub fn cooling(original_state: LifecycleState, original_payload: &DeploymentRecord) -> Result<Self> {
        let mut rec = Self::new(
            COOLING_SENTINEL,
            original_payload.model_name.clone(),
            original_payload.model_type.clone(),
            original_payload.model_repo_id.clone(),
        );
        rec.extra.insert("original_state".into(), Value::String(original_state.path_segment().into()));
        rec.extra.insert("original_payload".into(), serde_json::to_value(original_payload)?);
        Ok(rec)
    }

    /// Decode the `original_state`/`original_payload` a Cooling record carries,
    /// used by `Stop`'s rollback to restore a model to where it was.
    pub fn restore_target(&self) -> Option<(LifecycleState, DeploymentRecord)> {
        let state = match self.extra.get("original_state")?.as_str()? {
            "warming" => LifecycleState::Warming,
            "active" => LifecycleState::Active,
            _ => return None,
        };
        let payload: DeploymentRecord = serde_json::from_value(self.extra.get("original_payload")?.clone()).ok()?;
        Some((state, payload))
    }

    /// Decode a raw znode payload, tolerating the legacy bare-IP format
    /// (spec.md §4.2, §8 scenario 6: `"10.1.2.3"` -> `{ip, deployment_type="legacy", model_name="unknown"}`).
    pub fn decode(raw: &[u8]) -> Self {
        match serde_json::from_slice::<DeploymentRecord>(raw) {
            Ok(rec) => rec,
            Err(_) => {
                let ip = String::from_utf8_lossy(raw).trim_matches('"').to_string();
                let mut rec = DeploymentRecord::new(ip, "unknown", "", "");
                rec.deployment_type = "legacy".into();
                rec
            }
        }
    }

    pub fn is_warming_sentinel(&self) -> bool {
        self.ip == WARMING_SENTINEL
    }

    pub fn is_cooling_sentinel(&self) -> bool {
        self.ip == COOLING_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_modern_payload() {
        let raw = br#"{"ip":"10.0.0.1:80","model_name":"alpha","model_type":"llm","model_repo_id":"org/alpha","deployment_type":"modern"}"#;
        let rec = DeploymentRecord::decode(raw);
        assert_eq!(rec.ip, "10.0.0.1:80");
        assert_eq!(rec.deployment_type, "modern");
    }

    #[test]
    fn decodes_legacy_bare_ip() {
        let rec = DeploymentRecord::decode(br#""10.1.2.3""#);
        assert_eq!(rec.ip, "10.1.2.3");
        assert_eq!(rec.deployment_type, "legacy");
        assert_eq!(rec.model_name, "unknown");
    }

    #[test]
    fn cooling_record_round_trips_restore_target() {
        let original = DeploymentRecord::new("10.0.0.5:80", "alpha", "llm", "org/alpha");
        let cooling = DeploymentRecord::cooling(LifecycleState::Active, &original).unwrap();
        let (state, payload) = cooling.restore_target().unwrap();
        assert_eq!(state, LifecycleState::Active);
        assert_eq!(payload, original);
    }

    #[test]
    fn sentinels_are_recognised() {
        assert!(DeploymentRecord::warming("alpha", "llm", "org/alpha").is_warming_sentinel());
    }
}

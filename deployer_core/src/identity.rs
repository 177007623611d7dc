//! Stable identity of a model deployment.
//!
//! Grounded in the teacher's `shipcat_definitions::structs::metadata` shape
//! (a small plain-data struct carried alongside the manifest) but reduced to
//! exactly the fields spec.md §3 names.

use regex::Regex;

use crate::{ErrorKind, Result};

/// `{model_id, model_name, model_repo_id, model_type}` — spec.md §3 "Model Identity".
///
/// `model_id` is opaque and globally unique; `model_name` is additionally
/// required to be DNS-safe since it becomes a Kubernetes object name and
/// label value (spec.md §9 Open Question: both are assumed unique here).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelIdentity {
    pub model_id: String,
    pub model_name: String,
    pub model_repo_id: String,
    pub model_type: String,
}

impl ModelIdentity {
    pub fn new(model_id: impl Into<String>, model_name: impl Into<String>, model_repo_id: impl Into<String>, model_type: impl Into<String>) -> Result<Self> {
        let id = ModelIdentity {
            model_id: model_id.into(),
            model_name: model_name.into(),
            model_repo_id: model_repo_id.into(),
            model_type: model_type.into(),
        };
        id.verify()?;
        Ok(id)
    }

    /// DNS-safe label/object-name check: lowercase alphanumerics and `-`,
    /// starting and ending with an alphanumeric, max 63 chars (RFC 1123 label).
    pub fn verify(&self) -> Result<()> {
        if self.model_id.is_empty() {
            bail!(ErrorKind::ConfigError("model_id must not be empty".into()));
        }
        let dns_label = Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").unwrap();
        if !dns_label.is_match(&self.model_name) || self.model_name.len() > 63 {
            bail!(ErrorKind::ConfigError(format!(
                "model_name '{}' is not a valid DNS label",
                self.model_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_safe_name() {
        assert!(ModelIdentity::new("A", "llama-3-8b", "org/llama-3-8b", "text-generation").is_ok());
    }

    #[test]
    fn rejects_uppercase_name() {
        assert!(ModelIdentity::new("A", "Llama3", "org/llama3", "text-generation").is_err());
    }

    #[test]
    fn rejects_empty_id() {
        assert!(ModelIdentity::new("", "llama3", "org/llama3", "text-generation").is_err());
    }
}

//! Process configuration assembled once from environment variables
//! (spec.md §6 "Configuration (enumerated)", §9 "Global module state becomes
//! a `Config` value constructed at startup and injected").
//!
//! Grounded in the teacher's `shipcat_definitions::config` precedent of a
//! plain struct built by a constructor rather than read ad hoc at call
//! sites; there is no process-wide mutable state here.

use std::env;

use crate::{ErrorKind, Result};

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| ErrorKind::ConfigError(format!("missing required environment variable {}", name)).into())
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Everything the control plane reads from the process environment at
/// startup (spec.md §6). Constructed once via [`Config::from_env`] and
/// cloned into each collaborator; nothing re-reads the environment later.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace for inference resources. Default `huggingface-models`.
    pub serving_namespace: String,
    /// Namespace for the control plane's own presence znode. Default `semoss`.
    pub control_namespace: String,
    /// Comma-separated znode server list.
    pub discovery_hosts: Vec<String>,
    /// Optional name of a registry pull secret.
    pub image_pull_secret: Option<String>,
    /// Primary ("serving") cluster context name.
    pub primary_context: String,
    /// Secondary ("egress") cluster context name, if cross-cluster routing
    /// is enabled.
    pub secondary_context: Option<String>,
    /// Path to a mounted kubeconfig in production.
    pub kubeconfig_path: Option<String>,
    /// Blob bucket holding manifests and node-pool config.
    pub resource_bucket_name: String,
    /// Comma-separated shared secrets accepted by the control-plane API.
    pub api_keys: Vec<String>,
    /// Selects local-kubeconfig credential resolution over in-cluster.
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discovery_hosts = required("DISCOVERY_HOSTS")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if discovery_hosts.is_empty() {
            bail!(ErrorKind::ConfigError("DISCOVERY_HOSTS must list at least one host".into()));
        }
        let api_keys = required("API_KEYS")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if api_keys.is_empty() {
            bail!(ErrorKind::ConfigError("API_KEYS must list at least one key".into()));
        }
        Ok(Config {
            serving_namespace: optional("SERVING_NAMESPACE", "huggingface-models"),
            control_namespace: optional("CONTROL_NAMESPACE", "semoss"),
            discovery_hosts,
            image_pull_secret: env::var("IMAGE_PULL_SECRET").ok(),
            primary_context: required("PRIMARY_CONTEXT")?,
            secondary_context: env::var("SECONDARY_CONTEXT").ok(),
            kubeconfig_path: env::var("KUBECONFIG_PATH").ok(),
            resource_bucket_name: required("RESOURCE_BUCKET_NAME")?,
            api_keys,
            dev_mode: matches!(env::var("DEV_MODE").as_deref(), Ok("1") | Ok("true") | Ok("TRUE")),
        })
    }

    pub fn accepts_key(&self, candidate: &str) -> bool {
        self.api_keys.iter().any(|k| k == candidate)
    }

    pub fn discovery_hosts_csv(&self) -> String {
        self.discovery_hosts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        for k in [
            "SERVING_NAMESPACE",
            "CONTROL_NAMESPACE",
            "DISCOVERY_HOSTS",
            "IMAGE_PULL_SECRET",
            "PRIMARY_CONTEXT",
            "SECONDARY_CONTEXT",
            "KUBECONFIG_PATH",
            "RESOURCE_BUCKET_NAME",
            "API_KEYS",
            "DEV_MODE",
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_and_required_fields() {
        let _g = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("DISCOVERY_HOSTS", "zk1:2181,zk2:2181");
        env::set_var("API_KEYS", "secret-a");
        env::set_var("PRIMARY_CONTEXT", "serving-cluster");
        env::set_var("RESOURCE_BUCKET_NAME", "models-bucket");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.serving_namespace, "huggingface-models");
        assert_eq!(cfg.control_namespace, "semoss");
        assert_eq!(cfg.discovery_hosts, vec!["zk1:2181", "zk2:2181"]);
        assert!(cfg.accepts_key("secret-a"));
        assert!(!cfg.accepts_key("other"));
        clear();
    }

    #[test]
    fn missing_required_var_fails() {
        let _g = ENV_LOCK.lock().unwrap();
        clear();
        assert!(Config::from_env().is_err());
        clear();
    }
}

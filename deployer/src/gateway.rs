//! Holds a mapping from context-name to client configuration for the
//! primary ("serving") and optional secondary ("egress") clusters
//! (spec.md §4.1 "Cluster Gateway").
//!
//! Grounded in the teacher's `kubeapi::make_client` precedence (in-cluster
//! config, then a mounted kubeconfig, then the local kubeconfig) but
//! generalised from a single implicit client to a named map, since this
//! control plane talks to two clusters.

use std::collections::HashMap;

use kube::client::APIClient;
use kube::config::Configuration;

use deployer_core::Config;

use crate::{Error, ErrorKind, Result};

/// A bound client for one named cluster context.
#[derive(Clone)]
pub struct ContextClient {
    pub context: String,
    pub client: APIClient,
}

/// Immutable after construction: the mapping context-name -> client is
/// built once at startup and never mutated (spec.md §4.1 "No caching of API
/// objects; the mapping itself is immutable after init").
pub struct ClusterGateway {
    contexts: HashMap<String, ContextClient>,
}

impl ClusterGateway {
    /// Resolve both the primary and (if configured) secondary context's
    /// clients, using the precedence spec.md §4.1 requires: (1) in-cluster
    /// credentials, (2) a mounted kubeconfig path, (3) the local kubeconfig.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let mut contexts = HashMap::new();

        let primary_cfg = Self::resolve_serving_config(cfg).await?;
        contexts.insert(
            cfg.primary_context.clone(),
            ContextClient { context: cfg.primary_context.clone(), client: APIClient::new(primary_cfg) },
        );

        if let Some(secondary) = &cfg.secondary_context {
            let secondary_cfg = Self::resolve_egress_config(cfg)?;
            contexts.insert(secondary.clone(), ContextClient { context: secondary.clone(), client: APIClient::new(secondary_cfg) });
        }

        Ok(ClusterGateway { contexts })
    }

    async fn resolve_serving_config(cfg: &Config) -> Result<Configuration> {
        if let Ok(incluster) = kube::config::incluster_config() {
            info!("Using in-cluster credentials for {}", cfg.primary_context);
            return Ok(incluster);
        }
        if let Some(path) = &cfg.kubeconfig_path {
            info!("Loading mounted kubeconfig from {}", path);
            std::env::set_var("KUBECONFIG", path);
            return kube::config::load_kube_config().await.map_err(|e| ErrorKind::Kube(e).into());
        }
        if cfg.dev_mode {
            info!("DEV_MODE set; loading local kubeconfig");
            return kube::config::load_kube_config().await.map_err(|e| ErrorKind::Kube(e).into());
        }
        bail!(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(
            "no in-cluster credentials, KUBECONFIG_PATH, or DEV_MODE local kubeconfig available for the primary cluster".into()
        )))
    }

    /// The secondary ("egress") cluster uses a bearer-token + host override
    /// path rather than a kubeconfig (spec.md §4.1 "For the secondary
    /// context a bearer-token + host override path is also supported").
    fn resolve_egress_config(cfg: &Config) -> Result<Configuration> {
        let host = std::env::var("SECONDARY_CLUSTER_HOST").map_err(|_| {
            Error::from(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(
                "SECONDARY_CONTEXT is set but SECONDARY_CLUSTER_HOST is missing".into(),
            )))
        })?;
        let token = std::env::var("SECONDARY_CLUSTER_TOKEN").map_err(|_| {
            Error::from(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(
                "SECONDARY_CONTEXT is set but SECONDARY_CLUSTER_TOKEN is missing".into(),
            )))
        })?;
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            Error::from(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(format!("invalid bearer token: {}", e))))
        })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ErrorKind::Http)?;
        Ok(Configuration { base_path: host, client, default_ns: cfg.serving_namespace.clone() })
    }

    /// Returns the bound client for `ctx`; unknown context fails with
    /// `ConfigError` (spec.md §4.1 "unknown context fails with ConfigError").
    pub fn get(&self, ctx: &str) -> Result<&ContextClient> {
        self.contexts.get(ctx).ok_or_else(|| {
            Error::from(ErrorKind::Core(deployer_core::ErrorKind::ConfigError(format!("unknown cluster context '{}'", ctx))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_context_is_config_error() {
        let gw = ClusterGateway { contexts: HashMap::new() };
        let err = gw.get("missing").unwrap_err();
        assert!(err.to_string().contains("unknown cluster context"));
    }
}

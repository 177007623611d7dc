//! Probes the external health endpoint until success or timeout
//! (spec.md §4.6 "Readiness Gate").

use std::time::Duration;

use crate::traits::ExposureApi;
use crate::{Error, ErrorKind, Result};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(500);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_ADDRESS_FAILURES: u32 = 3;

pub struct ReadinessGate {
    client: reqwest::Client,
    deadline: Duration,
}

impl ReadinessGate {
    pub fn new() -> Self {
        ReadinessGate { client: reqwest::Client::new(), deadline: DEFAULT_DEADLINE }
    }

    /// Callers may raise the deadline for models that must be downloaded
    /// lazily (spec.md §4.6).
    pub fn with_deadline(deadline: Duration) -> Self {
        ReadinessGate { client: reqwest::Client::new(), deadline }
    }

    /// Polls `http://{lb_ip}:80/v2/health/ready` every 5s until a response
    /// with status < 400, or the deadline elapses. If resolving the
    /// external address itself fails three consecutive times, aborts with
    /// `ExposureTimeout` (spec.md §4.6). Never mutates discovery state.
    pub async fn wait(&self, exposure: &dyn ExposureApi, model_name: &str) -> Result<bool> {
        let start = tokio::time::Instant::now();
        let mut address_failures = 0u32;

        loop {
            let remaining = self.deadline.checked_sub(start.elapsed()).unwrap_or(Duration::from_secs(0));
            if remaining.is_zero() {
                return Ok(false);
            }
            match exposure.get_external_address(model_name, remaining.min(Duration::from_secs(30))).await {
                Ok(Some(lb_ip)) => {
                    address_failures = 0;
                    let url = format!("http://{}:80/v2/health/ready", lb_ip);
                    if let Ok(resp) = self.client.get(&url).send().await {
                        if resp.status().as_u16() < 400 {
                            return Ok(true);
                        }
                    }
                }
                Ok(None) => return Ok(false),
                Err(_) => {
                    address_failures += 1;
                    if address_failures >= MAX_ADDRESS_FAILURES {
                        return Err(Error::from(ErrorKind::Core(deployer_core::ErrorKind::ExposureTimeout(format!(
                            "could not resolve external address for '{}' after {} attempts",
                            model_name, MAX_ADDRESS_FAILURES
                        )))));
                    }
                }
            }
            if start.elapsed() >= self.deadline {
                return Ok(false);
            }
            tokio::time::delay_for(POLL_INTERVAL).await;
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl crate::traits::ReadinessApi for ReadinessGate {
    async fn wait(&self, exposure: &dyn ExposureApi, model_name: &str) -> Result<bool> {
        ReadinessGate::wait(self, exposure, model_name).await
    }
}

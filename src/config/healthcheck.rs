// ABOUTME: Container health check configuration.
// ABOUTME: A shell command run inside the container, with compose-style timing.

use serde::Deserialize;
use std::time::Duration;

use crate::stack::HealthSpec;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthcheckConfig {
    pub cmd: String,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    /// HTTP path the proxy probes as well, when set.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    3
}

impl HealthcheckConfig {
    pub fn to_spec(&self) -> HealthSpec {
        HealthSpec {
            command: self.cmd.clone(),
            interval: self.interval,
            timeout: self.timeout,
            retries: self.retries,
            path: self.path.clone(),
        }
    }
}

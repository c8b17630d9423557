use eyre::{
    eyre,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    time::Duration,
};
use url::Url;

/// Connection and collection settings for one load balancer. Every entry
/// gets its own independent engine.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LbServerConfig {
    pub url: Url,
    pub user: String,
    pub pass: String,
    #[serde(default)]
    pub ignore_cert: bool,
    /// Number of API sessions, which is also the number of dispatch workers.
    #[serde(default = "defaults::pool_workers")]
    pub pool_workers: usize,
    /// Capacity of the bounded task queue.
    #[serde(default = "defaults::pool_worker_queue")]
    pub pool_worker_queue: usize,
    #[serde(default = "defaults::http_timeout", with = "humantime_serde")]
    pub http_timeout: Duration,
    #[serde(default = "defaults::collection_interval", with = "humantime_serde")]
    pub collection_interval: Duration,
    /// Per-target retries wait `attempt * retry_delay_unit`.
    #[serde(default = "defaults::retry_delay_unit", with = "humantime_serde")]
    pub retry_delay_unit: Duration,
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    #[serde(default = "defaults::backoff_max_multiplier")]
    pub backoff_max_multiplier: u32,
    /// Subsystem names, e.g. `lbvserver` or `service`.
    #[serde(default)]
    pub metrics: Vec<String>,
}

mod defaults {
    use std::time::Duration;

    pub(super) fn pool_workers() -> usize {
        4
    }

    pub(super) fn pool_worker_queue() -> usize {
        1000
    }

    pub(super) fn http_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub(super) fn collection_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub(super) fn retry_delay_unit() -> Duration {
        Duration::from_secs(1)
    }

    pub(super) fn max_retries() -> u32 {
        3
    }

    pub(super) fn backoff_max_multiplier() -> u32 {
        5
    }
}

impl LbServerConfig {
    /// Label used for every series and log line of this load balancer: the
    /// URL host, plus the port when it is not the scheme default.
    pub fn instance_name(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.host_str().is_none() {
            return Err(eyre!("lbserver url {} has no host", self.url));
        }
        if self.pool_workers == 0 {
            return Err(eyre!("{}: pool_workers must be at least 1", self.instance_name()));
        }
        if self.pool_worker_queue == 0 {
            return Err(eyre!("{}: pool_worker_queue must be at least 1", self.instance_name()));
        }
        if self.collection_interval.is_zero() {
            return Err(eyre!("{}: collection_interval must be non-zero", self.instance_name()));
        }
        Ok(())
    }
}

// Avoid printing the password.
impl fmt::Debug for LbServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LbServerConfig")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .field("pass_len", &self.pass.len())
            .field("ignore_cert", &self.ignore_cert)
            .field("pool_workers", &self.pool_workers)
            .field("pool_worker_queue", &self.pool_worker_queue)
            .field("http_timeout", &self.http_timeout)
            .field("collection_interval", &self.collection_interval)
            .field("retry_delay_unit", &self.retry_delay_unit)
            .field("max_retries", &self.max_retries)
            .field("backoff_max_multiplier", &self.backoff_max_multiplier)
            .field("metrics", &self.metrics)
            .finish()
    }
}

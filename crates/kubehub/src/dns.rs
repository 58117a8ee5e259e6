use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;
use trellis_core::{Error, Result};

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Block until `host` resolves, returning the first address. Gives up after
    /// the resolver's own timeout.
    async fn wait_resolvable(&self, host: &str) -> Result<IpAddr>;
}

/// Polls the system resolver until the name resolves or the timeout passes.
#[derive(Debug, Clone)]
pub struct PollingResolver {
    timeout: Duration,
    interval: Duration,
}

impl Default for PollingResolver {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(600), interval: Duration::from_secs(5) }
    }
}

impl PollingResolver {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Default timings, with the timeout overridable by `TRELLIS_DNS_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut r = Self::default();
        if let Some(secs) = std::env::var("TRELLIS_DNS_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()) {
            r.timeout = Duration::from_secs(secs);
        }
        r
    }
}

#[async_trait]
impl HostResolver for PollingResolver {
    async fn wait_resolvable(&self, host: &str) -> Result<IpAddr> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, tokio::net::lookup_host((host, 0))).await {
                Ok(Ok(mut addrs)) => {
                    if let Some(addr) = addrs.next() {
                        debug!(host = %host, ip = %addr.ip(), "host resolvable");
                        return Ok(addr.ip());
                    }
                }
                Ok(Err(e)) => debug!(host = %host, error = %e, "host not resolvable yet"),
                Err(_) => {}
            }
            if Instant::now() + self.interval >= deadline {
                return Err(Error::Dns {
                    host: host.to_string(),
                    message: format!("not resolvable within {}s", self.timeout.as_secs()),
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

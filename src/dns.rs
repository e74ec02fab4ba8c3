use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Best-effort domain resolution used by the links check. Resolution failure
/// means the domain is simply not counted; it is never an error.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolves(&self, domain: &str) -> bool;
}

/// Resolver backed by the runtime's host lookup, bounded by a short timeout
/// so a slow nameserver cannot stall check evaluation.
pub struct TokioResolver {
    timeout: Duration,
}

impl TokioResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl DnsResolver for TokioResolver {
    async fn resolves(&self, domain: &str) -> bool {
        let lookup = tokio::net::lookup_host((domain, 443));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!(domain, error = %e, "domain did not resolve");
                false
            }
            Err(_) => {
                debug!(domain, "domain lookup timed out");
                false
            }
        }
    }
}

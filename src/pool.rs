//! Bounded, origin-keyed HTTP connection pool.
//!
//! Every LLM call checks a transport out of a pool before touching the
//! network. Pooling amortizes TLS handshakes across many parallel agent
//! calls and gives the process one arbitration point for outbound
//! concurrency: at most `max_connections` transports exist at any time,
//! counting both idle and checked-out handles.
//!
//! # Acquire Protocol
//!
//! [`HttpPool::acquire`] takes the origin (`scheme://host:port`) of the
//! request:
//!
//! 1. an idle transport for that origin is reused (**hit**);
//! 2. otherwise, below capacity, a fresh transport is built (**miss**);
//! 3. otherwise the caller waits up to the configured acquire timeout
//!    for a release, then fails with `PoolExhausted`.
//!
//! Transports check themselves back in on drop. After a transport-level
//! failure, call [`PooledTransport::discard`] instead so the broken
//! connection is dropped and its capacity slot freed.
//!
//! # Sharing
//!
//! The pool is an explicit `Arc` value: construct one with
//! [`HttpPool::new`] and thread it through, or use the lazily
//! initialized process-wide default from [`HttpPool::shared`]. All
//! internal state is behind a mutex; the pool is safe to use from many
//! tasks concurrently.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live transports (idle + checked out)
    pub max_connections: usize,

    /// How long `acquire` waits at capacity before `PoolExhausted`
    pub acquire_timeout: Duration,

    /// Verify server certificates (disable only against local stubs)
    pub verify_tls: bool,

    /// Additional PEM CA bundle trusted by every transport
    pub ca_bundle: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
            verify_tls: true,
            ca_bundle: None,
        }
    }
}

/// Point-in-time pool counters.
///
/// `active` counts live transports; `hits + misses` equals the number of
/// successful acquires since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

// ============================================================================
// POOL
// ============================================================================

#[derive(Default, Debug)]
struct PoolState {
    idle: HashMap<String, Vec<reqwest::Client>>,
    active: usize,
    hits: u64,
    misses: u64,
}

/// Bounded cache of reusable HTTP transports, keyed by origin.
pub struct HttpPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Notify,
}

static SHARED_POOL: Lazy<Arc<HttpPool>> =
    Lazy::new(|| HttpPool::new(PoolConfig::default()).expect("default pool config is valid"));

impl HttpPool {
    /// Build a pool with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArg` for a zero capacity or an unreadable CA
    /// bundle path.
    pub fn new(config: PoolConfig) -> Result<Arc<Self>> {
        if config.max_connections == 0 {
            return Err(Error::invalid_arg("max_connections must be at least 1"));
        }
        if let Some(path) = &config.ca_bundle {
            // Fail at construction, not on the first request.
            std::fs::metadata(path).map_err(|e| {
                Error::invalid_arg(format!("ca_bundle {}: {e}", path.display()))
            })?;
        }

        Ok(Arc::new(Self {
            config,
            state: Mutex::new(PoolState::default()),
            released: Notify::new(),
        }))
    }

    /// The lazily initialized process-wide default pool.
    pub fn shared() -> Arc<HttpPool> {
        SHARED_POOL.clone()
    }

    /// Check a transport out for the given origin.
    pub async fn acquire(self: &Arc<Self>, origin: &str) -> Result<PooledTransport> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            {
                let mut state = self.state.lock().expect("pool mutex poisoned");

                if let Some(client) = state.idle.get_mut(origin).and_then(Vec::pop) {
                    state.hits += 1;
                    trace!(origin, "pool hit");
                    return Ok(PooledTransport::new(self.clone(), origin, client));
                }

                if state.active < self.config.max_connections {
                    state.active += 1;
                    match self.build_client() {
                        Ok(client) => {
                            state.misses += 1;
                            debug!(origin, active = state.active, "pool miss, new transport");
                            return Ok(PooledTransport::new(self.clone(), origin, client));
                        }
                        Err(e) => {
                            state.active -= 1;
                            return Err(e);
                        }
                    }
                }
            }

            let remaining = deadline.checked_duration_since(Instant::now());
            let Some(remaining) = remaining.filter(|d| !d.is_zero()) else {
                debug!(origin, "pool exhausted after acquire timeout");
                return Err(Error::PoolExhausted);
            };

            // Wait for a release, then re-check under the lock.
            if tokio::time::timeout(remaining, self.released.notified())
                .await
                .is_err()
            {
                return Err(Error::PoolExhausted);
            }
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().expect("pool mutex poisoned");
        PoolStats {
            active: state.active,
            capacity: self.config.max_connections,
            hits: state.hits,
            misses: state.misses,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if !self.config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &self.config.ca_bundle {
            let pem = std::fs::read(path)
                .map_err(|e| Error::Tls(format!("reading {}: {e}", path.display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Tls(format!("parsing {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| Error::backend(format!("building HTTP client: {e}")))
    }

    fn check_in(&self, origin: &str, client: reqwest::Client, healthy: bool) {
        {
            let mut state = self.state.lock().expect("pool mutex poisoned");
            if healthy {
                state.idle.entry(origin.to_string()).or_default().push(client);
            } else {
                state.active -= 1;
                trace!(origin, active = state.active, "unhealthy transport dropped");
            }
        }
        self.released.notify_one();
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("HttpPool")
            .field("capacity", &stats.capacity)
            .field("active", &stats.active)
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .finish()
    }
}

// ============================================================================
// CHECKED-OUT TRANSPORT
// ============================================================================

/// A transport checked out of the pool.
///
/// Dropping the handle returns the underlying connection to the idle
/// list; [`discard`](PooledTransport::discard) drops it instead and
/// frees the capacity slot.
#[derive(Debug)]
pub struct PooledTransport {
    pool: Arc<HttpPool>,
    origin: String,
    client: Option<reqwest::Client>,
    healthy: bool,
}

impl PooledTransport {
    fn new(pool: Arc<HttpPool>, origin: &str, client: reqwest::Client) -> Self {
        Self {
            pool,
            origin: origin.to_string(),
            client: Some(client),
            healthy: true,
        }
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        self.client.as_ref().expect("transport already released")
    }

    /// Origin this transport was checked out for.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Drop the connection instead of returning it to the idle list.
    /// Call after a transport-level failure.
    pub fn discard(mut self) {
        self.healthy = false;
    }
}

impl Drop for PooledTransport {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.check_in(&self.origin, client, self.healthy);
        }
    }
}

/// Extract `scheme://host[:port]` from a URL for use as a pool key.
pub(crate) fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let authority_end = rest.find('/').unwrap_or(rest.len());
            url[..scheme_end + 3 + authority_end].to_string()
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(capacity: usize, acquire_timeout: Duration) -> Arc<HttpPool> {
        HttpPool::new(PoolConfig {
            max_connections: capacity,
            acquire_timeout,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = HttpPool::new(PoolConfig {
            max_connections: 0,
            ..PoolConfig::default()
        });
        assert!(matches!(result, Err(Error::InvalidArg(_))));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://api.anthropic.com/v1/messages"),
            "https://api.anthropic.com"
        );
        assert_eq!(
            origin_of("http://localhost:1234/v1/chat/completions"),
            "http://localhost:1234"
        );
        assert_eq!(origin_of("http://host:8080"), "http://host:8080");
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let pool = test_pool(2, Duration::from_millis(100));

        let t1 = pool.acquire("http://a").await.unwrap();
        drop(t1);

        let _t2 = pool.acquire("http://a").await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_distinct_origins_do_not_share_idle_handles() {
        let pool = test_pool(4, Duration::from_millis(100));

        drop(pool.acquire("http://a").await.unwrap());
        drop(pool.acquire("http://b").await.unwrap());

        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_active_never_exceeds_capacity() {
        let pool = test_pool(3, Duration::from_millis(20));

        let held: Vec<_> = futures::future::join_all(
            (0..3).map(|_| pool.acquire("http://a")),
        )
        .await
        .into_iter()
        .collect::<Result<_>>()
        .unwrap();

        assert_eq!(pool.stats().active, 3);
        assert!(matches!(
            pool.acquire("http://a").await,
            Err(Error::PoolExhausted)
        ));
        assert_eq!(pool.stats().active, 3);
        drop(held);
    }

    #[tokio::test]
    async fn test_exhaustion_then_release_unblocks() {
        let pool = test_pool(1, Duration::from_millis(50));

        let held = pool.acquire("http://a").await.unwrap();

        // B times out while A holds the only slot.
        let start = std::time::Instant::now();
        let err = pool.acquire("http://a").await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted));
        assert!(start.elapsed() >= Duration::from_millis(45));

        // After A releases, C succeeds as a hit.
        drop(held);
        let _c = pool.acquire("http://a").await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let pool = test_pool(1, Duration::from_millis(500));

        let held = pool.acquire("http://a").await.unwrap();
        let pool_clone = pool.clone();
        let waiter = tokio::spawn(async move { pool_clone.acquire("http://a").await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);

        let transport = waiter.await.unwrap().unwrap();
        assert_eq!(transport.origin(), "http://a");
        assert_eq!(pool.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_discard_frees_capacity_slot() {
        let pool = test_pool(1, Duration::from_millis(50));

        let t = pool.acquire("http://a").await.unwrap();
        t.discard();
        assert_eq!(pool.stats().active, 0);

        // The slot is free again; the next acquire is a fresh miss.
        let _t = pool.acquire("http://a").await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_hits_plus_misses_equals_acquires() {
        let pool = test_pool(2, Duration::from_millis(100));

        for _ in 0..5 {
            let t = pool.acquire("http://a").await.unwrap();
            drop(t);
        }
        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 5);
    }
}

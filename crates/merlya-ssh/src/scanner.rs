//! On-demand host scanner (Module E), grounded in
//! `athena_ai/context/on_demand_scanner.py`.
//!
//! Scans a batch of hosts in parallel with a shared token-bucket rate
//! limit, per-host retry with exponential backoff, and a per-scan-type TTL
//! cache. A single host's failure never aborts its siblings in the batch.

use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    Basic,
    System,
    Services,
    Packages,
    Processes,
    Full,
}

impl ScanType {
    fn cache_ttl(self) -> Duration {
        let secs = match self {
            ScanType::Basic => 300,
            ScanType::System => 1800,
            ScanType::Services => 900,
            ScanType::Packages => 3600,
            ScanType::Processes => 60,
            ScanType::Full => 600,
        };
        Duration::from_secs(secs)
    }

    fn needs_ssh(self) -> bool {
        matches!(
            self,
            ScanType::System | ScanType::Services | ScanType::Packages | ScanType::Processes | ScanType::Full
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub requests_per_second: f64,
    pub burst_size: u32,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            requests_per_second: 5.0,
            burst_size: 10,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub hostname: String,
    pub success: bool,
    pub data: HashMap<String, String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub retries: u32,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    fn failed(hostname: &str, error: String, retries: u32) -> Self {
        Self {
            hostname: hostname.to_string(),
            success: false,
            data: HashMap::new(),
            error: Some(error),
            duration_ms: 0,
            retries,
            scanned_at: Utc::now(),
        }
    }
}

/// Token-bucket rate limiter shared by every [`OnDemandScanner`] instance
/// in the process, via [`shared_rate_limiter`] — prevents bypassing the
/// limit by constructing more scanners.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: burst as f64,
            state: Mutex::new((burst as f64, Instant::now())),
        }
    }

    /// Waits until a token is available, releasing the lock during the
    /// sleep so other callers aren't serialized behind one waiter.
    pub async fn acquire(&self) {
        let wait = {
            let mut guard = self.state.lock();
            let (tokens, last_update) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(last_update).as_secs_f64();
            let tokens = (tokens + elapsed * self.rate).min(self.burst);

            if tokens >= 1.0 {
                *guard = (tokens - 1.0, now);
                None
            } else {
                *guard = (tokens, now);
                Some((1.0 - tokens) / self.rate)
            }
        };

        let Some(wait_secs) = wait else {
            return;
        };

        tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;

        let mut guard = self.state.lock();
        let (tokens, last_update) = *guard;
        let now = Instant::now();
        let elapsed = now.duration_since(last_update).as_secs_f64();
        let tokens = (tokens + elapsed * self.rate).min(self.burst);
        *guard = (tokens - 1.0, now);
    }
}

static SHARED_RATE_LIMITER: OnceLock<Mutex<Option<Arc<RateLimiter>>>> = OnceLock::new();

/// Returns the process-wide rate limiter, constructing it from `config` on
/// first use. Later calls ignore `config` and return the existing limiter,
/// matching the original's "first config wins" module-level singleton.
pub fn shared_rate_limiter(config: &ScanConfig) -> Arc<RateLimiter> {
    let cell = SHARED_RATE_LIMITER.get_or_init(|| Mutex::new(None));
    let mut guard = cell.lock();
    guard
        .get_or_insert_with(|| {
            Arc::new(RateLimiter::new(config.requests_per_second, config.burst_size))
        })
        .clone()
}

struct CacheEntry {
    result: ScanResult,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Performs a single host's scan. Production code plugs in an
/// SSH-backed implementation (via [`crate::pool::SshPool`]); tests use a
/// stub.
#[async_trait::async_trait]
pub trait SshScan: Send + Sync {
    async fn scan(&self, hostname: &str, scan_type: ScanType) -> Result<HashMap<String, String>, String>;
}

pub struct OnDemandScanner {
    config: ScanConfig,
    rate_limiter: Arc<RateLimiter>,
    ssh_scan: Arc<dyn SshScan>,
    cache: Mutex<HashMap<(String, ScanType), CacheEntry>>,
}

impl OnDemandScanner {
    pub fn new(config: ScanConfig, ssh_scan: Arc<dyn SshScan>) -> Self {
        let rate_limiter = shared_rate_limiter(&config);
        Self {
            config,
            rate_limiter,
            ssh_scan,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Scans every host in `hostnames`, serving from cache unless `force`,
    /// running the rest in `batch_size`-wide concurrent batches. One
    /// host's failure is recorded as a failed [`ScanResult`] rather than
    /// aborting the batch.
    pub async fn scan_hosts(
        self: &Arc<Self>,
        hostnames: &[String],
        scan_type: ScanType,
        force: bool,
    ) -> Vec<ScanResult> {
        let mut results = Vec::with_capacity(hostnames.len());
        let mut to_scan = Vec::new();

        for hostname in hostnames {
            if !force {
                if let Some(cached) = self.get_cached(hostname, scan_type) {
                    results.push(cached);
                    continue;
                }
            }
            to_scan.push(hostname.clone());
        }

        if to_scan.is_empty() {
            return results;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.batch_size));
        let mut handles = Vec::with_capacity(to_scan.len());
        for hostname in to_scan {
            let scanner = self.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                scanner.scan_with_retry(&hostname, scan_type).await
            }));
        }

        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => ScanResult::failed("unknown", join_err.to_string(), 0),
            };
            if result.success {
                self.cache_result(result.clone(), scan_type);
            }
            results.push(result);
        }

        results
    }

    pub async fn scan_host(self: &Arc<Self>, hostname: &str, scan_type: ScanType, force: bool) -> ScanResult {
        let hostnames = vec![hostname.to_string()];
        self.scan_hosts(&hostnames, scan_type, force)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| ScanResult::failed(hostname, "no result returned".to_string(), 0))
    }

    fn get_cached(&self, hostname: &str, scan_type: ScanType) -> Option<ScanResult> {
        let guard = self.cache.lock();
        let entry = guard.get(&(hostname.to_string(), scan_type))?;
        entry.is_fresh().then(|| entry.result.clone())
    }

    fn cache_result(&self, result: ScanResult, scan_type: ScanType) {
        let mut guard = self.cache.lock();
        guard.insert(
            (result.hostname.clone(), scan_type),
            CacheEntry {
                result,
                cached_at: Instant::now(),
                ttl: scan_type.cache_ttl(),
            },
        );
    }

    async fn scan_with_retry(&self, hostname: &str, scan_type: ScanType) -> ScanResult {
        let mut attempt = 0u32;
        let mut last_error = String::new();

        while attempt <= self.config.max_retries {
            self.rate_limiter.acquire().await;

            let start = Instant::now();
            match self.perform_scan(hostname, scan_type).await {
                Ok(data) => {
                    return ScanResult {
                        hostname: hostname.to_string(),
                        success: true,
                        data,
                        error: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries: attempt,
                        scanned_at: Utc::now(),
                    };
                }
                Err(error) => {
                    last_error = error;
                    attempt += 1;
                    if attempt <= self.config.max_retries {
                        let delay = (self.config.retry_base_delay
                            * 2u32.pow(attempt.saturating_sub(1)))
                        .min(self.config.retry_max_delay);
                        tracing::debug!(hostname, attempt, ?delay, error = %last_error, "retrying scan");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        ScanResult::failed(hostname, last_error, attempt.saturating_sub(1))
    }

    async fn perform_scan(
        &self,
        hostname: &str,
        scan_type: ScanType,
    ) -> Result<HashMap<String, String>, String> {
        let mut data = HashMap::new();
        data.insert("hostname".to_string(), hostname.to_string());

        let reachable = self.check_connectivity(hostname, 22).await;
        data.insert("reachable".to_string(), reachable.to_string());

        if !reachable {
            return Ok(data);
        }

        if scan_type.needs_ssh() {
            let ssh_data = self
                .ssh_scan
                .scan(hostname, scan_type)
                .await
                .map_err(|e| format!("ssh scan failed: {e}"))?;
            data.extend(ssh_data);
        }

        Ok(data)
    }

    /// Resolves `hostname:port` and tries every returned address in turn
    /// (IPv4 and IPv6 both considered, first to connect wins — no
    /// preference ordering between address families).
    async fn check_connectivity(&self, hostname: &str, port: u16) -> bool {
        let target = format!("{hostname}:{port}");
        let timeout = self.config.connect_timeout;
        tokio::task::spawn_blocking(move || {
            let Ok(addrs) = target.to_socket_addrs() else {
                return false;
            };
            addrs
                .into_iter()
                .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubScan;

    #[async_trait::async_trait]
    impl SshScan for StubScan {
        async fn scan(&self, _hostname: &str, _scan_type: ScanType) -> Result<HashMap<String, String>, String> {
            let mut data = HashMap::new();
            data.insert("os".to_string(), "linux".to_string());
            Ok(data)
        }
    }

    struct FailingScan;

    #[async_trait::async_trait]
    impl SshScan for FailingScan {
        async fn scan(&self, _hostname: &str, _scan_type: ScanType) -> Result<HashMap<String, String>, String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn rate_limiter_allows_burst_then_waits() {
        let limiter = RateLimiter::new(1000.0, 2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn scan_hosts_reports_unreachable_without_ssh() {
        let scanner = Arc::new(OnDemandScanner::new(
            ScanConfig {
                batch_size: 2,
                max_retries: 0,
                ..ScanConfig::default()
            },
            Arc::new(StubScan),
        ));

        let hosts = vec!["203.0.113.254".to_string()];
        let results = scanner.scan_hosts(&hosts, ScanType::Basic, true).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].data.get("reachable"), Some(&"false".to_string()));
    }

    #[tokio::test]
    async fn scan_batch_keeps_siblings_on_one_failure() {
        let scanner = Arc::new(OnDemandScanner::new(
            ScanConfig {
                batch_size: 5,
                max_retries: 0,
                ..ScanConfig::default()
            },
            Arc::new(FailingScan),
        ));

        let hosts = vec!["203.0.113.1".to_string(), "203.0.113.2".to_string()];
        let results = scanner.scan_hosts(&hosts, ScanType::Basic, true).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn scan_type_cache_ttls_match_spec() {
        assert_eq!(ScanType::Basic.cache_ttl(), Duration::from_secs(300));
        assert_eq!(ScanType::Packages.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(ScanType::Processes.cache_ttl(), Duration::from_secs(60));
    }
}

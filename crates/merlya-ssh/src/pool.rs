//! SSH connection pool (Module D), grounded in
//! `athena_ai/executors/ssh_connection_pool.py`.
//!
//! Reuses authenticated connections keyed by `user@host` so repeated
//! commands against the same host don't re-trigger 2FA, with a per-host
//! circuit breaker that fails fast on hosts known to be unreachable.

use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ssh2::Session;

use crate::error::{Result, SshError};
use crate::host_key_policy::HostKeyPolicy;

const DNS_ERROR_MARKERS: &[&str] = &[
    "nodename nor servname provided",
    "name or service not known",
    "temporary failure in name resolution",
    "failed to lookup address information",
];

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle_time: Duration,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_time: Duration::from_secs(3600),
            circuit_breaker_threshold: 3,
            circuit_breaker_timeout: Duration::from_secs(300),
        }
    }
}

/// Per-user-provided connection parameters. Key material resolution
/// (agent socket, `~/.ssh` key files in ed25519 -> ecdsa -> rsa -> dsa
/// preference order) is the caller's responsibility; this struct carries
/// whatever was already resolved.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
    pub use_agent: bool,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl ConnectParams {
    pub fn new() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(5),
            use_agent: true,
            ..Default::default()
        }
    }
}

struct ConnectionEntry {
    session: Arc<Session>,
    created_at: Instant,
    last_used: Instant,
}

#[derive(Clone)]
struct FailedHostRecord {
    timestamp: Instant,
    count: u32,
    error: String,
    permanent: bool,
}

/// Thread-safe SSH connection pool with a per-host circuit breaker.
///
/// The circuit breaker check happens *before* the pool lock is taken (see
/// [`SshPool::get_connection`]), so a host with an open breaker never
/// contends for the lock other hosts are using.
pub struct SshPool {
    config: PoolConfig,
    host_key_policy: HostKeyPolicy,
    connections: tokio::sync::Mutex<HashMap<String, ConnectionEntry>>,
    failed_hosts: parking_lot::Mutex<HashMap<String, FailedHostRecord>>,
}

impl SshPool {
    pub fn new(config: PoolConfig, host_key_policy: HostKeyPolicy) -> Self {
        Self {
            config,
            host_key_policy,
            connections: tokio::sync::Mutex::new(HashMap::new()),
            failed_hosts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn connection_key(host: &str, user: &str) -> String {
        format!("{user}@{host}")
    }

    /// Raises `CircuitBreakerOpen` without touching the pool lock if the
    /// host is permanently unreachable (DNS failure, or 10+ recorded
    /// failures) or within its temporary open window.
    fn check_circuit_breaker(&self, host: &str) -> Result<()> {
        let mut guard = self.failed_hosts.lock();
        let Some(record) = guard.get(host).cloned() else {
            return Ok(());
        };

        if record.permanent || record.count >= 10 {
            return Err(SshError::CircuitBreakerOpen {
                host: host.to_string(),
                reason: format!("permanently unreachable: {}", record.error),
            });
        }

        if record.count >= self.config.circuit_breaker_threshold {
            let elapsed = record.timestamp.elapsed();
            if elapsed < self.config.circuit_breaker_timeout {
                let remaining = self.config.circuit_breaker_timeout - elapsed;
                return Err(SshError::CircuitBreakerOpen {
                    host: host.to_string(),
                    reason: format!(
                        "failed {} times, retry in {}s",
                        record.count,
                        remaining.as_secs()
                    ),
                });
            }
            tracing::info!(host, "circuit breaker timeout expired, resetting");
            guard.remove(host);
        }

        Ok(())
    }

    fn record_failure(&self, host: &str, error: &str) {
        let permanent = DNS_ERROR_MARKERS
            .iter()
            .any(|marker| error.to_lowercase().contains(marker));

        let mut guard = self.failed_hosts.lock();
        let entry = guard
            .entry(host.to_string())
            .or_insert_with(|| FailedHostRecord {
                timestamp: Instant::now(),
                count: 0,
                error: error.to_string(),
                permanent,
            });
        entry.count += 1;
        entry.timestamp = Instant::now();
        entry.error = error.to_string();
        entry.permanent = entry.permanent || permanent;

        tracing::warn!(
            host,
            count = entry.count,
            threshold = self.config.circuit_breaker_threshold,
            "ssh failure recorded"
        );
    }

    fn clear_failure(&self, host: &str) {
        self.failed_hosts.lock().remove(host);
    }

    /// Gets a pooled connection for `user@host`, creating a new one if
    /// none is live. Runs the blocking ssh2 handshake on a blocking task
    /// so callers on the async runtime aren't stalled.
    pub async fn get_connection(
        self: &Arc<Self>,
        host: &str,
        user: &str,
        params: ConnectParams,
    ) -> Result<Arc<Session>> {
        self.check_circuit_breaker(host)?;

        let key = Self::connection_key(host, user);

        if let Some(session) = self.try_reuse(&key).await {
            return Ok(session);
        }

        let pool = self.clone();
        let host_owned = host.to_string();
        let user_owned = user.to_string();
        let result = tokio::task::spawn_blocking(move || {
            pool.connect_direct(&host_owned, &user_owned, &params)
        })
        .await
        .map_err(|e| SshError::Io(std::io::Error::other(e.to_string())))?;

        match result {
            Ok(session) => {
                let session = Arc::new(session);
                self.connections.lock().await.insert(
                    key,
                    ConnectionEntry {
                        session: session.clone(),
                        created_at: Instant::now(),
                        last_used: Instant::now(),
                    },
                );
                self.clear_failure(host);
                Ok(session)
            }
            Err(err) => {
                self.record_failure(host, &err.to_string());
                Err(err)
            }
        }
    }

    async fn try_reuse(&self, key: &str) -> Option<Arc<Session>> {
        let mut guard = self.connections.lock().await;
        let entry = guard.get(key)?;

        let alive = entry.session.authenticated()
            && entry.last_used.elapsed() < self.config.max_idle_time;

        if alive {
            let session = entry.session.clone();
            guard.get_mut(key).unwrap().last_used = Instant::now();
            tracing::debug!(key, "reusing pooled ssh connection");
            Some(session)
        } else {
            tracing::debug!(key, "evicting stale/dead pooled connection");
            guard.remove(key);
            None
        }
    }

    fn connect_direct(&self, host: &str, user: &str, params: &ConnectParams) -> Result<Session> {
        let addr = format!("{host}:{}", params.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::other(format!("could not resolve {host}")))?;
        let tcp = TcpStream::connect_timeout(&addr, params.connect_timeout)?;
        tcp.set_read_timeout(Some(params.connect_timeout))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        self.host_key_policy
            .verify(&session, host, params.port)
            .map_err(|e| match e {
                SshError::HostKeyRejected { host, reason } => {
                    SshError::HostKeyRejected { host, reason }
                }
                other => other,
            })?;

        authenticate(&session, user, host, params)?;

        Ok(session)
    }

    /// Opens a connection to `target_host` tunnelled through `jump_host`'s
    /// transport via `direct-tcpip`, authenticating to the target over the
    /// resulting channel. Jump connections are not pooled (the original
    /// recreates them per call; pooling the outer transport would also
    /// pool the tunnel lifetime, which is undesirable).
    pub async fn connect_via_jump(
        self: &Arc<Self>,
        jump_host: &str,
        jump_user: &str,
        jump_params: ConnectParams,
        target_host: &str,
        target_user: &str,
        target_params: ConnectParams,
    ) -> Result<Session> {
        let pool = self.clone();
        let jump_host = jump_host.to_string();
        let jump_user = jump_user.to_string();
        let target_host = target_host.to_string();
        let target_user = target_user.to_string();

        tokio::task::spawn_blocking(move || {
            let jump_session = pool.connect_direct(&jump_host, &jump_user, &jump_params)?;

            let channel = jump_session.channel_direct_tcpip(
                &target_host,
                target_params.port,
                None,
            )?;

            let mut target_session = Session::new()?;
            target_session.set_tcp_stream(TcpStreamLike::Channel(channel));
            target_session.handshake()?;
            pool.host_key_policy
                .verify(&target_session, &target_host, target_params.port)?;
            authenticate(&target_session, &target_user, &target_host, &target_params)?;

            Ok(target_session)
        })
        .await
        .map_err(|e| SshError::Io(std::io::Error::other(e.to_string())))?
    }

    pub async fn close_all(&self) {
        self.connections.lock().await.clear();
    }

    pub async fn cleanup_stale(&self) {
        let mut guard = self.connections.lock().await;
        let max_idle = self.config.max_idle_time;
        guard.retain(|key, entry| {
            let keep = entry.last_used.elapsed() < max_idle;
            if !keep {
                tracing::debug!(key, "cleaning up stale pooled connection");
            }
            keep
        });
    }

    pub async fn pooled_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}

/// `ssh2::Session::set_tcp_stream` requires something implementing
/// `Read + Write`; a jump-host channel already does (it keeps its parent
/// session alive internally), so this just forwards through one variant.
enum TcpStreamLike {
    Channel(ssh2::Channel),
}

impl Read for TcpStreamLike {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TcpStreamLike::Channel(c) => c.read(buf),
        }
    }
}

impl std::io::Write for TcpStreamLike {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            TcpStreamLike::Channel(c) => c.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TcpStreamLike::Channel(c) => c.flush(),
        }
    }
}

fn authenticate(session: &Session, user: &str, host: &str, params: &ConnectParams) -> Result<()> {
    if params.use_agent {
        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() && agent.list_identities().is_ok() {
                if let Ok(identities) = agent.identities() {
                    for identity in identities {
                        if agent.userauth(user, &identity).is_ok() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    if let Some(key_path) = &params.private_key {
        session
            .userauth_pubkey_file(
                user,
                None,
                key_path,
                params.private_key_passphrase.as_deref(),
            )
            .map_err(|source| SshError::Authentication {
                user: user.to_string(),
                host: host.to_string(),
                source,
            })?;
        return Ok(());
    }

    if let Some(password) = &params.password {
        session
            .userauth_password(user, password)
            .map_err(|source| SshError::Authentication {
                user: user.to_string(),
                host: host.to_string(),
                source,
            })?;
        return Ok(());
    }

    for candidate in default_key_candidates() {
        if candidate.exists() && session.userauth_pubkey_file(user, None, &candidate, None).is_ok() {
            return Ok(());
        }
    }

    Err(SshError::NoAuthMethodAvailable {
        user: user.to_string(),
        host: host.to_string(),
    })
}

/// Default private-key search order: ed25519 before ecdsa before rsa
/// before dsa, per the spec's SSH key-location contract.
fn default_key_candidates() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return vec![];
    };
    let ssh_dir = PathBuf::from(home).join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa", "id_dsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_key_policy::{HostKeyMode, HostKeyPolicy};

    fn pool() -> Arc<SshPool> {
        Arc::new(SshPool::new(
            PoolConfig {
                circuit_breaker_threshold: 2,
                circuit_breaker_timeout: Duration::from_millis(50),
                ..PoolConfig::default()
            },
            HostKeyPolicy::new(HostKeyMode::AutoAdd, None),
        ))
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let pool = pool();
        pool.record_failure("bad-host", "connection refused");
        pool.record_failure("bad-host", "connection refused");

        let result = pool.check_circuit_breaker("bad-host");
        assert!(matches!(result, Err(SshError::CircuitBreakerOpen { .. })));
    }

    #[test]
    fn dns_failure_marks_host_permanently_unreachable() {
        let pool = pool();
        pool.record_failure("ghost-host", "Name or service not known");

        let result = pool.check_circuit_breaker("ghost-host");
        assert!(matches!(result, Err(SshError::CircuitBreakerOpen { .. })));
    }

    #[test]
    fn circuit_breaker_resets_after_timeout() {
        let pool = pool();
        pool.record_failure("flaky-host", "timeout");
        pool.record_failure("flaky-host", "timeout");
        assert!(pool.check_circuit_breaker("flaky-host").is_err());

        std::thread::sleep(Duration::from_millis(80));
        assert!(pool.check_circuit_breaker("flaky-host").is_ok());
    }

    #[test]
    fn successful_connection_clears_prior_failures() {
        let pool = pool();
        pool.record_failure("host-a", "timeout");
        pool.clear_failure("host-a");
        assert!(pool.check_circuit_breaker("host-a").is_ok());
    }
}

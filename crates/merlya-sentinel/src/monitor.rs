//! Scheduling loop and lifecycle for the Sentinel agent, grounded in
//! `athena_ai/agents/sentinel.py`'s `SentinelAgent`.
//!
//! The original runs a dedicated OS thread polling a stop `Event` once a
//! second. Ported onto tokio as a spawned task woken by a [`Notify`]
//! rather than a `sleep(1); if stop: break` loop, per the design notes'
//! "avoid loops that delay shutdown" guidance — `stop()` wakes the task
//! immediately instead of waiting out the remaining tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::alerts::AlertManager;
use crate::checks::CheckExecutor;
use crate::error::{Result, SentinelError};
use crate::models::{Alert, CheckResult, HealthCheck, SentinelStatus};

const TICK: Duration = Duration::from_secs(1);
const HISTORY_LIMIT: usize = 100;
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone, Copy)]
pub struct SentinelStats {
    pub checks_run: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
}

struct Inner {
    checks: HashMap<String, HealthCheck>,
    last_run: HashMap<String, DateTime<Utc>>,
    history: HashMap<String, Vec<CheckResult>>,
}

/// Callback invoked with every [`Alert`] produced by a check crossing its
/// failure threshold. Mirrors the original's `alert_callback`.
pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

pub struct Sentinel {
    status: Mutex<SentinelStatus>,
    inner: Mutex<Inner>,
    alert_manager: Arc<AlertManager>,
    alert_callback: Option<AlertCallback>,
    stats: Mutex<SentinelStats>,
    stop_notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Sentinel {
    pub fn new(alert_manager: AlertManager, alert_callback: Option<AlertCallback>) -> Self {
        Self {
            status: Mutex::new(SentinelStatus::Stopped),
            inner: Mutex::new(Inner {
                checks: HashMap::new(),
                last_run: HashMap::new(),
                history: HashMap::new(),
            }),
            alert_manager: Arc::new(alert_manager),
            alert_callback,
            stats: Mutex::new(SentinelStats::default()),
            stop_notify: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn add_check(&self, check: HealthCheck) {
        let mut inner = self.inner.lock();
        if inner.checks.contains_key(&check.name) {
            tracing::warn!(check = %check.name, "check already exists, updating");
        }
        inner.history.entry(check.name.clone()).or_default();
        inner.checks.insert(check.name.clone(), check);
    }

    pub fn remove_check(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.history.remove(name);
        inner.last_run.remove(name);
        inner.checks.remove(name).is_some()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.checks.get_mut(name) {
            Some(check) => {
                check.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn list_checks(&self) -> Vec<HealthCheck> {
        self.inner.lock().checks.values().cloned().collect()
    }

    pub fn status(&self) -> SentinelStatus {
        *self.status.lock()
    }

    pub fn stats(&self) -> SentinelStats {
        *self.stats.lock()
    }

    pub fn get_alerts(&self) -> Vec<Alert> {
        self.alert_manager.get_alerts()
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> bool {
        self.alert_manager.acknowledge_alert(alert_id)
    }

    pub fn check_history(&self, check_name: &str, limit: usize) -> Vec<CheckResult> {
        let inner = self.inner.lock();
        match inner.history.get(check_name) {
            Some(hist) => hist.iter().rev().take(limit).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Starts the scheduling loop. Refuses with [`SentinelError::NoChecksRegistered`]
    /// when no checks are registered, matching the original's `if not
    /// self._checks: return False`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if *self.status.lock() == SentinelStatus::Running {
            return Ok(());
        }
        if self.inner.lock().checks.is_empty() {
            return Err(SentinelError::NoChecksRegistered);
        }

        self.stopped.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        *self.status.lock() = SentinelStatus::Running;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });
        *self.worker.lock() = Some(handle);

        tracing::info!(checks = self.inner.lock().checks.len(), "sentinel started");
        Ok(())
    }

    /// Signals the worker to stop and joins it with a bounded wait,
    /// matching the original's `self._thread.join(timeout=5)`.
    pub async fn stop(&self) -> bool {
        if *self.status.lock() != SentinelStatus::Running && *self.status.lock() != SentinelStatus::Paused {
            return false;
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await;
        }

        *self.status.lock() = SentinelStatus::Stopped;
        tracing::info!("sentinel stopped");
        true
    }

    pub fn pause(&self) -> bool {
        let mut status = self.status.lock();
        if *status == SentinelStatus::Running {
            *status = SentinelStatus::Paused;
            self.paused.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn resume(&self) -> bool {
        let mut status = self.status.lock();
        if *status == SentinelStatus::Paused {
            *status = SentinelStatus::Running;
            self.paused.store(false, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            if self.paused.load(Ordering::SeqCst) {
                self.sleep_or_wake(TICK).await;
                continue;
            }

            let due = self.collect_due_checks();
            for check in due {
                let timeout = Duration::from_secs(check.timeout_seconds);
                let result = match tokio::time::timeout(timeout, CheckExecutor::run(&check)).await {
                    Ok(result) => result,
                    Err(_) => CheckResult {
                        check_name: check.name.clone(),
                        success: false,
                        response_time_ms: timeout.as_millis() as u64,
                        timestamp: Utc::now(),
                        error: Some("timeout".to_string()),
                        details: None,
                    },
                };
                self.process_result(&check, result).await;
            }

            self.sleep_or_wake(TICK).await;
        }
    }

    async fn sleep_or_wake(&self, dur: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(dur) => {}
            _ = self.stop_notify.notified() => {}
        }
    }

    fn collect_due_checks(&self) -> Vec<HealthCheck> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        for (name, check) in inner.checks.iter() {
            if !check.enabled {
                continue;
            }
            let last = inner.last_run.get(name).copied();
            let elapsed = last.map(|t| (now - t).num_seconds()).unwrap_or(i64::MAX);
            if elapsed >= check.interval_seconds as i64 {
                due.push(check.clone());
            }
        }
        for check in &due {
            inner.last_run.insert(check.name.clone(), now);
        }
        due
    }

    async fn process_result(&self, check: &HealthCheck, result: CheckResult) {
        {
            let mut inner = self.inner.lock();
            let hist = inner.history.entry(check.name.clone()).or_default();
            hist.push(result.clone());
            if hist.len() > HISTORY_LIMIT {
                let drop = hist.len() - HISTORY_LIMIT;
                hist.drain(0..drop);
            }
        }

        {
            let mut stats = self.stats.lock();
            stats.checks_run += 1;
            if result.success {
                stats.checks_passed += 1;
            } else {
                stats.checks_failed += 1;
            }
        }

        match self.alert_manager.process_result(check, &result).await {
            Some(alert) => {
                if let Some(callback) = &self.alert_callback {
                    callback(&alert);
                } else {
                    tracing::warn!(
                        target = %alert.target,
                        severity = ?alert.severity,
                        "SENTINEL ALERT: {}",
                        alert.message
                    );
                }
            }
            None => {
                if result.success {
                    tracing::debug!(check = %check.name, "check ok");
                } else {
                    tracing::error!(check = %check.name, error = ?result.error, "sentinel caught an error running check");
                    *self.status.lock() = SentinelStatus::Error;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckType;

    fn port_check(name: &str, target_port: u16, threshold: u32) -> HealthCheck {
        let mut c = HealthCheck::new(name, "127.0.0.1", CheckType::Port);
        c.parameters.port = Some(target_port);
        c.interval_seconds = 1;
        c.timeout_seconds = 2;
        c.threshold_failures = threshold;
        c
    }

    #[tokio::test]
    async fn start_refuses_with_zero_checks() {
        let sentinel = Arc::new(Sentinel::new(AlertManager::new(None, false), None));
        assert!(matches!(sentinel.start(), Err(SentinelError::NoChecksRegistered)));
    }

    #[tokio::test]
    async fn start_and_stop_transitions_status() {
        let sentinel = Arc::new(Sentinel::new(AlertManager::new(None, false), None));
        sentinel.add_check(port_check("closed", 1, 1));
        sentinel.start().unwrap();
        assert_eq!(sentinel.status(), SentinelStatus::Running);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(sentinel.stats().checks_run >= 1);

        assert!(sentinel.stop().await);
        assert_eq!(sentinel.status(), SentinelStatus::Stopped);
    }

    #[tokio::test]
    async fn pause_suspends_check_execution() {
        let sentinel = Arc::new(Sentinel::new(AlertManager::new(None, false), None));
        sentinel.add_check(port_check("closed", 1, 1));
        sentinel.start().unwrap();
        assert!(sentinel.pause());
        assert_eq!(sentinel.status(), SentinelStatus::Paused);
        let before = sentinel.stats().checks_run;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(sentinel.stats().checks_run, before);
        assert!(sentinel.resume());
        sentinel.stop().await;
    }
}

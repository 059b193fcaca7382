//! Alert pipeline, grounded in `athena_ai/agents/sentinel_service/alerts.py`.
//!
//! Turns a stream of [`CheckResult`]s into at-most-one active [`Alert`] per
//! check, escalating severity with repeated failure, and hands critical
//! alerts off to an external incident interface.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::{Alert, AlertSeverity, CheckResult, HealthCheck};

/// Narrow interface onto the external knowledge/incident store. Sentinel
/// only ever calls `record_incident`; anything richer (querying, updating)
/// belongs to that store, not here.
#[async_trait::async_trait]
pub trait IncidentSink: Send + Sync {
    async fn record_incident(&self, check_name: &str, severity: AlertSeverity, symptoms: Vec<String>) -> String;
}

/// Declared per spec but intentionally left unimplemented: the spec
/// describes detection and alerting in detail and only gestures at
/// auto-remediation, so this hook exists without a body rather than
/// guessing at a workflow the spec never specifies.
#[derive(Debug, Clone)]
pub struct RemediationSuggestion {
    pub description: String,
    pub auto_executable: bool,
}

pub struct AlertManager {
    failure_counts: Mutex<HashMap<String, u32>>,
    active_alerts: Mutex<HashMap<String, Alert>>,
    incident_sink: Option<Box<dyn IncidentSink>>,
    auto_remediate: bool,
}

impl AlertManager {
    pub fn new(incident_sink: Option<Box<dyn IncidentSink>>, auto_remediate: bool) -> Self {
        Self {
            failure_counts: Mutex::new(HashMap::new()),
            active_alerts: Mutex::new(HashMap::new()),
            incident_sink,
            auto_remediate,
        }
    }

    /// Updates the failure counter for `check` and returns the active
    /// alert if one now exists (new or unchanged). Returns `None` on
    /// success or when a failure hasn't yet crossed the threshold.
    pub async fn process_result(&self, check: &HealthCheck, result: &CheckResult) -> Option<Alert> {
        if result.success {
            let mut counts = self.failure_counts.lock();
            if counts.get(&check.name).copied().unwrap_or(0) > 0 {
                tracing::info!(check = %check.name, "check recovered");
            }
            counts.remove(&check.name);
            self.active_alerts.lock().remove(&check.name);
            return None;
        }

        let count = {
            let mut counts = self.failure_counts.lock();
            let entry = counts.entry(check.name.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count < check.threshold_failures {
            return None;
        }

        let severity = AlertSeverity::from_failure_count(count, check.threshold_failures);
        let mut alert = Alert {
            id: format!("alert_{}_{}", check.name, Utc::now().timestamp()),
            check_name: check.name.clone(),
            target: check.target.clone(),
            severity,
            message: result
                .error
                .clone()
                .unwrap_or_else(|| format!("check '{}' failed {} times", check.name, count)),
            timestamp: result.timestamp,
            consecutive_failures: count,
            acknowledged: false,
            incident_id: None,
        };

        if severity == AlertSeverity::Critical {
            if let Some(sink) = &self.incident_sink {
                let incident_id = sink.record_incident(&check.name, severity, vec![alert.message.clone()]).await;
                alert.incident_id = Some(incident_id);
            }
        }

        self.active_alerts.lock().insert(check.name.clone(), alert.clone());

        if self.auto_remediate && severity != AlertSeverity::Info {
            self.trigger_remediation(check, &alert).await;
        }

        Some(alert)
    }

    /// Placeholder integration point: requesting and executing a
    /// remediation action requires wiring into the execution substrate
    /// (Modules C/D/E), which the spec gestures at but never specifies.
    async fn trigger_remediation(&self, check: &HealthCheck, alert: &Alert) {
        tracing::debug!(
            check = %check.name,
            alert = %alert.id,
            "auto-remediation requested but no effector is wired up"
        );
    }

    pub fn get_alerts(&self) -> Vec<Alert> {
        self.active_alerts.lock().values().cloned().collect()
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> bool {
        let mut guard = self.active_alerts.lock();
        for alert in guard.values_mut() {
            if alert.id == alert_id {
                alert.acknowledged = true;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckType, HealthCheck};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn check(threshold: u32) -> HealthCheck {
        let mut c = HealthCheck::new("db-ping", "db01", CheckType::Ping);
        c.threshold_failures = threshold;
        c
    }

    fn failure(error: &str) -> CheckResult {
        CheckResult {
            check_name: "db-ping".to_string(),
            success: false,
            response_time_ms: 5,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
            details: None,
        }
    }

    fn success() -> CheckResult {
        CheckResult {
            check_name: "db-ping".to_string(),
            success: true,
            response_time_ms: 5,
            timestamp: Utc::now(),
            error: None,
            details: None,
        }
    }

    #[tokio::test]
    async fn no_alert_below_threshold() {
        let manager = AlertManager::new(None, false);
        let check = check(3);
        assert!(manager.process_result(&check, &failure("timeout")).await.is_none());
        assert!(manager.process_result(&check, &failure("timeout")).await.is_none());
    }

    #[tokio::test]
    async fn alert_fires_at_threshold_with_info_severity() {
        let manager = AlertManager::new(None, false);
        let check = check(3);
        manager.process_result(&check, &failure("timeout")).await;
        manager.process_result(&check, &failure("timeout")).await;
        let alert = manager.process_result(&check, &failure("timeout")).await.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Info);
    }

    #[tokio::test]
    async fn severity_escalates_with_continued_failures() {
        let manager = AlertManager::new(None, false);
        let check = check(2);
        for _ in 0..5 {
            manager.process_result(&check, &failure("timeout")).await;
        }
        let alert = manager.process_result(&check, &failure("timeout")).await.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn success_clears_counter_and_active_alert() {
        let manager = AlertManager::new(None, false);
        let check = check(2);
        manager.process_result(&check, &failure("timeout")).await;
        manager.process_result(&check, &failure("timeout")).await;
        assert_eq!(manager.get_alerts().len(), 1);

        manager.process_result(&check, &success()).await;
        assert_eq!(manager.get_alerts().len(), 0);
    }

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl IncidentSink for CountingSink {
        async fn record_incident(&self, _check_name: &str, _severity: AlertSeverity, _symptoms: Vec<String>) -> String {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            format!("incident-{n}")
        }
    }

    #[tokio::test]
    async fn critical_severity_creates_incident() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = AlertManager::new(Some(Box::new(CountingSink(calls.clone()))), false);
        let check = check(2);
        for _ in 0..6 {
            manager.process_result(&check, &failure("timeout")).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acknowledge_marks_alert() {
        let manager = AlertManager::new(None, false);
        let check = check(1);
        let alert = manager.process_result(&check, &failure("timeout")).await.unwrap();
        assert!(manager.acknowledge_alert(&alert.id));
        assert!(manager.get_alerts()[0].acknowledged);
    }
}

//! Proactive monitoring agent ("Sentinel"): a background scheduler running
//! heterogeneous health checks, deduplicating failures into
//! severity-graded alerts, and optionally handing critical ones off to an
//! incident sink.
//!
//! Grounded in `athena_ai/agents/sentinel.py` and its `sentinel_service`
//! package (`alerts.py`, `checks.py`, `models.py`).

pub mod alerts;
pub mod checks;
pub mod error;
pub mod models;
pub mod monitor;

pub use alerts::{AlertManager, IncidentSink, RemediationSuggestion};
pub use checks::CheckExecutor;
pub use error::{Result, SentinelError};
pub use models::{Alert, AlertSeverity, CheckParameters, CheckResult, CheckType, HealthCheck, SentinelStatus};
pub use monitor::{AlertCallback, Sentinel, SentinelStats};

//! Multi-platform CI adapter layer: a unified run/job/workflow schema, a
//! pluggable client-strategy adapter per platform, platform
//! auto-detection, failure classification, and an incident/skill
//! learning router.
//!
//! Grounded in the `athena_ai/ci` package (`models.py`, `protocols.py`,
//! `adapters/`, `clients/`, `analysis/error_classifier.py`, `manager.py`,
//! `registry.py`, `learning/memory_router.py`).

pub mod adapter;
pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod learning;
pub mod manager;
pub mod models;
pub mod registry;

pub use adapter::CIPlatform;
pub use config::CIConfig;
pub use error::{CIClientError, CIError, Result};
pub use learning::{CIIncident, CIMemoryRouter, CISkill, IncidentMemory, SkillStore};
pub use manager::CIPlatformManager;
pub use models::{CIErrorType, CIPlatformType, DetectedPlatform, FailureAnalysis, Job, PermissionReport, Run, RunLogs, RunStatus, Step, Workflow};
pub use registry::{ci_registry, CIPlatformRegistry};

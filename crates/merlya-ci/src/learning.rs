//! Incident/skill learning router, grounded in
//! `athena_ai/ci/learning/memory_router.py::CIMemoryRouter`.
//!
//! The core only ever calls the narrow `record_incident` / `find_similar`
//! / `add_skill` / `search_skills` surface onto the external knowledge
//! store, expressed here as two traits so this crate never depends on
//! that store's concrete shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::{CIErrorType, Run};

const MAX_PENDING_INCIDENTS: usize = 100;
const PENDING_INCIDENT_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct CIIncident {
    pub id: String,
    pub platform: String,
    pub run_id: String,
    pub error_type: CIErrorType,
    pub failed_jobs: Vec<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CISkill {
    pub trigger: String,
    pub solution: String,
    pub context: String,
}

/// Narrow write/read surface onto an incident memory store.
#[async_trait]
pub trait IncidentMemory: Send + Sync {
    async fn record_incident(&self, incident: &CIIncident);
    async fn find_similar(&self, symptoms: &[String], service: &str, limit: usize) -> Vec<CIIncident>;
}

/// Narrow write/read surface onto a skill store.
#[async_trait]
pub trait SkillStore: Send + Sync {
    async fn add_skill(&self, trigger: &str, solution: &str, context: &str);
    async fn search_skills(&self, query: &str, limit: usize) -> Vec<CISkill>;
}

pub struct CIMemoryRouter {
    incident_memory: Arc<dyn IncidentMemory>,
    skill_store: Arc<dyn SkillStore>,
    pending: Mutex<HashMap<String, CIIncident>>,
}

impl CIMemoryRouter {
    pub fn new(incident_memory: Arc<dyn IncidentMemory>, skill_store: Arc<dyn SkillStore>) -> Self {
        Self {
            incident_memory,
            skill_store,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn incident_id(run: &Run, now: DateTime<Utc>) -> String {
        format!("ci-{}-{}", run.id, now.format("%Y%m%d%H%M%S"))
    }

    fn create_skill_trigger(error_type: CIErrorType, failed_jobs: &[String], summary: &str) -> String {
        let first_job = failed_jobs.first().cloned().unwrap_or_default();
        let words: Vec<&str> = summary.split_whitespace().take(5).collect();
        format!("{error_type} {first_job} {}", words.join(" "))
    }

    /// Records a CI failure as a pending incident awaiting resolution,
    /// evicting stale entries first so `pending` can't grow unbounded
    /// across a long-lived process, per the 24h/100-entry cap in
    /// SPEC_FULL.md §4.N.
    pub async fn record_failure(&self, run: &Run, error_type: CIErrorType, failed_jobs: Vec<String>, summary: String, now: DateTime<Utc>) -> String {
        let id = Self::incident_id(run, now);
        let incident = CIIncident {
            id: id.clone(),
            platform: run.platform.to_string(),
            run_id: run.id.clone(),
            error_type,
            failed_jobs,
            summary,
            created_at: now,
        };

        self.incident_memory.record_incident(&incident).await;

        {
            let mut pending = self.pending.lock();
            pending.retain(|_, i| (now - i.created_at).num_hours() < PENDING_INCIDENT_MAX_AGE_HOURS);
            if pending.len() >= MAX_PENDING_INCIDENTS {
                if let Some(oldest_key) = pending.iter().min_by_key(|(_, i)| i.created_at).map(|(k, _)| k.clone()) {
                    pending.remove(&oldest_key);
                }
            }
            pending.insert(id.clone(), incident);
        }

        id
    }

    /// Learns a skill from how an incident was resolved and drops it
    /// from the pending set, matching `record_resolution`.
    pub async fn record_resolution(&self, incident_id: &str, commands: &[String]) {
        let incident = { self.pending.lock().remove(incident_id) };
        let Some(incident) = incident else {
            tracing::warn!(incident_id, "resolution recorded for unknown pending incident");
            return;
        };

        let trigger = Self::create_skill_trigger(incident.error_type, &incident.failed_jobs, &incident.summary);
        let solution = commands.join(" && ");
        let context = format!("ci/{}/{}", incident.platform, incident.error_type);
        self.skill_store.add_skill(&trigger, &solution, &context).await;
    }

    pub async fn find_similar_failures(&self, error_type: CIErrorType, failed_jobs: &[String], platform: &str, limit: usize) -> Vec<CIIncident> {
        let mut symptoms = vec![error_type.to_string()];
        symptoms.extend(failed_jobs.iter().cloned());
        self.incident_memory.find_similar(&symptoms, &format!("ci/{platform}"), limit).await
    }

    /// Searches learned skills for a fix, filtering to the same platform
    /// the way `suggest_fix` filters by its `ci/{platform}` context tag.
    pub async fn suggest_fix(&self, query: &str, platform: &str) -> Option<String> {
        let skills = self.skill_store.search_skills(query, 3).await;
        skills.into_iter().find(|s| s.context.starts_with(&format!("ci/{platform}"))).map(|s| s.solution)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeIncidentMemory {
        recorded: Mutex<Vec<CIIncident>>,
    }

    #[async_trait]
    impl IncidentMemory for FakeIncidentMemory {
        async fn record_incident(&self, incident: &CIIncident) {
            self.recorded.lock().push(incident.clone());
        }
        async fn find_similar(&self, _symptoms: &[String], _service: &str, _limit: usize) -> Vec<CIIncident> {
            self.recorded.lock().clone()
        }
    }

    struct FakeSkillStore {
        calls: AtomicUsize,
        skills: Mutex<Vec<CISkill>>,
    }

    #[async_trait]
    impl SkillStore for FakeSkillStore {
        async fn add_skill(&self, trigger: &str, solution: &str, context: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.skills.lock().push(CISkill {
                trigger: trigger.to_string(),
                solution: solution.to_string(),
                context: context.to_string(),
            });
        }
        async fn search_skills(&self, _query: &str, _limit: usize) -> Vec<CISkill> {
            self.skills.lock().clone()
        }
    }

    fn sample_run() -> Run {
        Run {
            id: "42".into(),
            platform: crate::models::CIPlatformType::GitHub,
            workflow_name: "ci".into(),
            status: crate::models::RunStatus::Failure,
            branch: "main".into(),
            commit_sha: "abc".into(),
            event: None,
            url: None,
            created_at: Utc::now(),
            updated_at: None,
            jobs: vec![],
        }
    }

    #[tokio::test]
    async fn record_failure_then_resolution_learns_a_skill() {
        let memory = Arc::new(FakeIncidentMemory { recorded: Mutex::new(vec![]) });
        let skills = Arc::new(FakeSkillStore {
            calls: AtomicUsize::new(0),
            skills: Mutex::new(vec![]),
        });
        let router = CIMemoryRouter::new(memory, skills.clone());

        let run = sample_run();
        let now = Utc::now();
        let id = router
            .record_failure(&run, CIErrorType::DependencyError, vec!["build".to_string()], "lockfile mismatch".to_string(), now)
            .await;
        assert_eq!(router.pending_count(), 1);

        router.record_resolution(&id, &["cargo update".to_string()]).await;
        assert_eq!(router.pending_count(), 0);
        assert_eq!(skills.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolution_for_unknown_incident_is_a_noop() {
        let memory = Arc::new(FakeIncidentMemory { recorded: Mutex::new(vec![]) });
        let skills = Arc::new(FakeSkillStore {
            calls: AtomicUsize::new(0),
            skills: Mutex::new(vec![]),
        });
        let router = CIMemoryRouter::new(memory, skills.clone());
        router.record_resolution("nonexistent", &["noop".to_string()]).await;
        assert_eq!(skills.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn suggest_fix_filters_by_platform_context() {
        let memory = Arc::new(FakeIncidentMemory { recorded: Mutex::new(vec![]) });
        let skills = Arc::new(FakeSkillStore {
            calls: AtomicUsize::new(0),
            skills: Mutex::new(vec![CISkill {
                trigger: "dependency_error build".into(),
                solution: "cargo update".into(),
                context: "ci/github/dependency_error".into(),
            }]),
        });
        let router = CIMemoryRouter::new(memory, skills);
        let fix = router.suggest_fix("lockfile mismatch", "github").await;
        assert_eq!(fix, Some("cargo update".to_string()));
    }
}

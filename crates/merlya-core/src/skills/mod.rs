//! Skill registry and executor (Module H): YAML-defined workflows matched
//! against user intent, fanned out across hosts with bounded concurrency.

pub mod executor;
pub mod loader;
pub mod models;
pub mod registry;

pub use executor::{HostRunner, SimulatedRunner, SkillExecutor};
pub use loader::SkillLoader;
pub use models::{HostResult, SkillConfig, SkillResult, SkillStatus};
pub use registry::{get_registry, RegistryStats, SkillRegistry};

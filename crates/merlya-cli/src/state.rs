//! Shared, per-process session state for the shell: everything a slash
//! command or a free-text request might touch.

use std::path::PathBuf;
use std::sync::Arc;

use merlya_core::classifier::RequestClassifier;
use merlya_core::credentials::CredentialStore;
use merlya_core::mcp::McpManager;
use merlya_core::resilience::MetricsRegistry;
use merlya_core::skills::{get_registry, SkillExecutor, SkillLoader, SkillRegistry};
use merlya_store::{Conversation, ConversationStore};
use tokio::sync::Mutex;

use crate::llm_stub::NullLlmRouter;

fn merlya_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")).join(".merlya")
}

pub struct AppState {
    pub credentials: CredentialStore,
    pub skills: &'static SkillRegistry,
    pub executor: SkillExecutor,
    pub mcp: McpManager,
    pub metrics: MetricsRegistry,
    pub classifier: RequestClassifier,
    pub llm: NullLlmRouter,
    pub store: Box<dyn ConversationStore>,
    pub conversation: Mutex<Conversation>,
    pub skills_dir: PathBuf,
}

impl AppState {
    pub async fn new(store: Box<dyn ConversationStore>, skills_dir: Option<PathBuf>) -> anyhow::Result<Arc<Self>> {
        let home = merlya_home();
        let user_skills_dir = skills_dir.unwrap_or_else(|| home.join("skills"));
        let builtin_skills_dir = home.join("builtin_skills");

        let registry = get_registry();
        let loader = SkillLoader::new(registry, builtin_skills_dir, Some(user_skills_dir.clone()));
        let loaded = loader.load_all();
        tracing::info!(loaded, dir = %user_skills_dir.display(), "loaded skills");

        let conversation = match store.load_current().await? {
            Some(existing) => existing,
            None => Conversation::new(format!("conv_{}", uuid_suffix()), "New conversation"),
        };

        Ok(Arc::new(Self {
            credentials: CredentialStore::new(),
            skills: registry,
            executor: SkillExecutor::with_simulated_runner(),
            mcp: McpManager::new(),
            metrics: MetricsRegistry::new(),
            classifier: RequestClassifier::new(),
            llm: NullLlmRouter,
            store,
            conversation: Mutex::new(conversation),
            skills_dir: user_skills_dir,
        }))
    }

    pub async fn persist_conversation(&self) -> anyhow::Result<()> {
        let conversation = self.conversation.lock().await;
        self.store.save_conversation(&conversation).await?;
        Ok(())
    }
}

fn uuid_suffix() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    uuid[..12].to_string()
}

//! Typed credential variables with dual-resolution, grounded in
//! `athena_ai/security/credentials.py`.

use std::collections::HashMap;

use parking_lot::Mutex;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Secret,
    Config,
    Host,
    Other,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub key: String,
    pub value: String,
    pub kind: VariableKind,
}

fn variable_ref_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@([A-Za-z][\w-]*)").unwrap())
}

/// In-process store of credential variables (`@mongo-user`, `@mongo-pass`,
/// ...) plus the session-only database credential cache from
/// `CredentialManager.get_db_credentials`.
#[derive(Default)]
pub struct CredentialStore {
    variables: Mutex<HashMap<String, Variable>>,
    session_db_credentials: Mutex<HashMap<String, (String, String)>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, kind: VariableKind) {
        let key = key.into();
        self.variables.lock().insert(
            key.clone(),
            Variable {
                key,
                value: value.into(),
                kind,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Variable> {
        self.variables.lock().get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.variables.lock().remove(key).is_some()
    }

    pub fn list(&self) -> Vec<Variable> {
        self.variables.lock().values().cloned().collect()
    }

    /// Dual-resolution contract (hard invariant): callers building text for
    /// the LLM must pass `resolve_secrets=false`; callers building a command
    /// for actual execution must pass `resolve_secrets=true`.
    pub fn resolve_variables(&self, text: &str, resolve_secrets: bool) -> String {
        let variables = self.variables.lock();
        let mut resolved = text.to_string();

        for variable in variables.values() {
            if !resolve_secrets && variable.kind == VariableKind::Secret {
                continue;
            }
            let pattern = format!(r"@{}\b", regex::escape(&variable.key));
            if let Ok(re) = Regex::new(&pattern) {
                resolved = re.replace_all(&resolved, variable.value.as_str()).into_owned();
            }
        }

        for cap in variable_ref_pattern().captures_iter(&resolved) {
            let name = &cap[1];
            tracing::warn!(variable = name, "variable referenced but not defined or withheld");
        }

        resolved
    }

    pub fn get_db_credentials_cached(&self, service: &str, host: &str) -> Option<(String, String)> {
        let cache_key = format!("{service}@{host}");
        self.session_db_credentials.lock().get(&cache_key).cloned()
    }

    pub fn cache_db_credentials(&self, service: &str, host: &str, username: &str, password: &str) {
        let cache_key = format!("{service}@{host}");
        self.session_db_credentials
            .lock()
            .insert(cache_key, (username.to_string(), password.to_string()));
    }

    pub fn clear_session_credentials(&self) {
        self.session_db_credentials.lock().clear();
    }
}

/// Extracts inline `username`/`password` pairs from a free-text request,
/// matching the five patterns in
/// `CredentialManager.extract_credentials_from_prompt`.
pub fn extract_credentials_from_prompt(prompt: &str) -> Option<(String, String)> {
    static PATTERNS: std::sync::OnceLock<Vec<Regex>> = std::sync::OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)(?:user|username)\s+(\S+)\s+(?:password|passwd|pass|pwd)\s+(\S+)").unwrap(),
            Regex::new(r"(?i)(?:credentials?|creds?)\s+(\S+)[/:](\S+)").unwrap(),
            Regex::new(r"(?i)(?:credentials?|creds?)\s+(\S+)\s+(\S+)").unwrap(),
            Regex::new(r"(?i)using\s+(\S+):(\S+)").unwrap(),
            Regex::new(r"-u\s+(\S+)\s+-p\s+(\S+)").unwrap(),
            Regex::new(r"--username\s+(\S+)\s+--password\s+(\S+)").unwrap(),
        ]
    });

    for pattern in patterns {
        if let Some(caps) = pattern.captures(prompt) {
            return Some((caps[1].to_string(), caps[2].to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_secrets_false_withholds_secret_typed_variables() {
        let store = CredentialStore::new();
        store.set("mongo-user", "admin", VariableKind::Config);
        store.set("mongo-pass", "hunter2", VariableKind::Secret);

        let for_llm = store.resolve_variables("using @mongo-user @mongo-pass", false);
        assert!(for_llm.contains("admin"));
        assert!(!for_llm.contains("hunter2"));
        assert!(for_llm.contains("@mongo-pass"));

        let for_exec = store.resolve_variables("using @mongo-user @mongo-pass", true);
        assert_eq!(for_exec, "using admin hunter2");
    }

    #[test]
    fn redaction_is_idempotent_under_resolve() {
        let store = CredentialStore::new();
        store.set("tok", "s3cr3t", VariableKind::Secret);
        let once = store.resolve_variables("use @tok", false);
        let twice = store.resolve_variables(&once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn extract_credentials_patterns() {
        assert_eq!(
            extract_credentials_from_prompt("user admin password secret123"),
            Some(("admin".into(), "secret123".into()))
        );
        assert_eq!(
            extract_credentials_from_prompt("with credentials admin/secret123"),
            Some(("admin".into(), "secret123".into()))
        );
        assert_eq!(
            extract_credentials_from_prompt("using admin:secret123"),
            Some(("admin".into(), "secret123".into()))
        );
        assert_eq!(
            extract_credentials_from_prompt("-u admin -p secret"),
            Some(("admin".into(), "secret".into()))
        );
        assert_eq!(extract_credentials_from_prompt("no creds here"), None);
    }
}

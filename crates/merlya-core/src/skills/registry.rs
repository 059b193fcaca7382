//! Thread-safe skill registry, grounded in `merlya/skills/registry.py`.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use regex::RegexBuilder;

use super::models::SkillConfig;

/// Process-wide registry: skill lookup and intent matching need to be
/// reachable from the classifier/planner call sites without threading a
/// handle through every layer, matching the Python singleton accessed via
/// `get_registry()`.
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, SkillConfig>>,
    intent_patterns: RwLock<HashMap<String, Vec<regex::Regex>>>,
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillRegistry {
    pub fn new() -> Self {
        tracing::debug!("skill registry initialized");
        Self {
            skills: RwLock::new(HashMap::new()),
            intent_patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, skill: SkillConfig) {
        let mut skills = self.skills.write();
        if let Some(existing) = skills.get(&skill.name) {
            if existing.source_path != skill.source_path {
                tracing::warn!(
                    skill = %skill.name,
                    from_version = %existing.version,
                    to_version = %skill.version,
                    "overwriting skill"
                );
            }
        }

        let mut patterns = Vec::new();
        for pattern in &skill.intent_patterns {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(compiled) => patterns.push(compiled),
                Err(err) => {
                    tracing::warn!(skill = %skill.name, pattern, error = %err, "invalid intent pattern");
                }
            }
        }
        self.intent_patterns.write().insert(skill.name.clone(), patterns);

        tracing::debug!(skill = %skill.name, version = %skill.version, "registered skill");
        skills.insert(skill.name.clone(), skill);
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.skills.write().remove(name).is_some();
        if removed {
            self.intent_patterns.write().remove(name);
            tracing::debug!(skill = name, "unregistered skill");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<SkillConfig> {
        self.skills.read().get(name).cloned()
    }

    pub fn get_all(&self) -> Vec<SkillConfig> {
        self.skills.read().values().cloned().collect()
    }

    pub fn get_builtin(&self) -> Vec<SkillConfig> {
        self.skills.read().values().filter(|s| s.builtin).cloned().collect()
    }

    pub fn get_user(&self) -> Vec<SkillConfig> {
        self.skills.read().values().filter(|s| !s.builtin).cloned().collect()
    }

    /// Matches `user_input` against every registered skill's intent
    /// patterns. Confidence is `min(match_len / input_len, 1.0) + 0.3`,
    /// capped at `1.0`, taking the best match per skill; results are sorted
    /// by confidence descending.
    pub fn match_intent(&self, user_input: &str) -> Vec<(SkillConfig, f64)> {
        let trimmed = user_input.trim();
        let input_len = trimmed.chars().count();

        let skills = self.skills.read();
        let patterns = self.intent_patterns.read();
        let mut matches = Vec::new();

        for (name, compiled) in patterns.iter() {
            let Some(skill) = skills.get(name) else { continue };
            let mut max_confidence = 0.0_f64;

            for pattern in compiled {
                if let Some(m) = pattern.find(user_input) {
                    if input_len > 0 {
                        let match_len = m.as_str().chars().count() as f64;
                        let confidence = (match_len / input_len as f64).min(1.0);
                        let confidence = (confidence + 0.3).min(1.0);
                        max_confidence = max_confidence.max(confidence);
                    }
                }
            }

            if max_confidence > 0.0 {
                matches.push((skill.clone(), max_confidence));
            }
        }

        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<SkillConfig> {
        let tag_lower = tag.to_lowercase();
        self.skills
            .read()
            .values()
            .filter(|s| s.tags.iter().any(|t| t.to_lowercase() == tag_lower))
            .cloned()
            .collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.skills.read().contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.skills.read().len()
    }

    pub fn clear(&self) {
        self.skills.write().clear();
        self.intent_patterns.write().clear();
        tracing::debug!("registry cleared");
    }

    pub fn get_stats(&self) -> RegistryStats {
        let skills = self.skills.read();
        let total = skills.len();
        let builtin = skills.values().filter(|s| s.builtin).count();
        RegistryStats {
            total,
            builtin,
            user: total - builtin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub builtin: usize,
    pub user: usize,
}

static REGISTRY: OnceLock<SkillRegistry> = OnceLock::new();

/// Global skill registry singleton.
pub fn get_registry() -> &'static SkillRegistry {
    REGISTRY.get_or_init(SkillRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(name: &str, patterns: Vec<&str>) -> SkillConfig {
        SkillConfig {
            name: name.to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            intent_patterns: patterns.into_iter().map(String::from).collect(),
            input_schema: None,
            output_schema: None,
            tools_allowed: vec![],
            max_hosts: 5,
            timeout_seconds: 120,
            require_confirmation_for: vec!["restart".to_string()],
            system_prompt: None,
            author: None,
            tags: vec!["disk".to_string()],
            builtin: false,
            source_path: None,
        }
    }

    #[test]
    fn register_and_get_roundtrip() {
        let registry = SkillRegistry::new();
        registry.register(skill("disk_audit", vec!["disk.*"]));
        assert!(registry.has("disk_audit"));
        assert_eq!(registry.count(), 1);
        assert!(registry.unregister("disk_audit"));
        assert!(!registry.has("disk_audit"));
    }

    #[test]
    fn match_intent_scores_by_relative_match_length() {
        let registry = SkillRegistry::new();
        registry.register(skill("disk_audit", vec!["disk.*usage"]));

        let matches = registry.match_intent("check disk usage on web-01");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].1 > 0.3 && matches[0].1 <= 1.0);
    }

    #[test]
    fn find_by_tag_is_case_insensitive() {
        let registry = SkillRegistry::new();
        registry.register(skill("disk_audit", vec![]));
        assert_eq!(registry.find_by_tag("DISK").len(), 1);
        assert_eq!(registry.find_by_tag("network").len(), 0);
    }

    #[test]
    fn global_registry_is_a_singleton() {
        get_registry().register(skill("global_skill", vec![]));
        assert!(get_registry().has("global_skill"));
        get_registry().clear();
    }
}

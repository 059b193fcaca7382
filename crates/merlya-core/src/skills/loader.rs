//! Skill loader, grounded in `merlya/skills/loader.py`.
//!
//! Scans YAML files in a builtin directory first, then a user directory,
//! so user-authored skills can override a builtin of the same name.

use std::path::{Path, PathBuf};

use super::models::SkillConfig;
use super::registry::SkillRegistry;

fn default_user_skills_dir() -> PathBuf {
    dirs_home().join(".merlya").join("skills")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

pub struct SkillLoader<'a> {
    registry: &'a SkillRegistry,
    builtin_dir: PathBuf,
    user_dir: PathBuf,
}

impl<'a> SkillLoader<'a> {
    pub fn new(registry: &'a SkillRegistry, builtin_dir: PathBuf, user_dir: Option<PathBuf>) -> Self {
        Self {
            registry,
            builtin_dir,
            user_dir: user_dir.unwrap_or_else(default_user_skills_dir),
        }
    }

    /// Loads builtin skills first, then user skills (which can override a
    /// builtin of the same name since the registry's last write wins).
    pub fn load_all(&self) -> usize {
        self.load_builtin() + self.load_user()
    }

    pub fn load_builtin(&self) -> usize {
        if !self.builtin_dir.is_dir() {
            tracing::debug!(dir = %self.builtin_dir.display(), "builtin skills directory not found");
            return 0;
        }
        self.load_from_directory(&self.builtin_dir, true)
    }

    pub fn load_user(&self) -> usize {
        if !self.user_dir.is_dir() {
            tracing::debug!(dir = %self.user_dir.display(), "user skills directory not found");
            return 0;
        }
        self.load_from_directory(&self.user_dir, false)
    }

    fn load_from_directory(&self, directory: &Path, builtin: bool) -> usize {
        let mut count = 0;
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %directory.display(), error = %err, "failed to read skills directory");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if is_yaml && self.load_file(&path, builtin).is_some() {
                count += 1;
            }
        }

        tracing::debug!(count, dir = %directory.display(), "loaded skills from directory");
        count
    }

    pub fn load_file(&self, path: &Path, builtin: bool) -> Option<SkillConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to read skill file");
                return None;
            }
        };

        let skill = self.parse_and_register(&content, builtin, Some(path.display().to_string()))?;
        tracing::debug!(skill = %skill.name, path = %path.display(), "loaded skill");
        Some(skill)
    }

    pub fn load_from_string(&self, yaml_content: &str, builtin: bool) -> Option<SkillConfig> {
        let skill = self.parse_and_register(yaml_content, builtin, None)?;
        tracing::debug!(skill = %skill.name, "loaded skill from string");
        Some(skill)
    }

    fn parse_and_register(&self, yaml_content: &str, builtin: bool, source_path: Option<String>) -> Option<SkillConfig> {
        let mut value: serde_yaml::Value = match serde_yaml::from_str(yaml_content) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "invalid skill yaml");
                return None;
            }
        };

        if value.is_null() {
            tracing::warn!("empty skill file");
            return None;
        }

        if let serde_yaml::Value::Mapping(map) = &mut value {
            map.insert("builtin".into(), builtin.into());
            if let Some(source_path) = &source_path {
                map.insert("source_path".into(), source_path.clone().into());
            }
        }

        let skill: SkillConfig = match serde_yaml::from_value(value) {
            Ok(skill) => skill,
            Err(err) => {
                tracing::error!(error = %err, "invalid skill config");
                return None;
            }
        };

        if let Err(err) = skill.validate() {
            tracing::error!(error = %err, "invalid skill config");
            return None;
        }

        self.registry.register(skill.clone());
        Some(skill)
    }

    /// Writes `skill` to the user skills directory as `<name>.yaml` with a
    /// short header comment, mirroring `SkillLoader.save_user_skill`.
    pub fn save_user_skill(&self, skill: &mut SkillConfig) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.user_dir)?;

        let path = self.user_dir.join(format!("{}.yaml", skill.name));

        let mut saved = skill.clone();
        saved.source_path = None;
        saved.builtin = false;
        let body = serde_yaml::to_string(&saved).map_err(std::io::Error::other)?;

        let header = format!(
            "# Merlya Skill: {}\n# Version: {}\n# Created by Merlya SkillWizard\n\n",
            skill.name, skill.version
        );

        std::fs::write(&path, format!("{header}{body}"))?;

        skill.source_path = Some(path.display().to_string());
        skill.builtin = false;

        tracing::info!(path = %path.display(), "saved skill");
        Ok(path)
    }

    /// Refuses to delete a builtin skill; returns `false` if the skill is
    /// unknown or builtin.
    pub fn delete_user_skill(&self, name: &str) -> bool {
        let Some(skill) = self.registry.get(name) else {
            tracing::warn!(skill = name, "skill not found");
            return false;
        };

        if skill.builtin {
            tracing::warn!(skill = name, "cannot delete builtin skill");
            return false;
        }

        if let Some(source_path) = &skill.source_path {
            let path = PathBuf::from(source_path);
            if path.exists() {
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %err, "failed to delete skill file");
                } else {
                    tracing::info!(path = %path.display(), "deleted skill file");
                }
            }
        }

        self.registry.unregister(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::registry::SkillRegistry;

    const SAMPLE_YAML: &str = r#"
name: disk_audit
version: "1.0"
description: "Check disk usage across hosts"
intent_patterns:
  - "disk.*"
tools_allowed:
  - ssh_execute
max_hosts: 10
timeout_seconds: 60
"#;

    #[test]
    fn load_from_string_registers_skill() {
        let registry = SkillRegistry::new();
        let loader = SkillLoader::new(&registry, PathBuf::from("/nonexistent"), Some(PathBuf::from("/nonexistent-user")));

        let skill = loader.load_from_string(SAMPLE_YAML, false).expect("loaded skill");
        assert_eq!(skill.name, "disk_audit");
        assert!(registry.has("disk_audit"));
    }

    #[test]
    fn load_from_string_rejects_invalid_yaml() {
        let registry = SkillRegistry::new();
        let loader = SkillLoader::new(&registry, PathBuf::from("/nonexistent"), Some(PathBuf::from("/nonexistent-user")));
        assert!(loader.load_from_string("not: valid: yaml: here:", false).is_none());
    }

    #[test]
    fn load_all_from_directories_builtin_then_user_override() {
        let builtin_dir = tempfile::tempdir().unwrap();
        let user_dir = tempfile::tempdir().unwrap();

        std::fs::write(builtin_dir.path().join("disk_audit.yaml"), SAMPLE_YAML).unwrap();
        std::fs::write(
            user_dir.path().join("disk_audit.yaml"),
            SAMPLE_YAML.replace("max_hosts: 10", "max_hosts: 20"),
        )
        .unwrap();

        let registry = SkillRegistry::new();
        let loader = SkillLoader::new(
            &registry,
            builtin_dir.path().to_path_buf(),
            Some(user_dir.path().to_path_buf()),
        );

        let loaded = loader.load_all();
        assert_eq!(loaded, 2);
        let skill = registry.get("disk_audit").unwrap();
        assert_eq!(skill.max_hosts, 20);
        assert!(!skill.builtin);
    }

    #[test]
    fn delete_user_skill_refuses_builtin() {
        let registry = SkillRegistry::new();
        let loader = SkillLoader::new(&registry, PathBuf::from("/nonexistent"), Some(PathBuf::from("/nonexistent-user")));
        loader.load_from_string(SAMPLE_YAML, true);
        assert!(!loader.delete_user_skill("disk_audit"));
        assert!(registry.has("disk_audit"));
    }
}

//! Host-key verification policy, grounded in the `paramiko` policy classes
//! used throughout `athena_ai/executors/ssh*.py` (`AutoAddPolicy` there;
//! the spec tightens this to three explicit modes plus an env override).
//!
//! `reject` refuses any host whose key isn't already in `known_hosts`;
//! `warning` accepts but logs; `auto_add` accepts, logs a warning, and
//! persists the new key. A missing or unparsable `known_hosts` file forces
//! `reject` unless `AUTO_ADD_HOSTS` is set truthy in the environment.

use std::path::PathBuf;

use ssh2::{CheckResult, KnownHostFileKind, Session};

use crate::error::{Result, SshError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyMode {
    Reject,
    Warning,
    AutoAdd,
}

impl HostKeyMode {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "auto_add" | "auto-add" => HostKeyMode::AutoAdd,
            "warning" => HostKeyMode::Warning,
            _ => HostKeyMode::Reject,
        }
    }
}

pub fn env_override_auto_add() -> bool {
    std::env::var("AUTO_ADD_HOSTS")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(false)
}

pub struct HostKeyPolicy {
    mode: HostKeyMode,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyPolicy {
    pub fn new(mode: HostKeyMode, known_hosts_path: Option<PathBuf>) -> Self {
        Self {
            mode,
            known_hosts_path,
        }
    }

    /// Builds the effective policy: loads `~/.ssh/known_hosts` first, and
    /// forces `reject` if the file is missing/unreadable/unparsable unless
    /// [`env_override_auto_add`] is set.
    pub fn from_config(configured_mode: HostKeyMode) -> Self {
        let path = dirs_known_hosts();
        let mode = if env_override_auto_add() {
            HostKeyMode::AutoAdd
        } else {
            configured_mode
        };
        Self::new(mode, path)
    }

    /// Verifies `session`'s remote host key for `host:port` against
    /// `known_hosts`, applying this policy's mode. Logs a warning on every
    /// `auto_add` connection, per spec.
    pub fn verify(&self, session: &Session, host: &str, port: u16) -> Result<()> {
        let mut known_hosts = session.known_hosts()?;

        let loaded = match &self.known_hosts_path {
            Some(path) if path.exists() => known_hosts
                .read_file(path, KnownHostFileKind::OpenSSH)
                .is_ok(),
            _ => false,
        };

        if !loaded && self.mode != HostKeyMode::AutoAdd {
            return Err(SshError::UnknownHostsUnavailable);
        }

        let Some((key, _key_type)) = session.host_key() else {
            return Err(SshError::HostKeyRejected {
                host: host.to_string(),
                reason: "no host key presented by remote".to_string(),
            });
        };

        let check = known_hosts.check_port(host, port, key);

        match check {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => match self.mode {
                HostKeyMode::Reject => Err(SshError::HostKeyRejected {
                    host: host.to_string(),
                    reason: "host key not found in known_hosts".to_string(),
                }),
                HostKeyMode::Warning => {
                    tracing::warn!(host, "accepting unknown host key (warning mode)");
                    Ok(())
                }
                HostKeyMode::AutoAdd => {
                    tracing::warn!(host, "auto-adding unknown host key");
                    let _ = known_hosts.add(host, key, "merlya-auto-added", KnownHostFileKind::OpenSSH);
                    if let Some(path) = &self.known_hosts_path {
                        let _ = known_hosts.write_file(path, KnownHostFileKind::OpenSSH);
                    }
                    Ok(())
                }
            },
            CheckResult::Mismatch => Err(SshError::HostKeyRejected {
                host: host.to_string(),
                reason: "host key changed since last connection".to_string(),
            }),
            CheckResult::Failure => Err(SshError::HostKeyRejected {
                host: host.to_string(),
                reason: "host key check failed".to_string(),
            }),
        }
    }
}

fn dirs_known_hosts() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".ssh").join("known_hosts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_mode_strings() {
        assert_eq!(HostKeyMode::parse("auto_add"), HostKeyMode::AutoAdd);
        assert_eq!(HostKeyMode::parse("warning"), HostKeyMode::Warning);
        assert_eq!(HostKeyMode::parse("reject"), HostKeyMode::Reject);
        assert_eq!(HostKeyMode::parse("garbage"), HostKeyMode::Reject);
    }

    #[test]
    fn env_override_recognizes_truthy_values() {
        std::env::set_var("AUTO_ADD_HOSTS", "1");
        assert!(env_override_auto_add());
        std::env::set_var("AUTO_ADD_HOSTS", "0");
        assert!(!env_override_auto_add());
        std::env::remove_var("AUTO_ADD_HOSTS");
        assert!(!env_override_auto_add());
    }
}

//! Wires the skill executor's [`HostRunner`] trait to a real SSH pool
//! (Modules C/D), replacing the simulated placeholder once the shell is
//! given an SSH identity to connect with.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use merlya_core::skills::{HostRunner, SkillConfig};
use merlya_ssh::{ConnectParams, SshPool};

pub struct SshHostRunner {
    pool: Arc<SshPool>,
    user: String,
    params: ConnectParams,
}

impl SshHostRunner {
    pub fn new(pool: Arc<SshPool>, user: impl Into<String>, params: ConnectParams) -> Self {
        Self {
            pool,
            user: user.into(),
            params,
        }
    }
}

#[async_trait]
impl HostRunner for SshHostRunner {
    async fn run(&self, _skill: &SkillConfig, host: &str, task: &str) -> Result<String, String> {
        let session = self
            .pool
            .get_connection(host, &self.user, self.params.clone())
            .await
            .map_err(|err| err.to_string())?;

        let command = task.to_string();
        tokio::task::spawn_blocking(move || run_command(&session, &command))
            .await
            .map_err(|err| err.to_string())?
    }
}

fn run_command(session: &ssh2::Session, command: &str) -> Result<String, String> {
    let mut channel = session.channel_session().map_err(|err| err.to_string())?;
    channel.exec(command).map_err(|err| err.to_string())?;

    let mut output = String::new();
    channel.read_to_string(&mut output).map_err(|err| err.to_string())?;
    channel.wait_close().map_err(|err| err.to_string())?;

    let status = channel.exit_status().map_err(|err| err.to_string())?;
    if status != 0 {
        return Err(format!("command exited with status {status}: {output}"));
    }
    Ok(output)
}

//! Transport backed by the system `ssh` client.
//!
//! Each session shells out to `ssh` in batch mode with an explicit identity
//! file. `connect` verifies reachability with a no-op command so the
//! channel's retry policy has something cheap to poll; the real command
//! then runs over a fresh invocation with the same arguments.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{CommandOutput, Credentials, RemoteSession, RemoteTransport};

/// Transport spawning the system `ssh` binary.
#[derive(Debug, Clone, Default)]
pub struct SshTransport;

impl SshTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn base_command(creds: &Credentials, host: &str) -> Command {
    let key: PathBuf = expand_home(&creds.key_path);
    let mut cmd = Command::new("ssh");
    cmd.arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg("ConnectTimeout=5")
        .arg("-i")
        .arg(key)
        .arg(format!("{}@{}", creds.user, host))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

struct SshSession {
    creds: Credentials,
    host: String,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let output = base_command(&self.creds, &self.host)
            .arg(command)
            .output()
            .await?;

        // Exit code 255 is ssh itself failing (connection, auth); anything
        // else is the remote command's own exit status and is surfaced
        // through the captured streams.
        if output.status.code() == Some(255) {
            return Err(Error::Remote {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_owned)
                .collect(),
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn connect(
        &self,
        creds: &Credentials,
        host: &str,
    ) -> Result<Box<dyn RemoteSession>> {
        let probe = base_command(creds, host).arg("exit 0").output().await?;
        if !probe.status.success() {
            return Err(Error::Remote {
                host: host.to_owned(),
                reason: String::from_utf8_lossy(&probe.stderr).trim().to_owned(),
            });
        }
        Ok(Box::new(SshSession {
            creds: creds.clone(),
            host: host.to_owned(),
        }))
    }
}

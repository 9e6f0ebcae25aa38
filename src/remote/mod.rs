//! Remote command execution against cluster hosts.
//!
//! The transport (authentication, channel plumbing) sits behind the
//! [`RemoteTransport`] trait; the [`channel`] module layers the
//! connection-retry policy on top, and [`instruction`] composes the shell
//! commands the orchestrator sends.

pub mod channel;
pub mod instruction;
pub mod ssh;

use async_trait::async_trait;

use crate::error::Result;

pub use channel::RemoteChannel;
pub use instruction::Instruction;

/// Authentication material for a remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub key_path: String,
}

impl Credentials {
    #[must_use]
    pub fn new(user: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
        }
    }
}

/// Captured output of one remote command.
///
/// Stderr is kept as raw bytes: status probes legitimately write there, so
/// non-empty stderr is surfaced for inspection, never treated as failure.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Stdout re-joined with newlines.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// First stdout line, trimmed, if any.
    #[must_use]
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.first().map(|l| l.trim())
    }

    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// One authenticated session against a host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a single command, capturing stdout and stderr separately.
    async fn run(&mut self, command: &str) -> Result<CommandOutput>;
}

/// Transport capable of opening authenticated sessions.
///
/// `connect` may fail transiently: freshly booted hosts refuse connections
/// for a while. The channel retries those failures under its policy.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(&self, creds: &Credentials, host: &str) -> Result<Box<dyn RemoteSession>>;
}

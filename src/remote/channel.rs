//! Remote channel with connection retries.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::retry::{retry, Attempt, CancelToken, RetryPolicy};

use super::{CommandOutput, Credentials, Instruction, RemoteTransport};

/// Executes instructions over a transport, retrying connection failures.
///
/// Hosts are not immediately reachable after creation, so connect failures
/// are retried up to the policy's budget with a fixed delay. Exhaustion is
/// a [`Error::Connection`] naming the host; it is reported, never
/// swallowed, but the orchestrator decides whether a multi-host rollout
/// continues past it.
pub struct RemoteChannel {
    transport: Arc<dyn RemoteTransport>,
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl RemoteChannel {
    #[must_use]
    pub fn new(transport: Arc<dyn RemoteTransport>, policy: RetryPolicy, cancel: CancelToken) -> Self {
        Self {
            transport,
            policy,
            cancel,
        }
    }

    /// Open a session to `host` and run one instruction.
    pub async fn execute(
        &self,
        creds: &Credentials,
        host: &str,
        instruction: &Instruction,
    ) -> Result<CommandOutput> {
        info!(host, intent = instruction.intent(), "remote instruction");

        let transport = &self.transport;
        let mut session = retry(
            &self.policy,
            &self.cancel,
            move |_| async move {
                match transport.connect(creds, host).await {
                    Ok(session) => Ok(Attempt::Ready(session)),
                    Err(Error::Interrupted) => Err(Error::Interrupted),
                    Err(e) => Ok(Attempt::Pending(e.to_string())),
                }
            },
            |attempts| Error::Connection {
                endpoint: host.to_owned(),
                attempts,
            },
        )
        .await?;

        let output = session.run(&instruction.render()).await?;
        if !output.stderr.is_empty() {
            warn!(
                host,
                intent = instruction.intent(),
                stderr = %output.stderr_text().trim(),
                "remote command wrote to stderr"
            );
        }
        Ok(output)
    }
}

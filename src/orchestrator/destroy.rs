//! Cluster teardown with the dirty-repository safeguard.

use dialoguer::Confirm;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::remote::Instruction;
use crate::store::HostInfo;

use super::Orchestrator;

/// How destroy resolves the dirty-repository safeguard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyMode {
    /// Explicit bypass (`--force`): destroy regardless of repository state.
    Force,
    /// Attended terminal: prompt for confirmation when dirty.
    Interactive,
    /// Unattended run without `--force`: refuse when dirty.
    Unattended,
}

impl Orchestrator {
    /// Terminate every instance the record knows about and delete the
    /// record. The record is deleted only after the terminate call is
    /// accepted, so a failed teardown leaves it intact for retry.
    ///
    /// Returns the terminated instance identifiers.
    pub async fn destroy(&self, name: &str, mode: DestroyMode) -> Result<Vec<String>> {
        let record = self.store.load(name)?;

        if let (Some(dir), Some(host)) = (&record.cloned_dir, &record.notebook) {
            if self.repo_is_dirty(host, dir).await? {
                match mode {
                    DestroyMode::Force => {
                        warn!(cluster = name, "uncommitted or unpushed changes discarded by --force");
                    }
                    DestroyMode::Interactive => {
                        let confirmed = Confirm::new()
                            .with_prompt(format!(
                                "Cluster '{name}' has uncommitted or unpushed changes. Destroy anyway?"
                            ))
                            .default(false)
                            .interact()?;
                        if !confirmed {
                            return Err(Error::Refused(format!(
                                "destroy of '{name}' cancelled"
                            )));
                        }
                    }
                    DestroyMode::Unattended => {
                        return Err(Error::Refused(format!(
                            "cluster '{name}' has uncommitted or unpushed changes; re-run with --force"
                        )));
                    }
                }
            }
        }

        info!(cluster = name, instances = record.instances.len(), "destroying cluster");
        self.provider.terminate_instances(&record.instances).await?;
        self.store.delete(name)?;
        Ok(record.instances)
    }

    /// Check the cloned working copy for uncommitted or unpushed changes.
    ///
    /// An unreachable host cannot be inspected; that is logged and treated
    /// as clean so a half-dead cluster can still be destroyed.
    async fn repo_is_dirty(&self, host: &HostInfo, dir: &str) -> Result<bool> {
        let check = Instruction::CheckRepoDirty { dir: dir.to_owned() };
        match self
            .channel
            .execute(&host.credentials(), &host.public_ip, &check)
            .await
        {
            Ok(output) => Ok(!output.stdout_text().trim().is_empty()),
            Err(Error::Interrupted) => Err(Error::Interrupted),
            Err(e) => {
                warn!(host = %host.public_ip, error = %e, "could not inspect cloned repository");
                Ok(false)
            }
        }
    }
}

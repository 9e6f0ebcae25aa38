//! Start/stop of cluster software on provisioned hosts.

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::remote::instruction::DASHBOARD_PORT;
use crate::remote::Instruction;
use crate::retry::{retry, Attempt};
use crate::store::{ClusterRecord, HostInfo};

use super::Orchestrator;

/// Per-attempt timeout for dashboard probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

impl Orchestrator {
    /// Launch cluster software: scheduler and workers for a topology, then
    /// the notebook server when present. Persists the updated record with
    /// the discovered URLs.
    pub async fn start(&self, name: &str) -> Result<ClusterRecord> {
        let mut record = self.store.load(name)?;

        match record.topology.as_deref() {
            Some("dask") => self.start_dask(&mut record).await?,
            Some(other) => {
                return Err(Error::NotImplemented(format!(
                    "start for cluster type '{other}'"
                )))
            }
            None => {}
        }

        if record.notebook.is_some() {
            self.start_notebook(&mut record).await?;
        }

        self.store.save(&record)?;
        Ok(record)
    }

    async fn start_dask(&self, record: &mut ClusterRecord) -> Result<()> {
        let scheduler = record.scheduler.clone().ok_or_else(|| Error::Record {
            name: record.name.clone(),
            reason: "no scheduler host".into(),
        })?;
        let worker = record.worker.clone().ok_or_else(|| Error::Record {
            name: record.name.clone(),
            reason: "no worker set".into(),
        })?;
        let first = worker.instances.first().ok_or_else(|| Error::Record {
            name: record.name.clone(),
            reason: "worker set is empty".into(),
        })?;

        info!(cluster = %record.name, "starting dask scheduler");
        self.channel
            .execute(
                &scheduler.credentials(),
                &scheduler.public_ip,
                &Instruction::StartScheduler,
            )
            .await?;

        let output = self
            .channel
            .execute(
                &first.credentials(),
                &first.public_ip,
                &Instruction::ProbeMemory,
            )
            .await?;
        let memory: u64 = output
            .first_line()
            .unwrap_or_default()
            .parse()
            .map_err(|_| Error::Remote {
                host: first.public_ip.clone(),
                reason: format!("unparseable memory probe output: '{}'", output.stdout_text()),
            })?;

        let options = worker.derive_options(memory);
        info!(
            nproc = options.nproc,
            nthread = options.nthread,
            memory_per_process = options.memory_per_process,
            "derived worker options"
        );

        let instruction = Instruction::StartWorker {
            scheduler_dns: scheduler.private_dns_name.clone(),
            nproc: options.nproc,
            nthread: options.nthread,
            memory_limit: options.memory_per_process,
        };
        // Per-host failures are logged, never fatal to the rollout.
        stream::iter(&worker.instances)
            .for_each_concurrent(self.worker_concurrency.max(1), |host| {
                let instruction = instruction.clone();
                async move {
                    if let Err(e) = self
                        .channel
                        .execute(&host.credentials(), &host.public_ip, &instruction)
                        .await
                    {
                        warn!(host = %host.public_ip, error = %e, "worker launch failed; continuing rollout");
                    }
                }
            })
            .await;

        let dashboard = format!("http://{}:{DASHBOARD_PORT}", scheduler.public_ip);
        info!(url = %dashboard, "waiting for the dask dashboard");
        self.wait_reachable(&dashboard).await?;
        record.dashboard_url = Some(dashboard);
        Ok(())
    }

    async fn start_notebook(&self, record: &mut ClusterRecord) -> Result<()> {
        let host = record.notebook.clone().ok_or_else(|| Error::Record {
            name: record.name.clone(),
            reason: "no notebook host".into(),
        })?;
        let creds = host.credentials();
        let setup = record.notebook_setup.clone().unwrap_or_default();

        info!(cluster = %record.name, host = %host.public_ip, "configuring notebook host");
        if let Some(git) = &setup.git {
            self.channel
                .execute(
                    &creds,
                    &host.public_ip,
                    &Instruction::InstallGitCredentials {
                        user: git.user.clone(),
                        email: git.email.clone(),
                    },
                )
                .await?;
        }
        if let Some(dir) = &setup.workdir {
            self.channel
                .execute(
                    &creds,
                    &host.public_ip,
                    &Instruction::EnsureWorkdir { dir: dir.clone() },
                )
                .await?;
        }
        if let (Some(git), Some(dir)) = (&setup.git, &setup.workdir) {
            let url =
                crate::remote::instruction::credentialed_url(&git.repository, &git.user, &git.password);
            let clone = Instruction::CloneRepo {
                url,
                dir: dir.clone(),
            };
            match self.channel.execute(&creds, &host.public_ip, &clone).await {
                Ok(_) => record.cloned_dir = cloned_dir(dir, &git.repository),
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) => warn!(error = %e, "repository clone failed; continuing"),
            }
        }
        if let Some(url) = &record.dashboard_url {
            self.channel
                .execute(
                    &creds,
                    &host.public_ip,
                    &Instruction::WriteDashboardConfig { url: url.clone() },
                )
                .await?;
        }

        let workdir = record.cloned_dir.clone().or(setup.workdir);
        self.channel
            .execute(&creds, &host.public_ip, &Instruction::StartNotebook { workdir })
            .await?;

        let channel = &self.channel;
        let creds_ref = &creds;
        let ip: &str = &host.public_ip;
        let url = retry(
            &self.endpoint_policy,
            &self.cancel,
            move |_| async move {
                let output = channel
                    .execute(creds_ref, ip, &Instruction::ListNotebookSessions)
                    .await?;
                match discover_token_url(&output.stdout, ip) {
                    Some(url) => Ok(Attempt::Ready(url)),
                    None => Ok(Attempt::Pending("no token-bearing session yet".into())),
                }
            },
            |attempts| Error::Timeout {
                what: format!("notebook session URL on {ip}"),
                attempts,
            },
        )
        .await?;

        info!(url = %url, "notebook ready");
        record.notebook_url = Some(url);
        Ok(())
    }

    /// Signal every daemon session in the cluster to terminate.
    ///
    /// Per-host failures are logged and do not stop the sweep; a host whose
    /// session is already gone reports an error from `screen` that is safe
    /// to ignore.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let record = self.store.load(name)?;

        match record.topology.as_deref() {
            Some("dask") => {
                info!(cluster = name, "stopping dask scheduler and workers");
                if let Some(scheduler) = &record.scheduler {
                    self.stop_daemon(scheduler).await;
                }
                if let Some(worker) = &record.worker {
                    for host in &worker.instances {
                        self.stop_daemon(host).await;
                    }
                }
            }
            Some(other) => {
                return Err(Error::NotImplemented(format!(
                    "stop for cluster type '{other}'"
                )))
            }
            None => {}
        }

        if let Some(notebook) = &record.notebook {
            info!(cluster = name, "stopping notebook session");
            self.stop_daemon(notebook).await;
        }

        Ok(())
    }

    async fn stop_daemon(&self, host: &HostInfo) {
        if let Err(e) = self
            .channel
            .execute(&host.credentials(), &host.public_ip, &Instruction::StopDaemon)
            .await
        {
            warn!(host = %host.public_ip, error = %e, "failed to stop daemon session");
        }
    }

    async fn wait_reachable(&self, url: &str) -> Result<()> {
        let target = Url::parse(url)?;
        let probe = &self.probe;
        let target_ref = &target;
        retry(
            &self.endpoint_policy,
            &self.cancel,
            move |_| async move {
                match probe.try_connect(target_ref, PROBE_TIMEOUT).await {
                    Ok(()) => Ok(Attempt::Ready(())),
                    Err(Error::Interrupted) => Err(Error::Interrupted),
                    Err(e) => Ok(Attempt::Pending(e.to_string())),
                }
            },
            |attempts| Error::Connection {
                endpoint: url.to_owned(),
                attempts,
            },
        )
        .await
    }
}

/// Directory a clone of `repository` lands in under `workdir`.
fn cloned_dir(workdir: &str, repository: &str) -> Option<String> {
    let stem = repository
        .trim_end_matches('/')
        .rsplit('/')
        .next()?
        .trim_end_matches(".git");
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}/{stem}", workdir.trim_end_matches('/')))
}

/// Find a token-bearing session URL in `jupyter notebook list` output and
/// rewrite its host to the public address.
fn discover_token_url(lines: &[String], public_ip: &str) -> Option<String> {
    for line in lines {
        let candidate = match line.split_whitespace().next() {
            Some(c) => c,
            None => continue,
        };
        if !candidate.contains("?token=") {
            continue;
        }
        if let Ok(mut url) = Url::parse(candidate) {
            if url.set_host(Some(public_ip)).is_ok() {
                return Some(url.to_string());
            }
        }
    }
    None
}

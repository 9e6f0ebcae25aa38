//! Cluster lifecycle sequencing.
//!
//! The orchestrator drives a named cluster through
//! `absent → provisioning → ready → stopped → absent`, using the resolver,
//! the remote channel, and the state store. Every external effect goes
//! through a collaborator trait, so the whole lifecycle runs against
//! scripted fakes in tests.

mod destroy;
mod launch;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::browser::BrowserLauncher;
use crate::cloud::{CloudProvider, CpuInfo, Instance, LaunchRequest};
use crate::error::{Error, Result, StoreError};
use crate::probe::ReachabilityProbe;
use crate::profile::{InstanceTemplate, Profile, Role, ValidatedSpec};
use crate::remote::RemoteChannel;
use crate::retry::{CancelToken, RetryPolicy};
use crate::store::{
    wire_now, ClusterRecord, ClusterStore, GitRemote, HostInfo, NotebookSetup, WorkerSet,
};

pub use destroy::DestroyMode;

/// Tuning knobs the orchestrator takes from settings.
pub struct OrchestratorOptions {
    /// Policy for dashboard and notebook-URL polling.
    pub endpoint_policy: RetryPolicy,
    /// Bound on concurrent worker configuration.
    pub worker_concurrency: usize,
    /// Explicit browser command, if configured.
    pub browser_command: Option<PathBuf>,
    pub cancel: CancelToken,
}

pub struct Orchestrator {
    provider: Arc<dyn CloudProvider>,
    channel: RemoteChannel,
    probe: Arc<dyn ReachabilityProbe>,
    browser: Arc<dyn BrowserLauncher>,
    store: ClusterStore,
    endpoint_policy: RetryPolicy,
    worker_concurrency: usize,
    browser_command: Option<PathBuf>,
    cancel: CancelToken,
}

/// A dask topology with both role templates validated.
struct DaskRollout {
    scheduler: ValidatedSpec,
    worker: ValidatedSpec,
    count: u32,
    nproc: Option<u32>,
    nthread: Option<u32>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        channel: RemoteChannel,
        probe: Arc<dyn ReachabilityProbe>,
        browser: Arc<dyn BrowserLauncher>,
        store: ClusterStore,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            provider,
            channel,
            probe,
            browser,
            store,
            endpoint_policy: options.endpoint_policy,
            worker_concurrency: options.worker_concurrency,
            browser_command: options.browser_command,
            cancel: options.cancel,
        }
    }

    /// Provision every role the profile activates and persist the record.
    ///
    /// Validation happens before any side effect. Once instances exist,
    /// failures surface as [`Error::CreateFailed`] carrying every created
    /// identifier; nothing is rolled back automatically.
    pub async fn create(&self, profile: &Profile, name: &str) -> Result<ClusterRecord> {
        if self.store.exists(name) {
            return Err(StoreError::Duplicate(name.to_owned()).into());
        }

        let dask = profile
            .dask
            .as_ref()
            .map(|d| {
                Ok::<_, Error>(DaskRollout {
                    scheduler: d.scheduler.validate(Role::Scheduler)?,
                    worker: d.worker.validate(Role::Worker)?,
                    count: d.worker_count,
                    nproc: d.nproc,
                    nthread: d.nthread,
                })
            })
            .transpose()?;
        let notebook = profile
            .notebook
            .as_ref()
            .map(|nb| nb.instance.validate(Role::Notebook))
            .transpose()?;

        info!(cluster = name, topology = ?profile.topology(), "creating cluster");

        let mut record = ClusterRecord::new(name, profile.topology(), profile.description.as_deref());
        if let Some(nb) = &profile.notebook {
            record.notebook_setup = Some(NotebookSetup {
                workdir: nb.workdir.clone(),
                git: nb.git.as_ref().map(|g| GitRemote {
                    repository: g.repository.clone(),
                    user: g.user.clone(),
                    password: g.password.clone(),
                    email: g.email.clone(),
                }),
            });
        }

        let prefix = profile.instance_prefix.as_deref();
        match self.provision(&mut record, prefix, dask.as_ref(), notebook.as_ref()).await {
            Ok(()) => {
                record.ready_time = Some(wire_now());
                self.store.save(&record)?;
                info!(cluster = name, instances = record.instances.len(), "cluster ready");
                Ok(record)
            }
            Err(e) => {
                if record.instances.is_empty() {
                    return Err(e);
                }
                error!(
                    cluster = name,
                    instances = ?record.instances,
                    "creation failed after provisioning; these instances are still running"
                );
                Err(Error::CreateFailed {
                    name: name.to_owned(),
                    instances: record.instances,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn provision(
        &self,
        record: &mut ClusterRecord,
        prefix: Option<&str>,
        dask: Option<&DaskRollout>,
        notebook: Option<&ValidatedSpec>,
    ) -> Result<()> {
        if let Some(d) = dask {
            let name = InstanceTemplate::instance_name(prefix, &record.name, Role::Scheduler);
            let (mut hosts, _) = self.provision_role(record, &d.scheduler, name, 1).await?;
            record.scheduler = hosts.pop();

            let name = InstanceTemplate::instance_name(prefix, &record.name, Role::Worker);
            let (hosts, cpu) = self.provision_role(record, &d.worker, name, d.count).await?;
            record.worker = Some(WorkerSet {
                nproc: d.nproc,
                nthread: d.nthread,
                cpu_info: cpu,
                instances: hosts,
            });
        }

        if let Some(spec) = notebook {
            let name = InstanceTemplate::instance_name(prefix, &record.name, Role::Notebook);
            let (mut hosts, _) = self.provision_role(record, spec, name, 1).await?;
            record.notebook = hosts.pop();
        }

        Ok(())
    }

    /// Create `count` instances for one role, wait until each is running,
    /// and capture its addresses. Identifiers are appended to the record
    /// as soon as creation returns, before any wait can fail.
    async fn provision_role(
        &self,
        record: &mut ClusterRecord,
        spec: &ValidatedSpec,
        name: String,
        count: u32,
    ) -> Result<(Vec<HostInfo>, CpuInfo)> {
        let request = LaunchRequest::from_spec(spec, name, count);
        let created = self.provider.create_instances(&request).await?;
        record
            .instances
            .extend(created.iter().map(|i| i.id.clone()));
        if record.launch_time.is_none() {
            record.launch_time = Some(wire_now());
        }

        let mut hosts = Vec::with_capacity(created.len());
        let mut cpu = CpuInfo::default();
        for instance in created {
            self.provider.wait_until_running(&instance.id).await?;
            let fresh = self.provider.refresh(&instance.id).await?;
            cpu = fresh.cpu;
            hosts.push(host_info(fresh, spec)?);
        }
        Ok((hosts, cpu))
    }

    /// Load the record for display.
    pub fn show(&self, name: &str) -> Result<ClusterRecord> {
        self.store.load(name)
    }

    /// Persisted record document, verbatim.
    pub fn show_raw(&self, name: &str) -> Result<String> {
        self.store.raw(name)
    }

    /// Names of every persisted cluster.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Open the recorded dashboard URL in the operator's browser.
    pub fn open_dashboard(&self, name: &str) -> Result<String> {
        let record = self.store.load(name)?;
        let url = record.dashboard_url.ok_or_else(|| Error::Record {
            name: name.to_owned(),
            reason: "no dashboard URL recorded; run start first".into(),
        })?;
        self.browser.open(&url, self.browser_command.as_deref())?;
        Ok(url)
    }

    /// Open the recorded notebook URL in the operator's browser.
    pub fn open_notebook(&self, name: &str) -> Result<String> {
        let record = self.store.load(name)?;
        let url = record.notebook_url.ok_or_else(|| Error::Record {
            name: name.to_owned(),
            reason: "no notebook URL recorded; run start first".into(),
        })?;
        self.browser.open(&url, self.browser_command.as_deref())?;
        Ok(url)
    }
}

fn host_info(instance: Instance, spec: &ValidatedSpec) -> Result<HostInfo> {
    let public_ip = instance.public_ip.ok_or_else(|| {
        Error::Provider(format!("instance {} has no public address", instance.id))
    })?;
    let private_dns_name = instance.private_dns_name.ok_or_else(|| {
        Error::Provider(format!("instance {} has no private DNS name", instance.id))
    })?;
    Ok(HostInfo {
        instance_id: instance.id,
        image_id: instance.image_id,
        public_ip,
        private_dns_name,
        key_name: instance.key_name,
        ssh_user: spec.ssh_user.clone(),
        ssh_private_key: spec.ssh_private_key.clone(),
        tags: instance.tags,
    })
}

/// What one role's provisioning request will look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePlan {
    pub role: Role,
    pub instance_name: String,
    pub count: u32,
    pub image: String,
    pub size: Option<String>,
    pub security_group: Option<String>,
    pub key_name: Option<String>,
}

/// Side-effect-free provisioning plan for a profile.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub cluster: String,
    pub topology: Option<&'static str>,
    pub roles: Vec<RolePlan>,
}

/// Resolve and validate the profile, reporting what `create` would do.
pub fn plan(profile: &Profile, name: &str) -> Result<ProvisionPlan> {
    let prefix = profile.instance_prefix.as_deref();
    let mut roles = Vec::new();

    if let Some(d) = &profile.dask {
        let scheduler = d.scheduler.validate(Role::Scheduler)?;
        roles.push(role_plan(&scheduler, prefix, name, 1));
        let worker = d.worker.validate(Role::Worker)?;
        roles.push(role_plan(&worker, prefix, name, d.worker_count));
    }
    if let Some(nb) = &profile.notebook {
        let spec = nb.instance.validate(Role::Notebook)?;
        roles.push(role_plan(&spec, prefix, name, 1));
    }

    Ok(ProvisionPlan {
        cluster: name.to_owned(),
        topology: profile.topology(),
        roles,
    })
}

fn role_plan(spec: &ValidatedSpec, prefix: Option<&str>, cluster: &str, count: u32) -> RolePlan {
    RolePlan {
        role: spec.role,
        instance_name: InstanceTemplate::instance_name(prefix, cluster, spec.role),
        count,
        image: spec.image.clone(),
        size: spec.size.clone(),
        security_group: spec.security_group.clone(),
        key_name: spec.key_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_lists_every_activated_role() {
        let profile = Profile::from_value(json!({
            "instance_prefix": "my-",
            "instance": {
                "image": "img-000",
                "ssh_user": "ubuntu",
                "ssh_private_key": "k.pem"
            },
            "dask": { "worker": { "count": 3 } },
            "notebook": { "instance": { "size": "m5.large" } }
        }))
        .unwrap();

        let plan = plan(&profile, "demo").unwrap();
        assert_eq!(plan.topology, Some("dask"));
        assert_eq!(plan.roles.len(), 3);
        assert_eq!(plan.roles[0].instance_name, "my-demo-scheduler");
        assert_eq!(plan.roles[1].count, 3);
        assert_eq!(plan.roles[2].role, Role::Notebook);
        assert_eq!(plan.roles[2].size.as_deref(), Some("m5.large"));
    }

    #[test]
    fn plan_fails_on_an_invalid_role_without_side_effects() {
        let profile = Profile::from_value(json!({
            "dask": {}
        }))
        .unwrap();
        assert!(plan(&profile, "demo").is_err());
    }
}

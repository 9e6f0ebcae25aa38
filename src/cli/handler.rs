//! Command dispatch.
//!
//! Wires the production collaborators together and hands each subcommand to
//! the orchestrator.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use tabled::{Table, Tabled};
use url::Url;

use crate::browser::SystemBrowser;
use crate::cloud::rest::RestCloudProvider;
use crate::error::Result;
use crate::orchestrator::{self, DestroyMode, Orchestrator, OrchestratorOptions, ProvisionPlan};
use crate::probe::HttpProbe;
use crate::profile::{self, Profile};
use crate::remote::ssh::SshTransport;
use crate::remote::RemoteChannel;
use crate::retry::CancelToken;
use crate::settings::Settings;
use crate::store::{ClusterRecord, ClusterStore};

use super::command::{Cli, Commands, DestroyArgs, NameArg, ProfileArgs, ShowArgs};
use super::output::Printer;
use super::paths;

/// Execute one parsed CLI invocation.
pub async fn dispatch(cli: Cli, settings: Settings, cancel: CancelToken) -> Result<()> {
    let printer = Printer::new(cli.quiet);
    let orchestrator = build_orchestrator(&settings, cancel)?;

    match cli.command {
        Commands::Plan(args) => plan(&printer, &args),
        Commands::Create(args) => create(&printer, &orchestrator, &args).await,
        Commands::List => list(&printer, &orchestrator),
        Commands::Show(args) => show(&printer, &orchestrator, &args),
        Commands::Start(args) => start(&printer, &orchestrator, &args).await,
        Commands::Stop(args) => stop(&printer, &orchestrator, &args).await,
        Commands::Destroy(args) => destroy(&printer, &orchestrator, &args).await,
        Commands::OpenDashboard(args) => {
            let url = orchestrator.open_dashboard(&args.name)?;
            printer.result(url);
            Ok(())
        }
        Commands::OpenNotebook(args) => {
            let url = orchestrator.open_notebook(&args.name)?;
            printer.result(url);
            Ok(())
        }
    }
}

fn build_orchestrator(settings: &Settings, cancel: CancelToken) -> Result<Orchestrator> {
    let base_url = Url::parse(&settings.provider.base_url)?;
    let token = settings.provider_token().unwrap_or_default();
    let provider = Arc::new(RestCloudProvider::new(
        base_url,
        token,
        settings.retry.instance.policy(),
        cancel.clone(),
    )?);
    let channel = RemoteChannel::new(
        Arc::new(SshTransport::new()),
        settings.retry.connect.policy(),
        cancel.clone(),
    );
    let probe = Arc::new(HttpProbe::new()?);
    let browser = Arc::new(SystemBrowser::new());
    let store = ClusterStore::new(paths::clusters_dir());

    Ok(Orchestrator::new(
        provider,
        channel,
        probe,
        browser,
        store,
        OrchestratorOptions {
            endpoint_policy: settings.retry.endpoint.policy(),
            worker_concurrency: settings.rollout.worker_concurrency,
            browser_command: settings.browser.command.as_ref().map(PathBuf::from),
            cancel,
        },
    ))
}

fn resolve_profile(args: &ProfileArgs) -> Result<(Profile, String)> {
    let path = profile::locate(&paths::profiles_dir(), &args.profile);
    let profile = Profile::load(&path, &args.params)?;
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| profile::default_cluster_name(&path));
    Ok((profile, name))
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Role")]
    role: &'static str,
    #[tabled(rename = "Instance Name")]
    name: String,
    #[tabled(rename = "Count")]
    count: u32,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Key")]
    key: String,
}

fn plan(printer: &Printer, args: &ProfileArgs) -> Result<()> {
    let (profile, name) = resolve_profile(args)?;
    let plan = orchestrator::plan(&profile, &name)?;
    render_plan(printer, &plan);
    Ok(())
}

fn render_plan(printer: &Printer, plan: &ProvisionPlan) {
    printer.heading(format!("Cluster '{}'", plan.cluster));
    printer.field("type", plan.topology.unwrap_or("none"));
    if plan.roles.is_empty() {
        printer.note("nothing to provision");
        return;
    }

    let rows: Vec<PlanRow> = plan
        .roles
        .iter()
        .map(|r| PlanRow {
            role: r.role.as_str(),
            name: r.instance_name.clone(),
            count: r.count,
            image: r.image.clone(),
            size: r.size.clone().unwrap_or_default(),
            key: r.key_name.clone().unwrap_or_default(),
        })
        .collect();
    for line in Table::new(rows).to_string().lines() {
        printer.note(line);
    }
}

async fn create(printer: &Printer, orchestrator: &Orchestrator, args: &ProfileArgs) -> Result<()> {
    let (profile, name) = resolve_profile(args)?;
    let record = orchestrator.create(&profile, &name).await?;
    printer.success(format!(
        "cluster '{}' created with {} instance(s)",
        record.name,
        record.instances.len()
    ));
    render_record(printer, &record);
    Ok(())
}

fn list(printer: &Printer, orchestrator: &Orchestrator) -> Result<()> {
    for name in orchestrator.list()? {
        printer.result(name);
    }
    Ok(())
}

fn show(printer: &Printer, orchestrator: &Orchestrator, args: &ShowArgs) -> Result<()> {
    if args.detail {
        printer.result(orchestrator.show_raw(&args.name)?);
        return Ok(());
    }
    let record = orchestrator.show(&args.name)?;
    render_record(printer, &record);
    Ok(())
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Role")]
    role: &'static str,
    #[tabled(rename = "Instance")]
    instance_id: String,
    #[tabled(rename = "Public IP")]
    public_ip: String,
    #[tabled(rename = "Private DNS")]
    private_dns: String,
}

fn render_record(printer: &Printer, record: &ClusterRecord) {
    printer.heading(format!("Cluster '{}'", record.name));
    printer.field("type", record.topology.as_deref().unwrap_or("none"));
    if let Some(description) = &record.description {
        printer.field("description", description);
    }
    if let Some(ready) = &record.ready_time {
        printer.field("ready", ready.format("%Y-%m-%d %H:%M:%S"));
    }

    let mut rows = Vec::new();
    if let Some(scheduler) = &record.scheduler {
        rows.push(host_row("scheduler", scheduler));
    }
    if let Some(worker) = &record.worker {
        rows.extend(worker.instances.iter().map(|h| host_row("worker", h)));
    }
    if let Some(notebook) = &record.notebook {
        rows.push(host_row("notebook", notebook));
    }
    if !rows.is_empty() {
        for line in Table::new(rows).to_string().lines() {
            printer.note(line);
        }
    }

    if let Some(url) = &record.dashboard_url {
        printer.field("dashboard", url);
    }
    if let Some(url) = &record.notebook_url {
        printer.field("notebook", url);
    }
}

fn host_row(role: &'static str, host: &crate::store::HostInfo) -> HostRow {
    HostRow {
        role,
        instance_id: host.instance_id.clone(),
        public_ip: host.public_ip.clone(),
        private_dns: host.private_dns_name.clone(),
    }
}

async fn start(printer: &Printer, orchestrator: &Orchestrator, args: &NameArg) -> Result<()> {
    let record = orchestrator.start(&args.name).await?;
    printer.success(format!("cluster '{}' started", record.name));
    if let Some(url) = &record.dashboard_url {
        printer.result(format!("dashboard: {url}"));
    }
    if let Some(url) = &record.notebook_url {
        printer.result(format!("notebook: {url}"));
    }
    Ok(())
}

async fn stop(printer: &Printer, orchestrator: &Orchestrator, args: &NameArg) -> Result<()> {
    orchestrator.stop(&args.name).await?;
    printer.success(format!("cluster '{}' stopped", args.name));
    Ok(())
}

async fn destroy(printer: &Printer, orchestrator: &Orchestrator, args: &DestroyArgs) -> Result<()> {
    let mode = if args.force {
        DestroyMode::Force
    } else if std::io::stdin().is_terminal() {
        DestroyMode::Interactive
    } else {
        DestroyMode::Unattended
    };
    let terminated = orchestrator.destroy(&args.name, mode).await?;
    printer.success(format!(
        "cluster '{}' destroyed ({} instance(s) terminated)",
        args.name,
        terminated.len()
    ));
    Ok(())
}

//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests). One scripted fake per collaborator trait:
//!
//! - [`MockCloud`] — deterministic instance ids/addresses, a terminate log,
//!   and per-call scripted creation failures.
//! - [`ScriptedTransport`] — maps command substrings to canned output,
//!   records every executed command, and can refuse connections per host.
//! - [`StaticProbe`] — reachability after a configurable number of refused
//!   attempts.
//! - [`NullBrowser`] — records opened URLs instead of spawning anything.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::browser::BrowserLauncher;
use crate::cloud::{CloudProvider, CpuInfo, Instance, LaunchRequest};
use crate::error::{Error, Result};
use crate::probe::ReachabilityProbe;
use crate::remote::{CommandOutput, Credentials, RemoteSession, RemoteTransport};
use crate::retry::RetryPolicy;

/// A retry policy short enough for tests.
#[must_use]
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

// ---------------------------------------------------------------------------
// MockCloud
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CloudState {
    next_id: u32,
    create_calls: u32,
    requests: Vec<LaunchRequest>,
    instances: Vec<Instance>,
    terminated: Vec<String>,
    create_failures: Vec<(u32, String)>,
}

/// Deterministic in-memory provider.
///
/// Instance ids are `i-0001, i-0002, ...` in creation order; addresses are
/// derived from the id so assertions stay stable.
#[derive(Clone, Default)]
pub struct MockCloud {
    cpu: CpuInfo,
    state: Arc<Mutex<CloudState>>,
}

impl MockCloud {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cpu: CpuInfo {
                core_count: 2,
                threads_per_core: 2,
            },
            state: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_cpu(mut self, cpu: CpuInfo) -> Self {
        self.cpu = cpu;
        self
    }

    /// Fail the `call`th create call (1-based), so a multi-role rollout
    /// can be broken after earlier roles already created instances.
    pub fn fail_create_call(&self, call: u32, reason: &str) {
        self.state
            .lock()
            .create_failures
            .push((call, reason.to_owned()));
    }

    /// Every launch request seen, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.state.lock().requests.clone()
    }

    /// Ids passed to terminate calls, in order.
    #[must_use]
    pub fn terminated(&self) -> Vec<String> {
        self.state.lock().terminated.clone()
    }

    /// Ids created and not yet terminated.
    #[must_use]
    pub fn live_instances(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .instances
            .iter()
            .map(|i| i.id.clone())
            .filter(|id| !state.terminated.contains(id))
            .collect()
    }
}

#[async_trait]
impl CloudProvider for MockCloud {
    async fn create_instances(&self, request: &LaunchRequest) -> Result<Vec<Instance>> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        let call = state.create_calls;
        if let Some(pos) = state.create_failures.iter().position(|(c, _)| *c == call) {
            let (_, reason) = state.create_failures.remove(pos);
            return Err(Error::Provider(reason));
        }
        state.requests.push(request.clone());

        let mut created = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            state.next_id += 1;
            let n = state.next_id;
            let instance = Instance {
                id: format!("i-{n:04}"),
                image_id: request.image.clone(),
                public_ip: Some(format!("203.0.113.{n}")),
                private_dns_name: Some(format!("ip-10-0-0-{n}.internal")),
                key_name: request.key_name.clone(),
                cpu: self.cpu,
                tags: request.tag_set(),
            };
            state.instances.push(instance.clone());
            created.push(instance);
        }
        Ok(created)
    }

    async fn wait_until_running(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn refresh(&self, id: &str) -> Result<Instance> {
        self.state
            .lock()
            .instances
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("unknown instance {id}")))
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        self.state.lock().terminated.extend(ids.iter().cloned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransportState {
    responses: Vec<(String, Vec<String>)>,
    refused_hosts: Vec<String>,
    log: Vec<(String, String)>,
}

/// A transport answering commands from a substring-keyed script.
///
/// The first response whose key is a substring of the command wins;
/// unmatched commands return empty output. Every executed command is
/// logged as `(host, command)`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script stdout lines for commands containing `needle`.
    #[must_use]
    pub fn with_response(self, needle: &str, stdout: &[&str]) -> Self {
        self.state
            .lock()
            .responses
            .push((needle.to_owned(), stdout.iter().map(|s| (*s).to_owned()).collect()));
        self
    }

    /// Make every connect to `host` fail.
    #[must_use]
    pub fn refusing_host(self, host: &str) -> Self {
        self.state.lock().refused_hosts.push(host.to_owned());
        self
    }

    /// Commands executed so far, as `(host, command)` pairs.
    #[must_use]
    pub fn log(&self) -> Vec<(String, String)> {
        self.state.lock().log.clone()
    }

    /// Commands executed against `host`.
    #[must_use]
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

struct ScriptedSession {
    state: Arc<Mutex<TransportState>>,
    host: String,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut state = self.state.lock();
        state.log.push((self.host.clone(), command.to_owned()));
        let stdout = state
            .responses
            .iter()
            .find(|(needle, _)| command.contains(needle))
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: Vec::new(),
        })
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn connect(&self, _creds: &Credentials, host: &str) -> Result<Box<dyn RemoteSession>> {
        if self.state.lock().refused_hosts.iter().any(|h| h == host) {
            return Err(Error::Remote {
                host: host.to_owned(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(ScriptedSession {
            state: self.state.clone(),
            host: host.to_owned(),
        }))
    }
}

// ---------------------------------------------------------------------------
// StaticProbe
// ---------------------------------------------------------------------------

/// A probe that refuses a fixed number of attempts, then answers.
pub struct StaticProbe {
    remaining_failures: Mutex<u32>,
}

impl StaticProbe {
    /// Reachable immediately.
    #[must_use]
    pub fn reachable() -> Self {
        Self::after_attempts(0)
    }

    /// Reachable after `n` refused attempts.
    #[must_use]
    pub fn after_attempts(n: u32) -> Self {
        Self {
            remaining_failures: Mutex::new(n),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn try_connect(&self, url: &Url, _timeout: Duration) -> Result<()> {
        let mut remaining = self.remaining_failures.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(Error::Connection {
                endpoint: url.to_string(),
                attempts: 1,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NullBrowser
// ---------------------------------------------------------------------------

/// A launcher that records URLs instead of opening anything.
#[derive(Default)]
pub struct NullBrowser {
    opened: Mutex<Vec<String>>,
}

impl NullBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl BrowserLauncher for NullBrowser {
    fn open(&self, url: &str, _explicit: Option<&Path>) -> Result<()> {
        self.opened.lock().push(url.to_owned());
        Ok(())
    }
}

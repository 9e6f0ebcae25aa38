//! Durable cluster descriptor.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::cloud::CpuInfo;
use crate::remote::Credentials;

/// Durable state for a named cluster.
///
/// Created empty when a creation request is accepted, filled incrementally
/// as each role's instances become reachable, persisted once ready. The
/// orchestrator is the sole writer; every other operation reads until
/// destroy. `instances` is the authoritative set for teardown: every
/// identifier ever created for this cluster appears here, even when a
/// later step fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire_time")]
    pub launch_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wire_time")]
    pub ready_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<HostInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook: Option<HostInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_setup: Option<NotebookSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloned_dir: Option<String>,
}

impl ClusterRecord {
    /// Fresh record for an accepted creation request.
    #[must_use]
    pub fn new(name: &str, topology: Option<&str>, description: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            topology: topology.map(str::to_owned),
            description: description.map(str::to_owned),
            launch_time: None,
            ready_time: None,
            instances: Vec::new(),
            scheduler: None,
            worker: None,
            notebook: None,
            notebook_setup: None,
            notebook_url: None,
            dashboard_url: None,
            cloned_dir: None,
        }
    }
}

/// Current time truncated to the precision the wire format keeps, so a
/// freshly stamped record round-trips the store unchanged.
#[must_use]
pub fn wire_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// One reachable provisioned host with its session credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub instance_id: String,
    pub image_id: String,
    pub public_ip: String,
    pub private_dns_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    pub ssh_user: String,
    pub ssh_private_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<(String, String)>,
}

impl HostInfo {
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.ssh_user.clone(), self.ssh_private_key.clone())
    }
}

/// Notebook configuration carried from the profile into the record, so
/// `start` can configure the host from the record alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebookSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitRemote>,
}

/// Clone source and credentials for the notebook working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRemote {
    pub repository: String,
    pub user: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Shared worker-role configuration plus the per-instance host list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nproc: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nthread: Option<u32>,
    pub cpu_info: CpuInfo,
    pub instances: Vec<HostInfo>,
}

/// Launch options for one dask worker daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub nproc: u32,
    pub nthread: u32,
    pub memory_per_process: u64,
}

impl WorkerSet {
    /// Derive daemon launch options from configured hints, the provider's
    /// CPU shape, and the probed total memory.
    ///
    /// Unset hints default to the discovered core count; memory divides
    /// evenly (integer floor) across processes.
    #[must_use]
    pub fn derive_options(&self, probed_memory: u64) -> WorkerOptions {
        let cores = self.cpu_info.core_count.max(1);
        let nproc = self.nproc.unwrap_or(cores).max(1);
        let nthread = self.nthread.unwrap_or(cores).max(1);
        WorkerOptions {
            nproc,
            nthread,
            memory_per_process: probed_memory / u64::from(nproc),
        }
    }
}

/// Fixed wire format for record timestamps.
pub(crate) mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, FORMAT)
                .map(|naive| naive.and_utc())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn host(id: &str) -> HostInfo {
        HostInfo {
            instance_id: id.into(),
            image_id: "img-1".into(),
            public_ip: "203.0.113.10".into(),
            private_dns_name: "ip-10-0-0-1.internal".into(),
            key_name: Some("key".into()),
            ssh_user: "ubuntu".into(),
            ssh_private_key: "~/.ssh/key.pem".into(),
            tags: vec![],
        }
    }

    #[test]
    fn timestamps_use_the_wire_format() {
        let mut record = ClusterRecord::new("demo", Some("dask"), None);
        record.ready_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap());

        let json = serde_json::to_string_pretty(&record).unwrap();
        assert!(json.contains("\"ready_time\": \"2024-03-01 12:30:05\""));
        assert!(!json.contains("launch_time"));

        let parsed: ClusterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ready_time, record.ready_time);
        assert_eq!(parsed.topology.as_deref(), Some("dask"));
    }

    #[test]
    fn stamped_times_round_trip_the_store() {
        let mut record = ClusterRecord::new("demo", Some("dask"), None);
        record.launch_time = Some(wire_now());
        record.ready_time = Some(wire_now());

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ClusterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.launch_time, record.launch_time);
        assert_eq!(parsed.ready_time, record.ready_time);
    }

    #[test]
    fn absent_blocks_are_omitted() {
        let record = ClusterRecord::new("demo", None, None);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"type\""));
        assert!(!json.contains("notebook"));
        assert!(!json.contains("scheduler"));
    }

    #[test]
    fn worker_options_respect_hints() {
        let set = WorkerSet {
            nproc: Some(2),
            nthread: Some(8),
            cpu_info: CpuInfo {
                core_count: 4,
                threads_per_core: 2,
            },
            instances: vec![host("i-1")],
        };
        let opts = set.derive_options(8_000_000_000);
        assert_eq!(opts.nproc, 2);
        assert_eq!(opts.nthread, 8);
        assert_eq!(opts.memory_per_process, 4_000_000_000);
    }

    #[test]
    fn worker_options_default_to_core_count() {
        let set = WorkerSet {
            nproc: None,
            nthread: None,
            cpu_info: CpuInfo {
                core_count: 4,
                threads_per_core: 2,
            },
            instances: vec![],
        };
        let opts = set.derive_options(9_000_000_000);
        assert_eq!(opts.nproc, 4);
        assert_eq!(opts.nthread, 4);
        // Integer floor division.
        assert_eq!(opts.memory_per_process, 2_250_000_000);
    }

    #[test]
    fn host_credentials_carry_user_and_key() {
        let creds = host("i-1").credentials();
        assert_eq!(creds.user, "ubuntu");
        assert_eq!(creds.key_path, "~/.ssh/key.pem");
    }
}

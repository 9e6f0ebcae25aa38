//! Layered cluster profiles.
//!
//! A profile is a JSON document describing one cluster creation request: a
//! base instance template, an optional notebook sub-profile, and an optional
//! dask topology sub-profile. CLI overrides are applied to the raw document
//! before it is typed, and role templates are merged with the base at
//! resolve time. Validation of a role's template happens lazily, when the
//! role is first activated, so profiles with unused roles never trigger
//! unrelated errors.

mod overrides;
mod spec;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, Result};

pub use overrides::apply_overrides;
pub use spec::{InstanceTemplate, Role, ValidatedSpec};

/// Resolved configuration for one cluster creation request.
///
/// Built once per call and immutable thereafter; the role templates have
/// already inherited from the base template.
#[derive(Debug, Clone)]
pub struct Profile {
    pub description: Option<String>,
    pub instance_prefix: Option<String>,
    pub base: InstanceTemplate,
    pub notebook: Option<NotebookProfile>,
    pub dask: Option<DaskProfile>,
}

/// Notebook sub-profile with its merged instance template.
#[derive(Debug, Clone)]
pub struct NotebookProfile {
    pub instance: InstanceTemplate,
    pub workdir: Option<String>,
    pub git: Option<GitSource>,
}

/// Git clone credentials for the notebook working directory.
#[derive(Debug, Clone, Deserialize)]
pub struct GitSource {
    pub repository: String,
    pub user: String,
    pub password: String,
    pub email: Option<String>,
}

/// Dask topology sub-profile with merged role templates.
#[derive(Debug, Clone)]
pub struct DaskProfile {
    pub scheduler: InstanceTemplate,
    pub worker: InstanceTemplate,
    pub worker_count: u32,
    pub nproc: Option<u32>,
    pub nthread: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    description: Option<String>,
    instance_prefix: Option<String>,
    instance: Option<InstanceTemplate>,
    notebook: Option<RawNotebook>,
    dask: Option<RawDask>,
}

#[derive(Debug, Deserialize)]
struct RawNotebook {
    instance: Option<InstanceTemplate>,
    workdir: Option<String>,
    git: Option<GitSource>,
}

#[derive(Debug, Deserialize)]
struct RawDask {
    scheduler: Option<RawRole>,
    worker: Option<RawWorker>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    instance: Option<InstanceTemplate>,
}

#[derive(Debug, Deserialize)]
struct RawWorker {
    instance: Option<InstanceTemplate>,
    count: Option<u32>,
    nproc: Option<u32>,
    nthread: Option<u32>,
}

impl Profile {
    /// Read a profile document, apply CLI overrides to the raw JSON, and
    /// resolve it.
    pub fn load(path: &Path, overrides: &[String]) -> Result<Profile> {
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        let mut raw: Value = serde_json::from_str(&body).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        apply_overrides(&mut raw, overrides)?;
        Ok(Self::from_value(raw)?)
    }

    /// Resolve a raw JSON document into a typed profile.
    pub fn from_value(raw: Value) -> std::result::Result<Profile, ConfigError> {
        let raw: RawProfile =
            serde_json::from_value(raw).map_err(|e| ConfigError::InvalidValue {
                field: "profile",
                reason: e.to_string(),
            })?;

        let base = raw.instance.unwrap_or_default();

        let notebook = match raw.notebook {
            None => None,
            Some(nb) => {
                // The notebook block must carry its own instance mapping,
                // even an empty one; a bare block is a profile mistake.
                let own = nb.instance.ok_or(ConfigError::MissingField {
                    field: "instance",
                    role: "notebook",
                })?;
                Some(NotebookProfile {
                    instance: base.merged_with(&own),
                    workdir: nb.workdir,
                    git: nb.git,
                })
            }
        };

        let dask = raw.dask.map(|d| {
            let scheduler = d
                .scheduler
                .and_then(|r| r.instance)
                .map(|t| base.merged_with(&t))
                .unwrap_or_else(|| base.clone());
            let (worker, count, nproc, nthread) = match d.worker {
                Some(w) => (
                    w.instance
                        .map(|t| base.merged_with(&t))
                        .unwrap_or_else(|| base.clone()),
                    w.count.unwrap_or(1),
                    w.nproc,
                    w.nthread,
                ),
                None => (base.clone(), 1, None, None),
            };
            DaskProfile {
                scheduler,
                worker,
                worker_count: count,
                nproc,
                nthread,
            }
        });

        Ok(Profile {
            description: raw.description,
            instance_prefix: raw.instance_prefix,
            base,
            notebook,
            dask,
        })
    }

    /// Topology name persisted in the cluster record, if any.
    #[must_use]
    pub fn topology(&self) -> Option<&'static str> {
        self.dask.as_ref().map(|_| "dask")
    }
}

/// Resolve a profile argument to a document path.
///
/// An argument that names an existing file (or contains a path separator)
/// is used as-is; otherwise it addresses `profiles_dir`, with `.json`
/// appended when no extension is given.
#[must_use]
pub fn locate(profiles_dir: &Path, arg: &str) -> PathBuf {
    let direct = PathBuf::from(arg);
    if direct.exists() || arg.contains(std::path::MAIN_SEPARATOR) {
        return direct;
    }
    let file = if Path::new(arg).extension().is_some() {
        arg.to_owned()
    } else {
        format!("{arg}.json")
    };
    profiles_dir.join(file)
}

/// Default cluster name for a profile document: the file stem, lowercased.
#[must_use]
pub fn default_cluster_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "cluster".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_value() -> Value {
        json!({
            "description": "Description",
            "instance": {
                "image": "img-000",
                "size": "base-size",
                "key_name": "base-key",
                "ssh_user": "ubuntu",
                "ssh_private_key": "base-key.pem",
                "tags": [
                    ["Owner", "BaseOwner"],
                    ["Service", "BaseService"]
                ]
            }
        })
    }

    #[test]
    fn dask_roles_inherit_the_base_template() {
        let mut value = base_value();
        value["dask"] = json!({});
        let profile = Profile::from_value(value).unwrap();

        assert_eq!(profile.description.as_deref(), Some("Description"));
        assert_eq!(profile.topology(), Some("dask"));
        assert!(profile.notebook.is_none());

        let dask = profile.dask.unwrap();
        assert_eq!(dask.scheduler.image.as_deref(), Some("img-000"));
        assert_eq!(dask.scheduler.security_group, None);
        assert_eq!(dask.worker.image.as_deref(), Some("img-000"));
        assert_eq!(dask.worker_count, 1);
        assert_eq!(dask.worker.tags.len(), 2);
    }

    #[test]
    fn dask_role_overrides_win_over_the_base() {
        let mut value = base_value();
        value["instance"]["security_group"] = json!("sg-000");
        value["dask"] = json!({
            "scheduler": {
                "instance": {
                    "image": "img-001",
                    "size": "scd-size",
                    "security_group": "sg-001",
                    "key_name": "scd-key",
                    "ssh_user": "ec2-user",
                    "ssh_private_key": "scd-key.pem",
                    "tags": [["Owner", "ScdOwner"]]
                }
            },
            "worker": {
                "instance": {
                    "image": "img-002",
                    "size": "wrk-size",
                    "key_name": "wrk-key",
                    "ssh_private_key": "wrk-key.pem"
                },
                "count": 2
            }
        });

        let dask = Profile::from_value(value).unwrap().dask.unwrap();

        assert_eq!(dask.scheduler.image.as_deref(), Some("img-001"));
        assert_eq!(dask.scheduler.security_group.as_deref(), Some("sg-001"));
        assert_eq!(dask.scheduler.ssh_user.as_deref(), Some("ec2-user"));
        // Base tags come first, then the role's own.
        assert_eq!(dask.scheduler.tags.len(), 3);
        assert_eq!(dask.scheduler.tags[2].1, "ScdOwner");

        assert_eq!(dask.worker.image.as_deref(), Some("img-002"));
        assert_eq!(dask.worker.security_group.as_deref(), Some("sg-000"));
        assert_eq!(dask.worker.ssh_user.as_deref(), Some("ubuntu"));
        assert_eq!(dask.worker.ssh_private_key.as_deref(), Some("wrk-key.pem"));
        assert_eq!(dask.worker_count, 2);
    }

    #[test]
    fn empty_profile_resolves_with_no_roles() {
        let profile = Profile::from_value(json!({})).unwrap();
        assert!(profile.notebook.is_none());
        assert!(profile.dask.is_none());
        assert_eq!(profile.topology(), None);
        assert_eq!(profile.base, InstanceTemplate::default());
    }

    #[test]
    fn notebook_block_requires_an_instance_mapping() {
        let err = Profile::from_value(json!({ "notebook": {} })).unwrap_err();
        match err {
            ConfigError::MissingField { field, role } => {
                assert_eq!(field, "instance");
                assert_eq!(role, "notebook");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn notebook_validation_is_lazy() {
        // Resolving succeeds; only validating the notebook role reports the
        // missing image.
        let profile =
            Profile::from_value(json!({ "notebook": { "instance": {} } })).unwrap();
        let nb = profile.notebook.unwrap();
        let err = nb.instance.validate(Role::Notebook).unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn notebook_inherits_and_keeps_workdir_and_git() {
        let mut value = base_value();
        value["instance_prefix"] = json!("my-");
        value["notebook"] = json!({
            "instance": { "size": "m5.xlarge" },
            "workdir": "~/works",
            "git": {
                "repository": "https://example.com/u/repo.git",
                "user": "u",
                "password": "secret",
                "email": "u@example.com"
            }
        });

        let profile = Profile::from_value(value).unwrap();
        assert_eq!(profile.instance_prefix.as_deref(), Some("my-"));

        let nb = profile.notebook.unwrap();
        assert_eq!(nb.instance.image.as_deref(), Some("img-000"));
        assert_eq!(nb.instance.size.as_deref(), Some("m5.xlarge"));
        assert_eq!(nb.workdir.as_deref(), Some("~/works"));
        let git = nb.git.unwrap();
        assert_eq!(git.user, "u");
        assert_eq!(git.password, "secret");

        assert_eq!(
            InstanceTemplate::instance_name(
                profile.instance_prefix.as_deref(),
                "test",
                Role::Notebook
            ),
            "my-test-notebook"
        );
    }

    #[test]
    fn overrides_on_fresh_paths_survive_typed_resolution() {
        // `count` is a u32 in the typed profile; an override creating the
        // whole dask block from scratch must still deserialize.
        let mut value = base_value();
        apply_overrides(&mut value, &["dask.worker.count=3".into()]).unwrap();

        let profile = Profile::from_value(value).unwrap();
        assert_eq!(profile.dask.unwrap().worker_count, 3);
    }

    #[test]
    fn ssh_credentials_are_checked_at_activation() {
        let value = json!({
            "instance": {
                "image": "img-000",
                "size": "base-size",
                "key_name": "base-key"
            },
            "dask": { "worker": { "count": 2 } }
        });
        let profile = Profile::from_value(value).unwrap();
        let dask = profile.dask.unwrap();
        let err = dask.worker.validate(Role::Worker).unwrap_err();
        assert!(err.to_string().contains("ssh"));
    }

    #[test]
    fn locate_prefers_existing_paths_and_appends_extension() {
        let dir = Path::new("/srv/profiles");
        assert_eq!(locate(dir, "analytics"), dir.join("analytics.json"));
        assert_eq!(locate(dir, "analytics.json"), dir.join("analytics.json"));
        assert_eq!(
            locate(dir, "/tmp/custom.json"),
            PathBuf::from("/tmp/custom.json")
        );
    }

    #[test]
    fn default_name_is_the_lowercased_stem() {
        assert_eq!(
            default_cluster_name(Path::new("/x/Analytics.json")),
            "analytics"
        );
    }
}

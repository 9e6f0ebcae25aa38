//! Per-role instance templates and their merge/validation rules.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Functional category of a provisioned host within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Scheduler,
    Worker,
    Notebook,
}

impl Role {
    /// Suffix used when composing instance names.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Role::Scheduler => "scheduler",
            Role::Worker => "worker",
            Role::Notebook => "notebook",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.suffix()
    }
}

/// Role-scoped provisioning descriptor.
///
/// Every scalar field is optional at the profile layer; role templates
/// inherit unset fields from the base template via [`merged_with`]. Whether
/// a missing field is an error is decided lazily, when the role is first
/// activated, by [`validate`].
///
/// [`merged_with`]: InstanceTemplate::merged_with
/// [`validate`]: InstanceTemplate::validate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    /// Machine image identifier.
    pub image: Option<String>,
    /// Machine size / instance type.
    pub size: Option<String>,
    /// Security group identifier.
    pub security_group: Option<String>,
    /// Provider key-pair identifier.
    pub key_name: Option<String>,
    /// User name for remote sessions.
    pub ssh_user: Option<String>,
    /// Path to the private key for remote sessions.
    pub ssh_private_key: Option<String>,
    /// Ordered (key, value) tags. Duplicate keys are legal and additive.
    #[serde(default)]
    pub tags: Vec<(String, String)>,
}

impl InstanceTemplate {
    /// Produce a new template where every field set in `overlay` replaces
    /// the corresponding field here; unset fields inherit. Tags concatenate,
    /// base tags first.
    #[must_use]
    pub fn merged_with(&self, overlay: &InstanceTemplate) -> InstanceTemplate {
        let mut tags = self.tags.clone();
        tags.extend(overlay.tags.iter().cloned());

        InstanceTemplate {
            image: overlay.image.clone().or_else(|| self.image.clone()),
            size: overlay.size.clone().or_else(|| self.size.clone()),
            security_group: overlay
                .security_group
                .clone()
                .or_else(|| self.security_group.clone()),
            key_name: overlay.key_name.clone().or_else(|| self.key_name.clone()),
            ssh_user: overlay.ssh_user.clone().or_else(|| self.ssh_user.clone()),
            ssh_private_key: overlay
                .ssh_private_key
                .clone()
                .or_else(|| self.ssh_private_key.clone()),
            tags,
        }
    }

    /// Compose the instance name for `role` in cluster `cluster`:
    /// `{prefix}{cluster}-{role}`.
    #[must_use]
    pub fn instance_name(prefix: Option<&str>, cluster: &str, role: Role) -> String {
        format!("{}{}-{}", prefix.unwrap_or(""), cluster, role.suffix())
    }

    /// Check that the fields required to provision this template for `role`
    /// are present.
    ///
    /// The image is always required. SSH credentials are required only when
    /// the template will be used to open a remote session, which is the case
    /// for every concrete role; a base-only profile with no active role is
    /// never validated and therefore never fails here.
    pub fn validate(&self, role: Role) -> Result<ValidatedSpec, ConfigError> {
        let role_name = role.as_str();

        let image = non_empty(self.image.as_deref()).ok_or(ConfigError::MissingField {
            field: "image",
            role: role_name,
        })?;
        let ssh_user = non_empty(self.ssh_user.as_deref()).ok_or(ConfigError::MissingField {
            field: "ssh_user",
            role: role_name,
        })?;
        let ssh_private_key =
            non_empty(self.ssh_private_key.as_deref()).ok_or(ConfigError::MissingField {
                field: "ssh_private_key",
                role: role_name,
            })?;

        Ok(ValidatedSpec {
            role,
            image: image.to_owned(),
            size: self.size.clone(),
            security_group: self.security_group.clone(),
            key_name: self.key_name.clone(),
            ssh_user: ssh_user.to_owned(),
            ssh_private_key: ssh_private_key.to_owned(),
            tags: self.tags.clone(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// An [`InstanceTemplate`] that passed validation for a concrete role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSpec {
    pub role: Role,
    pub image: String,
    pub size: Option<String>,
    pub security_group: Option<String>,
    pub key_name: Option<String>,
    pub ssh_user: String,
    pub ssh_private_key: String,
    pub tags: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> InstanceTemplate {
        InstanceTemplate {
            image: Some("img-000".into()),
            size: Some("base-size".into()),
            security_group: Some("sg-000".into()),
            key_name: Some("base-key".into()),
            ssh_user: Some("ubuntu".into()),
            ssh_private_key: Some("~/.ssh/base-key.pem".into()),
            tags: vec![
                ("Owner".into(), "BaseOwner".into()),
                ("Service".into(), "BaseService".into()),
            ],
        }
    }

    #[test]
    fn merge_is_inheritance_complete() {
        let overlay = InstanceTemplate {
            image: Some("img-002".into()),
            size: Some("wrk-size".into()),
            key_name: Some("wrk-key".into()),
            ssh_private_key: Some("wrk-key.pem".into()),
            tags: vec![("Owner".into(), "WrkOwner".into())],
            ..Default::default()
        };

        let merged = base().merged_with(&overlay);

        // Overridden fields take the overlay's value.
        assert_eq!(merged.image.as_deref(), Some("img-002"));
        assert_eq!(merged.size.as_deref(), Some("wrk-size"));
        assert_eq!(merged.key_name.as_deref(), Some("wrk-key"));
        assert_eq!(merged.ssh_private_key.as_deref(), Some("wrk-key.pem"));
        // Unset fields inherit from the base.
        assert_eq!(merged.security_group.as_deref(), Some("sg-000"));
        assert_eq!(merged.ssh_user.as_deref(), Some("ubuntu"));
    }

    #[test]
    fn merge_concatenates_tags() {
        let overlay = InstanceTemplate {
            tags: vec![("Owner".into(), "WrkOwner".into())],
            ..Default::default()
        };

        let merged = base().merged_with(&overlay);
        assert_eq!(merged.tags.len(), 3);
        assert_eq!(merged.tags[0].1, "BaseOwner");
        assert_eq!(merged.tags[2].1, "WrkOwner");
    }

    #[test]
    fn merge_with_empty_overlay_is_identity_plus_tags() {
        let merged = base().merged_with(&InstanceTemplate::default());
        assert_eq!(merged, base());
    }

    #[test]
    fn validate_requires_image() {
        let template = InstanceTemplate {
            image: None,
            ..base()
        };
        let err = template.validate(Role::Notebook).unwrap_err();
        match err {
            ConfigError::MissingField { field, role } => {
                assert_eq!(field, "image");
                assert_eq!(role, "notebook");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn validate_requires_ssh_credentials() {
        let template = InstanceTemplate {
            ssh_user: None,
            ..base()
        };
        let err = template.validate(Role::Worker).unwrap_err();
        assert!(err.to_string().contains("ssh_user"));

        let template = InstanceTemplate {
            ssh_private_key: Some("  ".into()),
            ..base()
        };
        let err = template.validate(Role::Scheduler).unwrap_err();
        assert!(err.to_string().contains("ssh_private_key"));
    }

    #[test]
    fn validate_passes_optional_fields_through() {
        let spec = base().validate(Role::Scheduler).unwrap();
        assert_eq!(spec.image, "img-000");
        assert_eq!(spec.size.as_deref(), Some("base-size"));
        assert_eq!(spec.security_group.as_deref(), Some("sg-000"));
        assert_eq!(spec.tags.len(), 2);
    }

    #[test]
    fn instance_name_composition() {
        assert_eq!(
            InstanceTemplate::instance_name(Some("my-"), "test", Role::Notebook),
            "my-test-notebook"
        );
        assert_eq!(
            InstanceTemplate::instance_name(None, "analytics", Role::Scheduler),
            "analytics-scheduler"
        );
    }
}

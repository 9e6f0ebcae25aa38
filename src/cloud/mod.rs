//! Cloud provisioning collaborator.
//!
//! The orchestrator never talks to a provider API directly; it goes through
//! the [`CloudProvider`] trait so the whole lifecycle can run against a
//! scripted provider in tests. One thin production driver lives in
//! [`rest`].

pub mod rest;

use async_trait::async_trait;

use crate::error::Result;
use crate::profile::ValidatedSpec;

/// A provisioned instance as reported by the provider.
///
/// Addresses are absent until the instance reaches the running state;
/// callers refresh after waiting.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub image_id: String,
    pub public_ip: Option<String>,
    pub private_dns_name: Option<String>,
    pub key_name: Option<String>,
    pub cpu: CpuInfo,
    pub tags: Vec<(String, String)>,
}

/// CPU shape reported by the provider, used for worker option defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuInfo {
    pub core_count: u32,
    pub threads_per_core: u32,
}

/// One create-instances call: a validated role spec plus naming and tags.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Instance name, also written as the `Name` tag.
    pub name: String,
    pub image: String,
    pub size: Option<String>,
    pub key_name: Option<String>,
    pub security_group: Option<String>,
    pub count: u32,
    /// Tags beyond the `Name` tag, in order.
    pub tags: Vec<(String, String)>,
}

impl LaunchRequest {
    /// Build a request from a validated spec.
    #[must_use]
    pub fn from_spec(spec: &ValidatedSpec, name: String, count: u32) -> Self {
        Self {
            name,
            image: spec.image.clone(),
            size: spec.size.clone(),
            key_name: spec.key_name.clone(),
            security_group: spec.security_group.clone(),
            count,
            tags: spec.tags.clone(),
        }
    }

    /// Full tag set sent to the provider: the `Name` tag first, then the
    /// profile tags in order.
    #[must_use]
    pub fn tag_set(&self) -> Vec<(String, String)> {
        let mut tags = vec![("Name".to_owned(), self.name.clone())];
        tags.extend(self.tags.iter().cloned());
        tags
    }
}

/// Provisioning API surface consumed by the orchestrator.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create `request.count` instances; returns one handle per instance.
    async fn create_instances(&self, request: &LaunchRequest) -> Result<Vec<Instance>>;

    /// Block until the instance reports the running state.
    async fn wait_until_running(&self, id: &str) -> Result<()>;

    /// Re-describe an instance, picking up addresses assigned at boot.
    async fn refresh(&self, id: &str) -> Result<Instance>;

    /// Terminate every listed instance. Accepting the call is enough for
    /// record deletion; completion is not awaited.
    async fn terminate_instances(&self, ids: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Role;

    #[test]
    fn tag_set_puts_name_first() {
        let spec = ValidatedSpec {
            role: Role::Worker,
            image: "img-1".into(),
            size: None,
            security_group: None,
            key_name: None,
            ssh_user: "ubuntu".into(),
            ssh_private_key: "k.pem".into(),
            tags: vec![("Owner".into(), "me".into())],
        };
        let request = LaunchRequest::from_spec(&spec, "demo-worker".into(), 2);
        let tags = request.tag_set();
        assert_eq!(tags[0], ("Name".into(), "demo-worker".into()));
        assert_eq!(tags[1], ("Owner".into(), "me".into()));
        assert_eq!(request.count, 2);
    }
}

//! Token-authenticated REST driver for the provisioning service.
//!
//! A deliberately thin client: JSON bodies in, JSON bodies out, one
//! endpoint per trait method. Running-state waits poll the describe
//! endpoint under the configured retry policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::retry::{retry, Attempt, CancelToken, RetryPolicy};

use super::{CloudProvider, CpuInfo, Instance, LaunchRequest};

/// REST provisioning driver.
pub struct RestCloudProvider {
    client: Client,
    base_url: Url,
    token: String,
    poll: RetryPolicy,
    cancel: CancelToken,
}

#[derive(Debug, Deserialize)]
struct InstanceBody {
    id: String,
    image_id: String,
    state: String,
    public_ip: Option<String>,
    private_dns_name: Option<String>,
    key_name: Option<String>,
    #[serde(default)]
    cpu: CpuInfo,
    #[serde(default)]
    tags: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    instances: Vec<InstanceBody>,
}

impl RestCloudProvider {
    pub fn new(base_url: Url, token: String, poll: RetryPolicy, cancel: CancelToken) -> Result<Self> {
        // Stalled provider calls must not hang a lifecycle operation.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token,
            poll,
            cancel,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn describe(&self, id: &str) -> Result<InstanceBody> {
        let url = self.endpoint(&format!("v1/instances/{id}"))?;
        let response = self
            .client
            .get(url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("{status}: {body}")));
        }
        Ok(response.json().await?)
    }
}

impl From<InstanceBody> for Instance {
    fn from(body: InstanceBody) -> Self {
        Instance {
            id: body.id,
            image_id: body.image_id,
            public_ip: body.public_ip,
            private_dns_name: body.private_dns_name,
            key_name: body.key_name,
            cpu: body.cpu,
            tags: body.tags,
        }
    }
}

#[async_trait]
impl CloudProvider for RestCloudProvider {
    async fn create_instances(&self, request: &LaunchRequest) -> Result<Vec<Instance>> {
        info!(name = %request.name, count = request.count, image = %request.image, "creating instances");
        let url = self.endpoint("v1/instances")?;
        let body = json!({
            "name": request.name,
            "image": request.image,
            "size": request.size,
            "key_name": request.key_name,
            "security_group": request.security_group,
            "count": request.count,
            "tags": request.tag_set(),
        });
        let response = self
            .client
            .post(url)
            .header("X-Auth-Token", &self.token)
            .json(&body)
            .send()
            .await?;
        let created: CreateResponse = Self::decode(response).await?;
        Ok(created.instances.into_iter().map(Instance::from).collect())
    }

    async fn wait_until_running(&self, id: &str) -> Result<()> {
        retry(
            &self.poll,
            &self.cancel,
            move |_| async move {
                // Freshly created instances can briefly describe as unknown,
                // and the service may drop connections under load; both are
                // retryable, not terminal.
                let body = match self.describe(id).await {
                    Ok(body) => body,
                    Err(Error::Http(e)) if e.is_connect() || e.is_timeout() => {
                        return Ok(Attempt::Pending(format!("describe failed: {e}")));
                    }
                    Err(e) => return Err(e),
                };
                debug!(id = %body.id, state = %body.state, "instance state");
                if body.state == "running" {
                    Ok(Attempt::Ready(()))
                } else {
                    Ok(Attempt::Pending(format!("instance {} is {}", body.id, body.state)))
                }
            },
            |attempts| Error::Timeout {
                what: format!("instance {id} to reach running"),
                attempts,
            },
        )
        .await
    }

    async fn refresh(&self, id: &str) -> Result<Instance> {
        Ok(self.describe(id).await?.into())
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        info!(count = ids.len(), "terminating instances");
        let url = self.endpoint("v1/instances/terminate")?;
        let response = self
            .client
            .post(url)
            .header("X-Auth-Token", &self.token)
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("{status}: {body}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_until_running_retries_connection_failures_to_exhaustion() {
        // Port 9 (discard) refuses on a plain host; every describe attempt
        // fails with a connect error, which must count as pending.
        let provider = RestCloudProvider::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            String::new(),
            RetryPolicy::new(2, Duration::from_millis(1)),
            CancelToken::new(),
        )
        .unwrap();

        let err = provider.wait_until_running("i-0001").await.unwrap_err();
        match err {
            Error::Timeout { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}

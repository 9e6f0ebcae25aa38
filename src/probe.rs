//! HTTP reachability probing.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// Collaborator answering "does this URL respond yet?".
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Ok when the endpoint answered within `timeout`; Err otherwise.
    /// Callers drive retries; one call is one attempt.
    async fn try_connect(&self, url: &Url, timeout: Duration) -> Result<()>;
}

/// Probe backed by a plain HTTP GET.
///
/// Any HTTP response counts as reachable, status code included; the point
/// is that the daemon behind the port is answering, not that the path
/// exists.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn try_connect(&self, url: &Url, timeout: Duration) -> Result<()> {
        self.client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await?;
        Ok(())
    }
}

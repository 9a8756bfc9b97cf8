use async_trait::async_trait;
use std::time::Duration;

use crate::core::errors::FlowResult;

/// Retrieves robots.txt bodies.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FlowResult<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> FlowResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RobotsFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FlowResult<String> {
        let response = self.client.get(url).send().await?;
        Ok(response.text().await?)
    }
}

use anyhow::Context;
use reqwest::{Client, ClientBuilder, Response};

use crate::ratelimit::RateLimiter;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = ClientBuilder::new().user_agent(USER_AGENT).build()?;
        let rate_limiter = RateLimiter::new()?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub async fn fetch_url_response(&self, url: &str) -> anyhow::Result<Response> {
        // Wait (non-blocking) until we're allowed to make a request according
        // to our self-imposed rate-limiting policy.
        self.rate_limiter.wait_until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()?;
        Ok(response)
    }

    pub async fn fetch_url_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self.fetch_url_response(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

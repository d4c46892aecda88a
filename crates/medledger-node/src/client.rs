use medledger_core::{ChainResponse, FetchError, PeerClient};
use std::time::Duration;
use tracing::debug;

/// Fetches `GET http://<peer>/chain`.
#[derive(Clone, Debug)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, FetchError> {
        let url = format!("http://{peer}/chain");
        debug!(%url, "fetching peer chain");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .json::<ChainResponse>()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))
    }
}

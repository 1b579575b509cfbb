use std::time::Duration;

use anyhow::{Context, Result};

use palaver_types::wire::{
    ExchangeRequest, ExchangeResponse, ReplicateRequest, ReplicateResponse,
};

/// HTTP client for the node-to-node replication endpoints, with a
/// bounded per-attempt timeout so a dead peer cannot stall a tick.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building peer HTTP client")?;
        Ok(Self { http })
    }

    /// Open a gossip exchange: send our clock, get back the peer's
    /// clock and the messages our clock has not covered.
    pub async fn exchange(
        &self,
        peer_addr: &str,
        request: &ExchangeRequest,
    ) -> Result<ExchangeResponse> {
        let response = self
            .http
            .post(format!("{}/gossip", peer_addr.trim_end_matches('/')))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<ExchangeResponse>()
            .await?;
        Ok(response)
    }

    /// Close the exchange by pushing the delta the peer was missing.
    pub async fn replicate(
        &self,
        peer_addr: &str,
        request: &ReplicateRequest,
    ) -> Result<ReplicateResponse> {
        let response = self
            .http
            .post(format!("{}/replicate", peer_addr.trim_end_matches('/')))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<ReplicateResponse>()
            .await?;
        Ok(response)
    }
}

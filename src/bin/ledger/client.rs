//! Contributor Ledger API Client
//!
//! Sends the caller's identity in the same headers the gateway would set.

use anyhow::{anyhow, Context, Result};
use contributor_ledger::claim::{Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, ResolveClaimRequest};
use contributor_ledger::contributor::{PointsEvent, PointsSummary, Role};
use contributor_ledger::server::{
    ConfigResponse, ErrorBody, HealthResponse, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Who the CLI is acting as
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

/// Contributor Ledger API client
pub struct LedgerClient {
    client: Client,
    base_url: String,
    identity: Option<Identity>,
}

impl LedgerClient {
    pub fn new(base_url: &str, identity: Option<Identity>) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| anyhow!("No identity set. Pass --actor or set LEDGER_ACTOR."))?;
        Ok(request
            .header(ACTOR_ID_HEADER, &identity.id)
            .header(ACTOR_ROLE_HEADER, identity.role.as_str()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(anyhow!("{} [{}]", body.error, body.code)),
            Err(_) => Err(anyhow!("Request failed ({}): {}", status, text)),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("health"))).await
    }

    pub async fn config(&self) -> Result<ConfigResponse> {
        self.send(self.client.get(self.url("config"))).await
    }

    pub async fn points_summary(&self) -> Result<PointsSummary> {
        self.send(self.authed(self.client.get(self.url("api/points/me")))?)
            .await
    }

    pub async fn points_history(&self) -> Result<Vec<PointsEvent>> {
        self.send(self.authed(self.client.get(self.url("api/points/me/events")))?)
            .await
    }

    pub async fn my_claims(&self) -> Result<Vec<Claim>> {
        self.send(self.authed(self.client.get(self.url("api/claims/me")))?)
            .await
    }

    pub async fn all_claims(&self, status: Option<ClaimStatus>) -> Result<Vec<Claim>> {
        let mut request = self.client.get(self.url("api/claims"));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        self.send(self.authed(request)?).await
    }

    pub async fn request_claim(&self, request: &ClaimRequest) -> Result<Claim> {
        self.send(self.authed(self.client.post(self.url("api/claims")).json(request))?)
            .await
    }

    pub async fn resolve_claim(&self, id: Uuid, request: &ResolveClaimRequest) -> Result<Claim> {
        let url = self.url(&format!("api/claims/{}", id));
        self.send(self.authed(self.client.patch(url).json(request))?)
            .await
    }

    pub async fn claim_stats(&self) -> Result<Vec<ClaimStatusStats>> {
        self.send(self.authed(self.client.get(self.url("api/claims/stats")))?)
            .await
    }
}

use std::time::Duration;

use async_trait::async_trait;
use common::FeedEnvironment;
use connector_core::{ConnectorError, SnapshotProvider};
use model::DepthSnapshot;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::parser::parse_price_levels;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response of `GET /api/v3/depth`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshotResponse {
    pub last_update_id: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

impl DepthSnapshotResponse {
    pub fn into_snapshot(self, symbol: &str) -> DepthSnapshot {
        let (bids, dropped_bids) = parse_price_levels(symbol, &self.bids);
        let (asks, dropped_asks) = parse_price_levels(symbol, &self.asks);
        if dropped_bids + dropped_asks > 0 {
            warn!(
                symbol = %symbol,
                dropped = dropped_bids + dropped_asks,
                "Snapshot contained malformed levels"
            );
        }
        DepthSnapshot {
            last_update_id: Some(self.last_update_id),
            bids,
            asks,
        }
    }
}

/// Fetches depth snapshots over the Binance REST API.
#[derive(Debug, Clone)]
pub struct BinanceSnapshotProvider {
    client: Client,
    base_url: String,
}

impl BinanceSnapshotProvider {
    /// Create a provider for the given environment.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(environment: FeedEnvironment) -> Result<Self, ConnectorError> {
        Self::with_base_url(environment.rest_base_url(), DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Snapshot(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn depth_url(&self, symbol: &str, limit: u32) -> String {
        format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url,
            symbol.to_uppercase(),
            limit
        )
    }
}

fn snapshot_error(err: reqwest::Error) -> ConnectorError {
    if err.is_timeout() {
        ConnectorError::Snapshot("request timeout".to_string())
    } else if err.is_decode() {
        ConnectorError::Parse(err.to_string())
    } else {
        ConnectorError::Snapshot(err.to_string())
    }
}

#[async_trait]
impl SnapshotProvider for BinanceSnapshotProvider {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<DepthSnapshot, ConnectorError> {
        let url = self.depth_url(symbol, limit);
        debug!(url = %url, "Fetching depth snapshot");

        let response = self.client.get(&url).send().await.map_err(snapshot_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Snapshot(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body = response.text().await.map_err(snapshot_error)?;
        let parsed: DepthSnapshotResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Failed to parse depth snapshot");
            ConnectorError::Parse(e.to_string())
        })?;

        debug!(
            symbol = %symbol,
            last_update_id = parsed.last_update_id,
            bid_levels = parsed.bids.len(),
            ask_levels = parsed.asks.len(),
            "Depth snapshot received"
        );

        Ok(parsed.into_snapshot(symbol))
    }
}

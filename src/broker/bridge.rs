use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::{
    AccountInfo, Broker, BrokerResult, Deal, OrderRequest, OrderResult, PendingOrder, Position,
    SymbolInfo, TerminalInfo, Tick,
};
use crate::config::Config;
use crate::error::BrokerError;

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(50);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct JwtClaims {
    sub: String,
    iat: u64,
    exp: u64,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SelectRequest {
    enable: bool,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    selected: bool,
}

/// Client for an HTTP gateway running next to the MetaTrader terminal.
///
/// Every request carries a short-lived HS256 bearer token signed with the
/// shared bridge secret.
pub struct BridgeBroker {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    last_request: Mutex<Option<Instant>>,
}

impl BridgeBroker {
    pub fn new(cfg: &Config) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Protocol(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.bridge_url.trim_end_matches('/').to_string(),
            api_key: cfg.bridge_api_key.clone(),
            api_secret: cfg.bridge_api_secret.clone(),
            last_request: Mutex::new(None),
        })
    }

    fn generate_jwt(&self, method: &str, path: &str) -> BrokerResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BrokerError::Protocol(e.to_string()))?
            .as_secs();

        let claims = JwtClaims {
            sub: self.api_key.clone(),
            iat: now,
            exp: now + 60,
            uri: format!("{} {}", method, path),
        };

        let key = EncodingKey::from_secret(self.api_secret.as_bytes());
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.api_key.clone());

        encode(&header, &claims, &key)
            .map_err(|e| BrokerError::Protocol(format!("failed to encode JWT: {}", e)))
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn authorized(&self, method: &str, path: &str) -> BrokerResult<RequestBuilder> {
        self.rate_limit().await;
        let jwt = self.generate_jwt(method, path)?;
        let url = format!("{}{}", self.base_url, path);
        let builder = match method {
            "POST" => self.client.post(url),
            _ => self.client.get(url),
        };
        Ok(builder.header("Authorization", format!("Bearer {}", jwt)))
    }

    /// Sends the request and decodes the body. 404 decodes to `None`.
    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> BrokerResult<Option<T>> {
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Connectivity(format!("bridge {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Protocol(format!("bridge error {}: {}", status, body)));
        }
        let data = resp
            .json::<T>()
            .await
            .map_err(|e| BrokerError::Protocol(format!("failed to decode bridge response: {}", e)))?;
        Ok(Some(data))
    }

    async fn fetch_required<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> BrokerResult<T> {
        self.fetch(req)
            .await?
            .ok_or_else(|| BrokerError::Protocol(format!("bridge returned no {}", what)))
    }
}

#[async_trait]
impl Broker for BridgeBroker {
    async fn symbol_names(&self) -> BrokerResult<Vec<String>> {
        let req = self.authorized("GET", "/symbols").await?;
        let data: SymbolsResponse = self.fetch_required(req, "symbol list").await?;
        debug!("Bridge catalog: {} symbols", data.symbols.len());
        Ok(data.symbols)
    }

    async fn symbol_info(&self, symbol: &str) -> BrokerResult<Option<SymbolInfo>> {
        let path = format!("/symbols/{}", symbol);
        let req = self.authorized("GET", &path).await?;
        self.fetch(req).await
    }

    async fn symbol_select(&self, symbol: &str, enable: bool) -> BrokerResult<bool> {
        let path = format!("/symbols/{}/select", symbol);
        let req = self
            .authorized("POST", &path)
            .await?
            .json(&SelectRequest { enable });
        let resp: Option<SelectResponse> = self.fetch(req).await?;
        Ok(resp.map(|r| r.selected).unwrap_or(false))
    }

    async fn symbol_tick(&self, symbol: &str) -> BrokerResult<Option<Tick>> {
        let path = format!("/symbols/{}/tick", symbol);
        let req = self.authorized("GET", &path).await?;
        self.fetch(req).await
    }

    async fn terminal_info(&self) -> BrokerResult<TerminalInfo> {
        let req = self.authorized("GET", "/terminal").await?;
        self.fetch_required(req, "terminal info").await
    }

    async fn order_send(&self, request: &OrderRequest) -> BrokerResult<OrderResult> {
        let req = self.authorized("POST", "/orders").await?.json(request);
        self.fetch_required(req, "order result").await
    }

    async fn position(&self, ticket: u64) -> BrokerResult<Option<Position>> {
        let path = format!("/positions/{}", ticket);
        let req = self.authorized("GET", &path).await?;
        self.fetch(req).await
    }

    async fn order(&self, ticket: u64) -> BrokerResult<Option<PendingOrder>> {
        let path = format!("/orders/{}", ticket);
        let req = self.authorized("GET", &path).await?;
        self.fetch(req).await
    }

    async fn positions(&self) -> BrokerResult<Vec<Position>> {
        let req = self.authorized("GET", "/positions").await?;
        Ok(self.fetch(req).await?.unwrap_or_default())
    }

    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BrokerResult<Vec<Deal>> {
        let req = self
            .authorized("GET", "/deals")
            .await?
            .query(&[("from", from.timestamp()), ("to", to.timestamp())]);
        Ok(self.fetch(req).await?.unwrap_or_default())
    }

    async fn account_info(&self) -> BrokerResult<AccountInfo> {
        let req = self.authorized("GET", "/account").await?;
        self.fetch_required(req, "account info").await
    }
}

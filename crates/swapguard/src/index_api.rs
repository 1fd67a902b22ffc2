//! Indexed account and token data (BlockVision-style REST API).
//!
//! The backing [`DataSource`] is chosen once at construction: [`LiveSource`] talks to the
//! API, [`DemoSource`] serves fixtures. [`IndexClient`] puts the shared TTL cache in front of
//! either one.

use crate::{
    cache::{cache_key, CacheStats, TtlCache},
    config::IndexApiConfig,
    errors::SwapError,
    financial_math,
};
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
const PORTFOLIO_ACTIVITY_LIMIT: u32 = 10;

pub type Params = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    AccountTokens,
    AccountNfts,
    AccountActivity,
    AccountTransactions,
    AccountTokenActivities,
    TokenDetail,
    TokenHolders,
    ContractSourceCode,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::AccountTokens => "/account/tokens",
            Self::AccountNfts => "/account/nfts",
            Self::AccountActivity => "/account/activity",
            Self::AccountTransactions => "/account/transactions",
            Self::AccountTokenActivities => "/account/token-activities",
            Self::TokenDetail => "/token/detail",
            Self::TokenHolders => "/token/holders",
            Self::ContractSourceCode => "/contract/source-code",
        }
    }
}

fn paged(address: &str, page: u32, limit: u32) -> Params {
    BTreeMap::from([
        ("address", address.to_owned()),
        ("page", page.to_string()),
        ("limit", limit.to_string()),
    ])
}

fn by_address(address: &str) -> Params {
    BTreeMap::from([("address", address.to_owned())])
}

/// Where indexed data comes from. Implementations return the API's JSON envelope as-is.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, endpoint: Endpoint, params: &Params) -> Result<Value, SwapError>;
}

pub struct LiveSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LiveSource {
    pub fn new(cfg: &IndexApiConfig) -> eyre::Result<Self> {
        let api_key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| eyre::eyre!("index api key is not set (SWAPGUARD_INDEX_API_KEY)"))?
            .to_owned();
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim().trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    /// The key is a path segment, not a header.
    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}{}", self.base_url, self.api_key, endpoint.path())
    }
}

fn api_error(endpoint: Endpoint, e: impl fmt::Display) -> SwapError {
    SwapError::IndexApiError(format!("{}: {e}", endpoint.path()))
}

#[async_trait]
impl DataSource for LiveSource {
    async fn fetch(&self, endpoint: Endpoint, params: &Params) -> Result<Value, SwapError> {
        let resp = self
            .client
            .get(self.url(endpoint))
            .query(params)
            .send()
            .await
            .map_err(|e| api_error(endpoint, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(api_error(endpoint, format!("http {status}")));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| api_error(endpoint, e))
    }
}

/// Fixed fixture data. Never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoSource;

#[async_trait]
impl DataSource for DemoSource {
    async fn fetch(&self, endpoint: Endpoint, params: &Params) -> Result<Value, SwapError> {
        let address = params.get("address").cloned().unwrap_or_default();
        Ok(match endpoint {
            Endpoint::AccountTokens => json!({
                "code": 0,
                "data": [
                    { "symbol": "MON", "name": "Monad", "balance": "12.5", "usdValue": "0" },
                    { "symbol": "USDC", "name": "USD Coin", "balance": "250.0", "usdValue": "250.0" },
                    { "symbol": "USDT", "name": "Tether", "balance": "0", "usdValue": "0" }
                ],
                "total": 3
            }),
            Endpoint::AccountNfts => json!({
                "code": 0,
                "data": [{ "collection": "Demo Collection", "tokenId": "1", "owner": address }],
                "total": 1
            }),
            Endpoint::AccountActivity
            | Endpoint::AccountTransactions
            | Endpoint::AccountTokenActivities => json!({
                "code": 0,
                "data": [
                    { "hash": format!("{:#066x}", 1), "type": "swap", "from": address },
                    { "hash": format!("{:#066x}", 2), "type": "transfer", "from": address },
                    { "hash": format!("{:#066x}", 3), "type": "swap", "from": address }
                ],
                "total": 3
            }),
            Endpoint::TokenDetail => json!({
                "code": 0,
                "data": {
                    "address": address,
                    "symbol": "DEMO",
                    "decimals": 18,
                    "price": "1.25",
                    "marketCap": "1250000",
                    "volume24h": "42000"
                }
            }),
            Endpoint::TokenHolders => json!({
                "code": 0,
                "data": [{ "holder": format!("{:#042x}", 1), "balance": "1000" }],
                "total": 1234
            }),
            Endpoint::ContractSourceCode => json!({
                "code": 0,
                "data": { "address": address, "verified": false, "sourceCode": "" }
            }),
        })
    }
}

pub struct IndexClient {
    source: Arc<dyn DataSource>,
    cache: TtlCache<Value>,
}

impl fmt::Debug for IndexClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexClient")
            .field("cached", &self.cache.stats().count)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub tokens: Vec<Value>,
    pub nfts: Vec<Value>,
    pub recent_activity: Vec<Value>,
    pub total_tokens: usize,
    pub total_nfts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketData {
    pub detail: Value,
    pub total_holders: u64,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioStats {
    pub total_value: f64,
    pub token_count: usize,
    pub non_zero_tokens: usize,
    pub average_value: f64,
}

fn data_array(v: &Value) -> Vec<Value> {
    v.get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl IndexClient {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
        }
    }

    /// Live source when an API key is configured and demo mode is off; fixtures otherwise.
    pub fn from_config(cfg: &IndexApiConfig) -> eyre::Result<Self> {
        let source: Arc<dyn DataSource> = if cfg.demo {
            Arc::new(DemoSource)
        } else {
            Arc::new(LiveSource::new(cfg)?)
        };
        Ok(Self::new(source))
    }

    /// Cached fetch. Failures propagate and are never stored.
    pub async fn request(&self, endpoint: Endpoint, params: Params) -> Result<Value, SwapError> {
        let key = cache_key(endpoint.path(), &params);
        if let Some(v) = self.cache.get(&key) {
            return Ok(v);
        }
        let v = self.source.fetch(endpoint, &params).await?;
        debug!(key, "index api fetched");
        self.cache.set(key, v.clone());
        Ok(v)
    }

    pub async fn account_tokens(&self, address: &str, page: u32, limit: u32) -> Result<Value, SwapError> {
        self.request(Endpoint::AccountTokens, paged(address, page, limit))
            .await
    }

    pub async fn account_nfts(&self, address: &str, page: u32, limit: u32) -> Result<Value, SwapError> {
        self.request(Endpoint::AccountNfts, paged(address, page, limit))
            .await
    }

    pub async fn account_activity(&self, address: &str, page: u32, limit: u32) -> Result<Value, SwapError> {
        self.request(Endpoint::AccountActivity, paged(address, page, limit))
            .await
    }

    pub async fn account_transactions(
        &self,
        address: &str,
        page: u32,
        limit: u32,
    ) -> Result<Value, SwapError> {
        self.request(Endpoint::AccountTransactions, paged(address, page, limit))
            .await
    }

    pub async fn account_token_activities(
        &self,
        address: &str,
        page: u32,
        limit: u32,
    ) -> Result<Value, SwapError> {
        self.request(Endpoint::AccountTokenActivities, paged(address, page, limit))
            .await
    }

    pub async fn token_detail(&self, token: &str) -> Result<Value, SwapError> {
        self.request(Endpoint::TokenDetail, by_address(token)).await
    }

    pub async fn token_holders(&self, token: &str, page: u32, limit: u32) -> Result<Value, SwapError> {
        self.request(Endpoint::TokenHolders, paged(token, page, limit))
            .await
    }

    pub async fn contract_source_code(&self, contract: &str) -> Result<Value, SwapError> {
        self.request(Endpoint::ContractSourceCode, by_address(contract))
            .await
    }

    /// Tokens, NFTs and the latest activity, fetched concurrently.
    pub async fn portfolio(&self, address: &str) -> Result<Portfolio, SwapError> {
        let (tokens, nfts, activity) = tokio::try_join!(
            self.account_tokens(address, DEFAULT_PAGE, DEFAULT_LIMIT),
            self.account_nfts(address, DEFAULT_PAGE, DEFAULT_LIMIT),
            self.account_activity(address, DEFAULT_PAGE, PORTFOLIO_ACTIVITY_LIMIT),
        )?;
        let tokens = data_array(&tokens);
        let nfts = data_array(&nfts);
        Ok(Portfolio {
            total_tokens: tokens.len(),
            total_nfts: nfts.len(),
            tokens,
            nfts,
            recent_activity: data_array(&activity),
        })
    }

    /// Token detail plus holder count.
    pub async fn token_market_data(&self, token: &str) -> Result<MarketData, SwapError> {
        let detail = self.token_detail(token).await?;
        let holders = self.token_holders(token, DEFAULT_PAGE, 1).await?;
        let detail = detail.get("data").cloned().unwrap_or(Value::Null);
        Ok(MarketData {
            total_holders: holders.get("total").and_then(Value::as_u64).unwrap_or(0),
            price: financial_math::json_f64(detail.get("price")),
            market_cap: financial_math::json_f64(detail.get("marketCap")),
            volume_24h: financial_math::json_f64(detail.get("volume24h")),
            detail,
        })
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn balance_of(token: &Value) -> f64 {
    financial_math::json_f64(token.get("balance"))
}

fn usd_value_of(token: &Value) -> f64 {
    financial_math::json_f64(token.get("usdValue"))
}

/// Tokens whose `balance` is strictly above `min_balance`.
pub fn filter_tokens_by_balance(tokens: &[Value], min_balance: f64) -> Vec<Value> {
    tokens
        .iter()
        .filter(|t| balance_of(t) > min_balance)
        .cloned()
        .collect()
}

/// Highest `usdValue` first.
pub fn sort_tokens_by_value(tokens: &mut [Value]) {
    tokens.sort_by(|a, b| {
        usd_value_of(b)
            .partial_cmp(&usd_value_of(a))
            .unwrap_or(Ordering::Equal)
    });
}

/// Transactions keyed by their `type` field (`"unknown"` when absent).
pub fn group_transactions_by_type(txs: &[Value]) -> HashMap<String, Vec<Value>> {
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for tx in txs {
        let kind = tx
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        groups.entry(kind).or_default().push(tx.clone());
    }
    groups
}

pub fn portfolio_stats(tokens: &[Value]) -> PortfolioStats {
    let values: Vec<f64> = tokens.iter().map(usd_value_of).collect();
    let total_value = financial_math::sum_f64(&values);
    PortfolioStats {
        total_value,
        token_count: tokens.len(),
        non_zero_tokens: tokens.iter().filter(|t| balance_of(t) > 0.0_f64).count(),
        average_value: financial_math::mean(total_value, tokens.len()),
    }
}

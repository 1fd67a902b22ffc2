use crate::tokens::{TokenDescriptor, NATIVE_SENTINEL};
use alloy::primitives::{address, Address};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

pub const MONAD_TESTNET_CHAIN_ID: u64 = 10143;
pub const MONAD_TESTNET_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
pub const DEFAULT_INDEX_API_BASE_URL: &str = "https://monad-testnet.blockvision.org/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to register a network (EIP-3085 shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    /// Primary endpoint first; the rest are read fallbacks.
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: MONAD_TESTNET_CHAIN_ID,
            chain_name: "Monad Testnet".into(),
            native_currency: NativeCurrency {
                name: "Monad".into(),
                symbol: "MON".into(),
                decimals: 18,
            },
            rpc_urls: vec![
                MONAD_TESTNET_RPC_URL.into(),
                "https://10143.rpc.thirdweb.com".into(),
            ],
            block_explorer_urls: vec!["https://testnet.monadexplorer.com".into()],
        }
    }
}

impl NetworkConfig {
    /// Chain id in the `0x`-prefixed form wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// Constant-product router (Uniswap V2 interface).
    pub router: Option<Address>,
    /// Pair factory, used for pool lookups only.
    pub factory: Option<Address>,
    /// Wrapped native token. When set, native legs of a router path use this address.
    pub wrapped_native: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Serve fixture data instead of calling the API.
    pub demo: bool,
}

impl Default for IndexApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INDEX_API_BASE_URL.into(),
            api_key: None,
            demo: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Slippage tolerance (percent) used when the caller does not pass one.
    pub default_slippage_percent: String,
    /// Seconds added to "now" for the router deadline.
    pub deadline_seconds: u64,
    /// Client-side limit on waiting for a receipt.
    pub confirmation_timeout_seconds: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            default_slippage_percent: "0.5".into(),
            deadline_seconds: 1200,
            confirmation_timeout_seconds: 180,
            receipt_poll_interval_ms: 500,
        }
    }
}

impl SwapConfig {
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_seconds)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// Passes over the endpoint list for read calls. One pass means plain failover.
    pub read_rounds: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 20,
            connect_timeout_seconds: 5,
            read_rounds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub tokens: Vec<TokenDescriptor>,
    pub index_api: IndexApiConfig,
    pub swap: SwapConfig,
    pub rpc: RpcConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            contracts: ContractsConfig {
                router: None,
                factory: None,
                wrapped_native: Some(WMON),
            },
            tokens: default_tokens(),
            index_api: IndexApiConfig::default(),
            swap: SwapConfig::default(),
            rpc: RpcConfig::default(),
        }
    }
}

const WMON: Address = address!("0x760AfE86e5de5fa0Ee542fc7B7B713e1c5425701");

fn default_tokens() -> Vec<TokenDescriptor> {
    vec![
        TokenDescriptor {
            symbol: "MON".into(),
            address: NATIVE_SENTINEL,
            decimals: 18,
            name: "Monad".into(),
            icon: "🚀".into(),
        },
        TokenDescriptor {
            symbol: "WMON".into(),
            address: WMON,
            decimals: 18,
            name: "Wrapped Monad".into(),
            icon: "🔷".into(),
        },
        TokenDescriptor {
            symbol: "USDC".into(),
            address: address!("0xf817257fed379853cDe0fa4F97AB987181B1E5Ea"),
            decimals: 6,
            name: "USD Coin".into(),
            icon: "💵".into(),
        },
        TokenDescriptor {
            symbol: "USDT".into(),
            address: address!("0x88b8E2161DEDC77EF4ab7585569D2415a1C1055D"),
            decimals: 6,
            name: "Tether".into(),
            icon: "💲".into(),
        },
    ]
}

impl AppConfig {
    /// Load `config.toml` if present (defaults otherwise), then apply environment overrides.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let mut cfg = if path.exists() {
            let s = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str::<Self>(&s).with_context(|| format!("parse config {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> eyre::Result<()> {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("SWAPGUARD_INDEX_API_KEY") {
            self.index_api.api_key = Some(v);
        }
        if let Some(v) = non_empty("SWAPGUARD_INDEX_BASE_URL") {
            self.index_api.base_url = v;
        }
        if let Some(v) = non_empty("SWAPGUARD_RPC_URL") {
            self.network.rpc_urls.retain(|u| u != &v);
            self.network.rpc_urls.insert(0, v);
        }
        if let Some(v) = non_empty("SWAPGUARD_CHAIN_ID") {
            self.network.chain_id = v.parse().context("parse SWAPGUARD_CHAIN_ID")?;
        }
        if let Some(v) = non_empty("SWAPGUARD_ROUTER") {
            self.contracts.router = Some(v.parse().context("parse SWAPGUARD_ROUTER")?);
        }
        Ok(())
    }

    pub fn router(&self) -> eyre::Result<Address> {
        self.contracts
            .router
            .ok_or_else(|| eyre::eyre!("contracts.router is not configured"))
    }
}

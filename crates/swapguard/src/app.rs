//! Wires the configured chain access and signer into the swap services.

use crate::{
    allowance::AllowanceManager,
    chains::{evm::EvmReader, wallet::LocalWallet, ChainGateway, ChainReader, Wallet},
    config::AppConfig,
    market::Market,
    quote::QuoteEngine,
    swap::SwapOrchestrator,
    tokens::TokenRegistry,
};
use alloy::primitives::Address;
use secrecy::SecretString;
use std::sync::Arc;

pub const PRIVATE_KEY_ENV: &str = "SWAPGUARD_PRIVATE_KEY";

pub struct App {
    cfg: AppConfig,
    registry: TokenRegistry,
    gateway: ChainGateway,
    signer: Option<Address>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("chain_id", &self.cfg.network.chain_id)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Build from config. With no `key` the app is read-only: quotes and balances work, sends
    /// fail with `SignerUnavailable`.
    pub fn new(cfg: AppConfig, key: Option<&SecretString>) -> eyre::Result<Self> {
        let registry = TokenRegistry::new(cfg.tokens.clone())?;
        let reader: Arc<dyn ChainReader> = Arc::new(EvmReader::new(&cfg.network, &cfg.rpc)?);
        let wallet = key
            .map(|k| LocalWallet::from_secret(k, &cfg.network, &cfg.rpc))
            .transpose()?;
        let signer = wallet.as_ref().map(LocalWallet::address);
        let wallet = wallet.map(|w| Arc::new(w) as Arc<dyn Wallet>);
        Ok(Self {
            gateway: ChainGateway::new(reader, wallet),
            cfg,
            registry,
            signer,
        })
    }

    /// Read the signing key from the environment, if set.
    pub fn key_from_env() -> Option<SecretString> {
        std::env::var(PRIVATE_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| SecretString::new(k.into()))
    }

    pub const fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub const fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub const fn gateway(&self) -> &ChainGateway {
        &self.gateway
    }

    /// Address of the loaded signer, or an error naming the env var to set.
    pub fn signer(&self) -> eyre::Result<Address> {
        self.signer
            .ok_or_else(|| eyre::eyre!("no signer: set {PRIVATE_KEY_ENV}"))
    }

    fn engine_for(&self, router: Address) -> QuoteEngine {
        QuoteEngine::new(
            self.gateway.clone(),
            self.registry.clone(),
            router,
            self.cfg.contracts.wrapped_native,
        )
    }

    pub fn quote_engine(&self) -> eyre::Result<QuoteEngine> {
        Ok(self.engine_for(self.cfg.router()?))
    }

    pub fn allowances(&self) -> AllowanceManager {
        AllowanceManager::new(self.gateway.clone(), self.cfg.swap.clone())
    }

    pub fn orchestrator(&self) -> eyre::Result<SwapOrchestrator> {
        Ok(SwapOrchestrator::new(
            self.gateway.clone(),
            self.quote_engine()?,
            self.allowances(),
            self.cfg.network.clone(),
            self.cfg.swap.clone(),
        ))
    }

    /// Market views. Without a configured router every price reads as unavailable.
    pub fn market(&self) -> Market {
        let router = self.cfg.contracts.router.unwrap_or(Address::ZERO);
        Market::new(
            self.gateway.clone(),
            self.engine_for(router),
            self.cfg.contracts.factory,
        )
    }
}

//! Read-only market views built on the router and the factory: balances, USD prices, pools.

use crate::{
    amount::TokenAmount,
    chains::ChainGateway,
    errors::SwapError,
    financial_math,
    quote::QuoteEngine,
    tokens::{TokenDescriptor, TokenKind},
};
use alloy::primitives::Address;
use serde::Serialize;
use tracing::warn;

/// Stablecoin every USD price is quoted against.
pub const USD_REFERENCE: &str = "USDC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub address: Address,
    /// Six fractional digits, truncated.
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    pub pair: Address,
    pub token_a: String,
    pub token_b: String,
}

#[derive(Debug, Clone)]
pub struct Market {
    gateway: ChainGateway,
    quotes: QuoteEngine,
    factory: Option<Address>,
}

impl Market {
    pub const fn new(gateway: ChainGateway, quotes: QuoteEngine, factory: Option<Address>) -> Self {
        Self {
            gateway,
            quotes,
            factory,
        }
    }

    /// Balance of one token, native or ERC20.
    pub async fn balance_of(
        &self,
        token: &TokenDescriptor,
        owner: Address,
    ) -> Result<TokenAmount, SwapError> {
        match token.kind() {
            TokenKind::Native => self
                .gateway
                .native_balance(owner)
                .await
                .map(|b| TokenAmount::from_base(b, token.decimals)),
            TokenKind::Erc20(addr) => self.gateway.erc20_balance(addr, owner).await,
        }
        .map_err(|e| SwapError::RpcError(e.to_string()))
    }

    /// Every registered token's balance. A failed read shows as zero instead of failing the
    /// whole listing.
    pub async fn token_balances(&self, owner: Address) -> Vec<TokenBalance> {
        let mut out = Vec::new();
        for token in self.quotes.registry().all() {
            let balance = match self.balance_of(token, owner).await {
                Ok(b) => b.to_display(),
                Err(e) => {
                    warn!(token = %token.symbol, error = %e, "balance read failed");
                    TokenAmount::zero(token.decimals).to_display()
                }
            };
            out.push(TokenBalance {
                symbol: token.symbol.clone(),
                address: token.address,
                balance,
            });
        }
        out
    }

    /// Price of one whole token in USD, taken from a router quote against the reference
    /// stablecoin. Zero when no quote is available.
    pub async fn token_price_usd(&self, symbol: &str) -> f64 {
        if symbol.eq_ignore_ascii_case(USD_REFERENCE) {
            return 1.0_f64;
        }
        match self.quotes.estimate(symbol, USD_REFERENCE, "1").await {
            Ok(q) => financial_math::decimal_str_to_f64(&q.amount_out.to_string()),
            Err(e) => {
                warn!(token = symbol, error = %e, "price unavailable");
                0.0_f64
            }
        }
    }

    /// `amount` of `symbol` in USD at the current router price.
    pub async fn usd_estimate(&self, symbol: &str, amount: &str) -> f64 {
        let price = self.token_price_usd(symbol).await;
        financial_math::usd_value(amount, price)
    }

    /// The pair contract for two tokens, if the factory knows one.
    pub async fn pool_info(&self, a: &str, b: &str) -> Option<PoolInfo> {
        let factory = self.factory?;
        let path = self.quotes.registry().path(a, b).ok()?;
        let hops = self.quotes.router_path(&path);
        let (token_a, token_b) = (*hops.first()?, *hops.get(1)?);
        match self.gateway.reader().get_pair(factory, token_a, token_b).await {
            Ok(pair) if pair != Address::ZERO => Some(PoolInfo {
                pair,
                token_a: path.from_token().symbol.clone(),
                token_b: path.to_token().symbol.clone(),
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(a, b, error = %e, "pair lookup failed");
                None
            }
        }
    }
}

/// Check a user-entered amount against an available balance, both at `decimals` precision.
pub fn validate_swap_amount(amount: &str, balance: &str, decimals: u8) -> Result<(), SwapError> {
    let requested = TokenAmount::parse(amount, decimals)?;
    if requested.is_zero() {
        return Err(SwapError::InvalidAmount(
            "amount must be greater than zero".to_owned(),
        ));
    }
    let available = TokenAmount::parse(balance, decimals)?;
    if requested.base() > available.base() {
        return Err(SwapError::InsufficientBalance {
            requested: requested.to_string(),
            available: available.to_string(),
        });
    }
    Ok(())
}

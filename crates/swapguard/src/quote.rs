use crate::{
    amount::TokenAmount,
    chains::ChainGateway,
    errors::{GatewayError, SwapError},
    tokens::{SwapPath, TokenRegistry},
};
use alloy::primitives::{Address, U256};
use rust_decimal::{prelude::ToPrimitive as _, Decimal};
use serde::Serialize;
use std::str::FromStr as _;
use tracing::debug;

const BPS_DENOMINATOR: u64 = 10_000;

/// A router output estimate for a direct two-token swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub from: String,
    pub to: String,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub path: Vec<Address>,
}

/// `quoted - floor(quoted * bps / 10000)`, saturating at zero for tolerances above 100%.
pub fn minimum_out(quoted: U256, slippage_bps: u32) -> U256 {
    let denom = U256::from(BPS_DENOMINATOR);
    let bps = U256::from(slippage_bps);
    // floor(q*s/d) == (q/d)*s + floor((q%d)*s/d), without the q*s overflow.
    let cut = (quoted / denom)
        .saturating_mul(bps)
        .saturating_add((quoted % denom) * bps / denom);
    quoted.saturating_sub(cut)
}

/// Slippage percent with up to two meaningful decimals (`"0.5"` is 50 bps). Extra precision is
/// floored away; negative or unparseable values are rejected. No upper bound is applied.
pub fn slippage_percent_to_bps(percent: &str) -> Result<u32, SwapError> {
    let p = Decimal::from_str(percent.trim())
        .map_err(|e| SwapError::InvalidAmount(format!("slippage {percent:?}: {e}")))?;
    if p.is_sign_negative() && !p.is_zero() {
        return Err(SwapError::InvalidAmount(format!(
            "slippage must be non-negative, got {percent}"
        )));
    }
    (p * Decimal::ONE_HUNDRED)
        .floor()
        .to_u32()
        .ok_or_else(|| SwapError::InvalidAmount(format!("slippage out of range: {percent}")))
}

/// Parse `amount`, allowing one leading `-`. Returns whether it was negative and its magnitude.
fn parse_signed(amount: &str, decimals: u8) -> Result<(bool, TokenAmount), SwapError> {
    let s = amount.trim();
    let (negative, body) = s.strip_prefix('-').map_or((false, s), |rest| (true, rest));
    Ok((negative, TokenAmount::parse(body, decimals)?))
}

#[derive(Debug, Clone)]
pub struct QuoteEngine {
    gateway: ChainGateway,
    registry: TokenRegistry,
    router: Address,
    wrapped_native: Option<Address>,
}

impl QuoteEngine {
    pub const fn new(
        gateway: ChainGateway,
        registry: TokenRegistry,
        router: Address,
        wrapped_native: Option<Address>,
    ) -> Self {
        Self {
            gateway,
            registry,
            router,
            wrapped_native,
        }
    }

    pub const fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub const fn router(&self) -> Address {
        self.router
    }

    pub fn router_path(&self, path: &SwapPath) -> Vec<Address> {
        path.router_path(self.wrapped_native)
    }

    /// Ask the router what `amount` of `from` buys of `to`. A zero or negative amount quotes
    /// zero without touching the network; anything that is not a decimal number is
    /// `InvalidAmount`.
    pub async fn estimate(&self, from: &str, to: &str, amount: &str) -> Result<Quote, SwapError> {
        let path = self.registry.path(from, to).map_err(|e| match e {
            SwapError::UnknownToken(t) => SwapError::QuoteUnavailable(format!("unknown token {t}")),
            other => other,
        })?;
        self.estimate_path(&path, amount).await
    }

    pub async fn estimate_path(&self, path: &SwapPath, amount: &str) -> Result<Quote, SwapError> {
        let (from, to) = (path.from_token(), path.to_token());
        let router_path = self.router_path(path);

        let (negative, amount_in) = parse_signed(amount, from.decimals)?;
        if negative || amount_in.is_zero() {
            return Ok(Quote {
                from: from.symbol.clone(),
                to: to.symbol.clone(),
                amount_in: TokenAmount::zero(from.decimals),
                amount_out: TokenAmount::zero(to.decimals),
                path: router_path,
            });
        }

        let amounts = self
            .gateway
            .reader()
            .get_amounts_out(self.router, amount_in.base(), router_path.clone())
            .await
            .map_err(|e| unavailable(from.symbol.as_str(), to.symbol.as_str(), &e))?;
        let out = amounts.get(1).copied().ok_or_else(|| {
            SwapError::QuoteUnavailable(format!(
                "router returned {} amounts for a two-hop path",
                amounts.len()
            ))
        })?;

        let quote = Quote {
            from: from.symbol.clone(),
            to: to.symbol.clone(),
            amount_in,
            amount_out: TokenAmount::from_base(out, to.decimals),
            path: router_path,
        };
        debug!(from = %quote.from, to = %quote.to, amount_in = %quote.amount_in, amount_out = %quote.amount_out, "quote");
        Ok(quote)
    }
}

fn unavailable(from: &str, to: &str, e: &GatewayError) -> SwapError {
    SwapError::QuoteUnavailable(format!("no {from}/{to} quote: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chains::mock::MockReader, tokens::test_registry};
    use std::sync::Arc;

    fn engine(reader: &Arc<MockReader>) -> QuoteEngine {
        QuoteEngine::new(
            ChainGateway::new(reader.clone(), None),
            test_registry(),
            Address::repeat_byte(0x55),
            None,
        )
    }

    #[test]
    fn minimum_out_matches_floor_formula() {
        let q = U256::from(10_000_000_000_000_000_u64);
        assert_eq!(
            minimum_out(q, 50),
            U256::from(9_950_000_000_000_000_u64),
            "0.5% of 0.01"
        );
        assert_eq!(minimum_out(q, 0), q, "zero slippage keeps the quote");
        assert_eq!(minimum_out(U256::from(199_u64), 50), U256::from(199_u64), "floor of 0.995");
        assert_eq!(minimum_out(U256::from(12_345_u64), 30), U256::from(12_308_u64), "0.3%");
        assert_eq!(minimum_out(q, 20_000), U256::ZERO, "over 100% saturates");
        assert_eq!(
            minimum_out(U256::MAX, 1),
            U256::MAX - U256::MAX / U256::from(10_000_u64),
            "no overflow near the top"
        );
    }

    #[test]
    fn slippage_percent_is_floored_to_bps() -> Result<(), SwapError> {
        assert_eq!(slippage_percent_to_bps("0.5")?, 50, "half percent");
        assert_eq!(slippage_percent_to_bps("5.0")?, 500, "upper ui bound");
        assert_eq!(slippage_percent_to_bps("0.105")?, 10, "floored");
        assert_eq!(slippage_percent_to_bps("0")?, 0, "zero");
        assert_eq!(slippage_percent_to_bps("12")?, 1200, "no clamp");
        assert!(slippage_percent_to_bps("-1").is_err(), "negative");
        assert!(slippage_percent_to_bps("abc").is_err(), "garbage");
        Ok(())
    }

    #[tokio::test]
    async fn zero_amount_quotes_zero_without_network() -> Result<(), SwapError> {
        let reader = Arc::new(MockReader::default());
        let q = engine(&reader).estimate("MON", "USDC", "0").await?;
        assert_eq!(q.amount_out.to_string(), "0", "zero out");
        let q = engine(&reader).estimate("MON", "USDC", "-3").await?;
        assert!(q.amount_out.is_zero(), "negative treated as zero");
        let q = engine(&reader).estimate("MON", "USDC", " -0.5 ").await?;
        assert!(q.amount_in.is_zero(), "negative decimal treated as zero");
        let q = engine(&reader).estimate("MON", "USDC", "0.000").await?;
        assert!(q.amount_out.is_zero(), "zero with fraction");
        assert_eq!(reader.total_calls(), 0, "no network call");
        Ok(())
    }

    #[tokio::test]
    async fn estimate_converts_at_both_precisions() -> Result<(), SwapError> {
        let reader = Arc::new(MockReader::default());
        reader.set_amounts_out(U256::from(3_250_000_u64));
        let q = engine(&reader).estimate("MON", "USDC", "10").await?;
        assert_eq!(
            q.amount_in.base(),
            U256::from(10_000_000_000_000_000_000_u128),
            "18-decimal input"
        );
        assert_eq!(q.amount_out.to_string(), "3.25", "6-decimal output");
        assert_eq!(q.path.len(), 2, "direct pair");
        assert_eq!(reader.calls("get_amounts_out"), 1, "one router call");
        Ok(())
    }

    #[tokio::test]
    async fn router_revert_is_quote_unavailable() {
        let reader = Arc::new(MockReader::default());
        reader.fail_amounts_out(GatewayError::Reverted("ds-math-sub-underflow".into()));
        let r = engine(&reader).estimate("USDC", "USDT", "1").await;
        assert!(matches!(r, Err(SwapError::QuoteUnavailable(_))), "{r:?}");
    }

    #[tokio::test]
    async fn unknown_token_is_quote_unavailable() {
        let reader = Arc::new(MockReader::default());
        let r = engine(&reader).estimate("DOGE", "USDT", "1").await;
        assert!(matches!(r, Err(SwapError::QuoteUnavailable(_))), "{r:?}");
        assert_eq!(reader.total_calls(), 0, "rejected locally");
    }

    #[tokio::test]
    async fn malformed_amount_is_invalid() {
        let reader = Arc::new(MockReader::default());
        for bad in ["1.2.3", "-abc", "-", "0.0.0", "--1", "0x10", ""] {
            let r = engine(&reader).estimate("MON", "USDC", bad).await;
            assert!(
                matches!(r, Err(SwapError::InvalidAmount(_))),
                "{bad:?} should be rejected: {r:?}"
            );
        }
        assert_eq!(reader.total_calls(), 0, "no network call");
    }
}

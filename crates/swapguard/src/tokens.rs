use crate::{amount::MAX_DECIMALS, errors::SwapError};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Address that stands for the chain's native asset. It never resolves to a contract.
pub const NATIVE_SENTINEL: Address = Address::ZERO;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub symbol: String,
    pub address: Address,
    /// At most [`MAX_DECIMALS`].
    pub decimals: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Whether a token is the native asset or an ERC20 contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Native,
    Erc20(Address),
}

impl TokenDescriptor {
    pub fn kind(&self) -> TokenKind {
        if self.address == NATIVE_SENTINEL {
            TokenKind::Native
        } else {
            TokenKind::Erc20(self.address)
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind(), TokenKind::Native)
    }
}

/// The two legs of a direct swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPath {
    from: TokenDescriptor,
    to: TokenDescriptor,
}

impl SwapPath {
    pub const fn from_token(&self) -> &TokenDescriptor {
        &self.from
    }

    pub const fn to_token(&self) -> &TokenDescriptor {
        &self.to
    }

    /// Router path. Native legs are replaced by `wrapped_native` when one is configured.
    pub fn router_path(&self, wrapped_native: Option<Address>) -> Vec<Address> {
        let hop = |t: &TokenDescriptor| match (t.kind(), wrapped_native) {
            (TokenKind::Native, Some(w)) => w,
            (TokenKind::Native, None) => NATIVE_SENTINEL,
            (TokenKind::Erc20(a), _) => a,
        };
        vec![hop(&self.from), hop(&self.to)]
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: Vec<TokenDescriptor>,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<TokenDescriptor>) -> eyre::Result<Self> {
        let mut reg = Self { tokens: Vec::with_capacity(tokens.len()) };
        for t in tokens {
            if t.symbol.trim().is_empty() {
                eyre::bail!("token with empty symbol");
            }
            if t.decimals > MAX_DECIMALS {
                eyre::bail!(
                    "token {} has {} decimals; at most {MAX_DECIMALS} are supported",
                    t.symbol,
                    t.decimals
                );
            }
            if reg.by_symbol(&t.symbol).is_some() {
                eyre::bail!("duplicate token symbol: {}", t.symbol);
            }
            if reg.tokens.iter().any(|x| x.address == t.address) {
                eyre::bail!("duplicate token address {:#x} ({})", t.address, t.symbol);
            }
            reg.tokens.push(t);
        }
        Ok(reg)
    }

    pub fn all(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenDescriptor> {
        let s = symbol.trim();
        self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(s))
    }

    pub fn by_address(&self, address: Address) -> Option<&TokenDescriptor> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn native(&self) -> Option<&TokenDescriptor> {
        self.tokens.iter().find(|t| t.is_native())
    }

    /// Resolve a symbol (or a hex address of a registered token).
    pub fn resolve(&self, s: &str) -> Result<&TokenDescriptor, SwapError> {
        if let Some(t) = self.by_symbol(s) {
            return Ok(t);
        }
        s.trim()
            .parse::<Address>()
            .ok()
            .and_then(|a| self.by_address(a))
            .ok_or_else(|| SwapError::UnknownToken(s.trim().to_owned()))
    }

    pub fn path(&self, from: &str, to: &str) -> Result<SwapPath, SwapError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if from.address == to.address {
            return Err(SwapError::QuoteUnavailable(format!(
                "cannot swap {} for itself",
                from.symbol
            )));
        }
        Ok(SwapPath {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_registry() -> TokenRegistry {
    fn t(symbol: &str, last: u8, decimals: u8) -> TokenDescriptor {
        let mut bytes = [0_u8; 20];
        bytes[19] = last;
        TokenDescriptor {
            symbol: symbol.to_owned(),
            address: Address::from(bytes),
            decimals,
            name: symbol.to_owned(),
            icon: String::new(),
        }
    }
    let tokens = vec![
        t("MON", 0, 18),
        t("WMON", 1, 18),
        t("USDC", 2, 6),
        t("USDT", 3, 6),
    ];
    TokenRegistry { tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_is_detected_by_sentinel() {
        let reg = test_registry();
        let mon = reg.resolve("mon");
        assert!(matches!(mon.map(TokenDescriptor::kind), Ok(TokenKind::Native)), "MON native");
        let usdc = reg.resolve("USDC");
        assert!(
            matches!(usdc.map(TokenDescriptor::kind), Ok(TokenKind::Erc20(_))),
            "USDC is erc20"
        );
    }

    #[test]
    fn path_rejects_same_token_and_unknown() {
        let reg = test_registry();
        assert!(
            matches!(reg.path("USDC", "usdc"), Err(SwapError::QuoteUnavailable(_))),
            "same token"
        );
        assert!(
            matches!(reg.path("USDC", "DOGE"), Err(SwapError::UnknownToken(_))),
            "unknown token"
        );
    }

    #[test]
    fn router_path_substitutes_wrapped_native() -> Result<(), SwapError> {
        let reg = test_registry();
        let p = reg.path("MON", "USDC")?;
        let wmon = reg.resolve("WMON")?.address;
        let usdc = reg.resolve("USDC")?.address;
        assert_eq!(p.router_path(None), vec![NATIVE_SENTINEL, usdc], "literal path");
        assert_eq!(p.router_path(Some(wmon)), vec![wmon, usdc], "wrapped path");
        Ok(())
    }

    #[test]
    fn resolve_accepts_registered_address() -> Result<(), SwapError> {
        let reg = test_registry();
        let usdt = reg.resolve("0x0000000000000000000000000000000000000003")?;
        assert_eq!(usdt.symbol, "USDT", "address lookup");
        Ok(())
    }

    #[test]
    fn registry_rejects_duplicates() {
        let dup = vec![
            test_registry().all()[2].clone(),
            test_registry().all()[2].clone(),
        ];
        assert!(TokenRegistry::new(dup).is_err(), "duplicate rejected");
    }

    #[test]
    fn registry_rejects_unrepresentable_precision() -> eyre::Result<()> {
        let mut wide = test_registry().all()[2].clone();
        wide.decimals = MAX_DECIMALS;
        let reg = TokenRegistry::new(vec![wide.clone()])?;
        let one = crate::amount::TokenAmount::parse("1", MAX_DECIMALS)?;
        assert!(!one.is_zero(), "widest precision still parses");
        assert_eq!(reg.all().len(), 1, "accepted");

        wide.decimals = MAX_DECIMALS + 1;
        let err = TokenRegistry::new(vec![wide])
            .err()
            .ok_or_else(|| eyre::eyre!("78 decimals accepted"))?;
        assert!(err.to_string().contains("decimals"), "{err}");
        Ok(())
    }
}

use crate::{
    amount::TokenAmount,
    chains::{evm::build_erc20_approve, ChainGateway, TxReceipt},
    config::SwapConfig,
    errors::{GatewayError, SwapError},
    tokens::{TokenDescriptor, TokenKind},
};
use alloy::primitives::{Address, U256};
use tracing::{info, warn};

fn approval_failed(e: &GatewayError) -> SwapError {
    match e {
        GatewayError::SignerUnavailable => SwapError::SignerUnavailable,
        other => SwapError::ApprovalFailed(other.to_string()),
    }
}

/// Spending approvals for ERC20 tokens. The native asset never needs one.
#[derive(Debug, Clone)]
pub struct AllowanceManager {
    gateway: ChainGateway,
    swap: SwapConfig,
}

impl AllowanceManager {
    pub const fn new(gateway: ChainGateway, swap: SwapConfig) -> Self {
        Self { gateway, swap }
    }

    /// Current allowance at the token's precision. The native asset reports `U256::MAX`.
    pub async fn allowance_of(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount, SwapError> {
        match token.kind() {
            TokenKind::Native => Ok(TokenAmount::from_base(U256::MAX, token.decimals)),
            TokenKind::Erc20(addr) => {
                let base = self
                    .gateway
                    .reader()
                    .erc20_allowance(addr, owner, spender)
                    .await
                    .map_err(|e| SwapError::RpcError(e.to_string()))?;
                Ok(TokenAmount::from_base(base, token.decimals))
            }
        }
    }

    /// Whether `spender` must be approved before it can move `amount` of `token` from `owner`.
    ///
    /// A failed allowance read answers `true`: asking for an approval that turns out to be
    /// unnecessary is recoverable, dispatching an under-approved swap is not.
    pub async fn needs_approval(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        spender: Address,
        amount: &str,
    ) -> Result<bool, SwapError> {
        if token.is_native() {
            return Ok(false);
        }
        let requested = TokenAmount::parse(amount, token.decimals)?;
        match self.allowance_of(token, owner, spender).await {
            Ok(current) => Ok(current.base() < requested.base()),
            Err(e) => {
                warn!(token = %token.symbol, error = %e, "allowance read failed; assuming approval needed");
                Ok(true)
            }
        }
    }

    /// Approve exactly `amount` and wait for one confirmation. Returns `None` for the native
    /// asset, where there is nothing to approve.
    pub async fn approve(
        &self,
        token: &TokenDescriptor,
        spender: Address,
        amount: &str,
    ) -> Result<Option<TxReceipt>, SwapError> {
        let TokenKind::Erc20(addr) = token.kind() else {
            return Ok(None);
        };
        let value = TokenAmount::parse(amount, token.decimals)?;
        let owner = self
            .gateway
            .signer_address()
            .await
            .map_err(|e| approval_failed(&e))?;

        let tx = build_erc20_approve(owner, addr, spender, value.base());
        let tx_hash = self.gateway.send(tx).await.map_err(|e| approval_failed(&e))?;
        info!(token = %token.symbol, %spender, amount = %value, %tx_hash, "approval submitted");

        let receipt = self
            .gateway
            .wait_for_receipt(
                tx_hash,
                self.swap.confirmation_timeout(),
                self.swap.poll_interval(),
            )
            .await
            .map_err(|e| approval_failed(&e))?;
        if !receipt.success {
            return Err(SwapError::ApprovalFailed(format!(
                "approval {tx_hash:#x} reverted"
            )));
        }
        info!(token = %token.symbol, %tx_hash, "approval confirmed");
        Ok(Some(receipt))
    }
}

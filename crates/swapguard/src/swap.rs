//! Swap execution: one attempt walks `Estimating → ApprovalCheck → [Approving] → Dispatching →
//! Confirming` and ends in `Succeeded` or `Failed`. Nothing is retried; a new attempt always
//! starts from a fresh quote.

use crate::{
    allowance::AllowanceManager,
    amount::TokenAmount,
    chains::{
        evm::{transferred_to, IUniswapV2Router02},
        ChainGateway, TxReceipt,
    },
    config::{NetworkConfig, SwapConfig},
    errors::{classify_swap_failure, SwapError},
    quote::{minimum_out, slippage_percent_to_bps, Quote, QuoteEngine},
    tokens::{SwapPath, TokenDescriptor, TokenKind},
};
use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, Bytes, B256, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall as _,
};
use serde::Serialize;
use std::{cmp::Ordering, fmt};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPhase {
    Idle,
    Estimating,
    ApprovalCheck,
    Approving,
    Dispatching,
    Confirming,
    Succeeded,
    Failed,
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Estimating => "estimating",
            Self::ApprovalCheck => "approval_check",
            Self::Approving => "approving",
            Self::Dispatching => "dispatching",
            Self::Confirming => "confirming",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Router entry point used for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapVariant {
    /// `swapExactETHForTokens`, input attached as call value.
    NativeForTokens,
    /// `swapExactTokensForETH`.
    TokensForNative,
    /// `swapExactTokensForTokens`.
    TokensForTokens,
}

impl SwapVariant {
    pub fn select(from: TokenKind, to: TokenKind) -> Result<Self, SwapError> {
        match (from, to) {
            (TokenKind::Native, TokenKind::Erc20(_)) => Ok(Self::NativeForTokens),
            (TokenKind::Erc20(_), TokenKind::Native) => Ok(Self::TokensForNative),
            (TokenKind::Erc20(_), TokenKind::Erc20(_)) => Ok(Self::TokensForTokens),
            (TokenKind::Native, TokenKind::Native) => Err(SwapError::QuoteUnavailable(
                "cannot swap the native asset for itself".to_owned(),
            )),
        }
    }

    /// Whether the router must be allowed to pull the input token first.
    pub const fn needs_allowance(self) -> bool {
        match self {
            Self::NativeForTokens => false,
            Self::TokensForNative | Self::TokensForTokens => true,
        }
    }
}

/// Parameters of one router call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterCall {
    pub variant: SwapVariant,
    pub router: Address,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    pub deadline: U256,
}

impl RouterCall {
    pub fn into_tx(self, from: Address) -> TransactionRequest {
        let Self {
            variant,
            router,
            amount_in,
            amount_out_min,
            path,
            recipient,
            deadline,
        } = self;
        let (calldata, value) = match variant {
            SwapVariant::NativeForTokens => (
                IUniswapV2Router02::swapExactETHForTokensCall {
                    amountOutMin: amount_out_min,
                    path,
                    to: recipient,
                    deadline,
                }
                .abi_encode(),
                amount_in,
            ),
            SwapVariant::TokensForNative => (
                IUniswapV2Router02::swapExactTokensForETHCall {
                    amountIn: amount_in,
                    amountOutMin: amount_out_min,
                    path,
                    to: recipient,
                    deadline,
                }
                .abi_encode(),
                U256::ZERO,
            ),
            SwapVariant::TokensForTokens => (
                IUniswapV2Router02::swapExactTokensForTokensCall {
                    amountIn: amount_in,
                    amountOutMin: amount_out_min,
                    path,
                    to: recipient,
                    deadline,
                }
                .abi_encode(),
                U256::ZERO,
            ),
        };
        TransactionRequest::default()
            .with_from(from)
            .with_to(router)
            .with_value(value)
            .with_input(Bytes::from(calldata))
    }
}

/// Where the reported output amount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountOutSource {
    /// ERC20 `Transfer` events to the recipient in the confirmed receipt.
    TransferLogs,
    /// The pre-dispatch router estimate.
    Estimate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapResult {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub variant: SwapVariant,
    pub from: String,
    pub to: String,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub amount_out_source: AmountOutSource,
    pub estimated_out: TokenAmount,
    pub minimum_out: TokenAmount,
    pub deadline: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_tx: Option<B256>,
    pub success: bool,
}

/// Per-attempt progress. Phases only move forward.
#[derive(Debug)]
struct Attempt {
    phase: SwapPhase,
    from: String,
    to: String,
}

impl Attempt {
    fn new(from: &str, to: &str) -> Self {
        Self {
            phase: SwapPhase::Idle,
            from: from.trim().to_owned(),
            to: to.trim().to_owned(),
        }
    }

    fn enter(&mut self, phase: SwapPhase) {
        info!(from = %self.from, to = %self.to, prev = %self.phase, phase = %phase, "swap phase");
        self.phase = phase;
    }
}

#[derive(Debug)]
struct Plan {
    path: SwapPath,
    variant: SwapVariant,
    quote: Quote,
    min_out: TokenAmount,
}

pub struct SwapOrchestrator {
    gateway: ChainGateway,
    quotes: QuoteEngine,
    allowances: AllowanceManager,
    network: NetworkConfig,
    cfg: SwapConfig,
}

impl fmt::Debug for SwapOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapOrchestrator")
            .field("router", &self.quotes.router())
            .field("chain_id", &self.network.chain_id)
            .finish_non_exhaustive()
    }
}

impl SwapOrchestrator {
    pub const fn new(
        gateway: ChainGateway,
        quotes: QuoteEngine,
        allowances: AllowanceManager,
        network: NetworkConfig,
        cfg: SwapConfig,
    ) -> Self {
        Self {
            gateway,
            quotes,
            allowances,
            network,
            cfg,
        }
    }

    /// Swap `amount` of `from` for `to`, sending the output to `owner`. `owner` must be the
    /// connected signer: balances and allowances are read for it and the wallet sends as it.
    pub async fn execute(
        &self,
        from: &str,
        to: &str,
        amount: &str,
        slippage_percent: &str,
        owner: Address,
    ) -> Result<SwapResult, SwapError> {
        let mut attempt = Attempt::new(from, to);
        let res = self
            .run(&mut attempt, amount, slippage_percent, owner)
            .await;
        match &res {
            Ok(r) => {
                attempt.enter(SwapPhase::Succeeded);
                info!(tx_hash = %r.tx_hash, amount_out = %r.amount_out, source = ?r.amount_out_source, "swap confirmed");
            }
            Err(e) if e.is_cancellation() => {
                attempt.enter(SwapPhase::Failed);
                info!(code = e.code(), "swap cancelled by user");
            }
            Err(e) => {
                let at = attempt.phase;
                attempt.enter(SwapPhase::Failed);
                warn!(code = e.code(), error = %e, phase = %at, "swap failed");
            }
        }
        res
    }

    /// Fresh quote, slippage floor, and balance check for this attempt.
    async fn plan(
        &self,
        attempt: &Attempt,
        amount: &str,
        slippage_percent: &str,
        owner: Address,
    ) -> Result<Plan, SwapError> {
        let path = self.quotes.registry().path(&attempt.from, &attempt.to)?;
        let (from_token, to_token) = (path.from_token(), path.to_token());
        let variant = SwapVariant::select(from_token.kind(), to_token.kind())?;
        let requested = TokenAmount::parse(amount, from_token.decimals)?;
        if requested.is_zero() {
            return Err(SwapError::InvalidAmount("amount must be positive".to_owned()));
        }
        let bps = slippage_percent_to_bps(slippage_percent)?;

        let quote = self.quotes.estimate_path(&path, amount).await?;
        if quote.amount_out.is_zero() {
            return Err(SwapError::QuoteUnavailable(format!(
                "router quotes zero {} for {} {}",
                to_token.symbol, quote.amount_in, from_token.symbol
            )));
        }
        let min_out = TokenAmount::from_base(
            minimum_out(quote.amount_out.base(), bps),
            to_token.decimals,
        );
        self.check_balance(from_token, owner, &requested).await?;
        Ok(Plan {
            path,
            variant,
            quote,
            min_out,
        })
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        amount: &str,
        slippage_percent: &str,
        owner: Address,
    ) -> Result<SwapResult, SwapError> {
        attempt.enter(SwapPhase::Estimating);
        if !self.gateway.has_signer() {
            return Err(SwapError::SignerUnavailable);
        }
        let signer = self
            .gateway
            .signer_address()
            .await
            .map_err(classify_swap_failure)?;
        if signer != owner {
            return Err(SwapError::SignerMismatch {
                owner: owner.to_string(),
                signer: signer.to_string(),
            });
        }
        self.gateway.ensure_network(&self.network).await?;
        let Plan {
            path,
            variant,
            quote,
            min_out,
        } = self.plan(attempt, amount, slippage_percent, owner).await?;
        let (from_token, to_token) = (path.from_token(), path.to_token());

        attempt.enter(SwapPhase::ApprovalCheck);
        let router = self.quotes.router();
        let mut approval_tx = None;
        if variant.needs_allowance()
            && self
                .allowances
                .needs_approval(from_token, owner, router, amount)
                .await?
        {
            attempt.enter(SwapPhase::Approving);
            approval_tx = self
                .allowances
                .approve(from_token, router, amount)
                .await?
                .map(|r| r.tx_hash);
        }

        attempt.enter(SwapPhase::Dispatching);
        let deadline = self.deadline();
        let tx = RouterCall {
            variant,
            router,
            amount_in: quote.amount_in.base(),
            amount_out_min: min_out.base(),
            path: quote.path.clone(),
            recipient: owner,
            deadline: U256::from(deadline),
        }
        .into_tx(owner);
        self.gateway
            .reader()
            .simulate(&tx)
            .await
            .map_err(classify_swap_failure)?;
        let tx_hash = self
            .gateway
            .send(tx.clone())
            .await
            .map_err(classify_swap_failure)?;
        info!(%tx_hash, ?variant, min_out = %min_out, deadline, "swap submitted");

        attempt.enter(SwapPhase::Confirming);
        let receipt = self
            .gateway
            .wait_for_receipt(tx_hash, self.cfg.confirmation_timeout(), self.cfg.poll_interval())
            .await
            .map_err(classify_swap_failure)?;
        if !receipt.success {
            return Err(self.revert_reason(&tx, tx_hash).await);
        }

        let (amount_out, amount_out_source) = realized_output(&receipt, to_token, owner, &quote);
        Ok(SwapResult {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            variant,
            from: from_token.symbol.clone(),
            to: to_token.symbol.clone(),
            amount_in: quote.amount_in,
            amount_out,
            amount_out_source,
            estimated_out: quote.amount_out,
            minimum_out: min_out,
            deadline,
            approval_tx,
            success: receipt.success,
        })
    }

    /// Unix seconds after which the router rejects the swap.
    fn deadline(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        now.saturating_add(self.cfg.deadline_seconds)
    }

    async fn check_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        requested: &TokenAmount,
    ) -> Result<(), SwapError> {
        let available = match token.kind() {
            TokenKind::Native => self
                .gateway
                .native_balance(owner)
                .await
                .map(|b| TokenAmount::from_base(b, token.decimals)),
            TokenKind::Erc20(addr) => self.gateway.erc20_balance(addr, owner).await,
        }
        .map_err(|e| SwapError::RpcError(format!("read {} balance: {e}", token.symbol)))?;

        if requested.cmp_value(&available) == Ordering::Greater {
            return Err(SwapError::InsufficientBalance {
                requested: requested.to_string(),
                available: available.to_string(),
            });
        }
        Ok(())
    }

    /// Replay a reverted swap to recover the revert reason.
    async fn revert_reason(&self, tx: &TransactionRequest, tx_hash: B256) -> SwapError {
        match self.gateway.reader().simulate(tx).await {
            Err(e) => classify_swap_failure(e),
            Ok(_) => SwapError::RpcError(format!("transaction {tx_hash:#x} reverted")),
        }
    }
}

fn realized_output(
    receipt: &TxReceipt,
    to_token: &TokenDescriptor,
    recipient: Address,
    quote: &Quote,
) -> (TokenAmount, AmountOutSource) {
    let TokenKind::Erc20(addr) = to_token.kind() else {
        return (quote.amount_out, AmountOutSource::Estimate);
    };
    match transferred_to(&receipt.logs, addr, recipient) {
        Some(v) => (
            TokenAmount::from_base(v, to_token.decimals),
            AmountOutSource::TransferLogs,
        ),
        None => (quote.amount_out, AmountOutSource::Estimate),
    }
}

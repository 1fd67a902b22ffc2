//! Chain access: read-only calls that work without a signer, and state-changing calls that
//! go through a connected wallet.

pub mod evm;
#[cfg(test)]
pub(crate) mod mock;
pub mod wallet;

use crate::{
    amount::TokenAmount,
    config::NetworkConfig,
    errors::{GatewayError, SwapError},
};
use alloy::{
    primitives::{Address, Bytes, Log, B256, U256},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// The parts of a mined transaction the swap core looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub success: bool,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

/// Read-only chain access. Usable with no wallet connected.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64, GatewayError>;

    async fn native_balance(&self, owner: Address) -> Result<U256, GatewayError>;

    async fn erc20_balance_of(&self, token: Address, owner: Address)
        -> Result<U256, GatewayError>;

    async fn erc20_decimals(&self, token: Address) -> Result<u8, GatewayError>;

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, GatewayError>;

    /// Router output simulation (`getAmountsOut`).
    async fn get_amounts_out(
        &self,
        router: Address,
        amount_in: U256,
        path: Vec<Address>,
    ) -> Result<Vec<U256>, GatewayError>;

    /// Factory pair lookup (`getPair`). The zero address means no pool.
    async fn get_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, GatewayError>;

    /// `eth_call` the transaction against pending state.
    async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes, GatewayError>;

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, GatewayError>;
}

/// The wallet capability: account access, network negotiation, and signing.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError>;

    async fn chain_id(&self) -> Result<u64, GatewayError>;

    /// Ask the wallet to switch networks. Fails with `UnknownChain` if it has never seen the
    /// network.
    async fn request_network_switch(&self, chain_id_hex: &str) -> Result<(), GatewayError>;

    async fn request_network_add(&self, network: &NetworkConfig) -> Result<(), GatewayError>;

    /// Sign and broadcast. Returns the transaction hash; confirmation is awaited separately.
    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<B256, GatewayError>;
}

#[derive(Clone)]
pub struct ChainGateway {
    reader: Arc<dyn ChainReader>,
    wallet: Option<Arc<dyn Wallet>>,
}

impl std::fmt::Debug for ChainGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainGateway")
            .field("wallet_connected", &self.wallet.is_some())
            .finish_non_exhaustive()
    }
}

fn switch_rejected(e: &GatewayError) -> SwapError {
    SwapError::NetworkSwitchRejected(e.to_string())
}

impl ChainGateway {
    pub fn new(reader: Arc<dyn ChainReader>, wallet: Option<Arc<dyn Wallet>>) -> Self {
        Self { reader, wallet }
    }

    pub fn reader(&self) -> &dyn ChainReader {
        self.reader.as_ref()
    }

    pub fn has_signer(&self) -> bool {
        self.wallet.is_some()
    }

    fn signer(&self) -> Result<&Arc<dyn Wallet>, GatewayError> {
        self.wallet.as_ref().ok_or(GatewayError::SignerUnavailable)
    }

    /// The first account the wallet exposes.
    pub async fn signer_address(&self) -> Result<Address, GatewayError> {
        let accounts = self.signer()?.request_accounts().await?;
        accounts
            .first()
            .copied()
            .ok_or(GatewayError::SignerUnavailable)
    }

    /// Compare the active network (the wallet's, or the read endpoint's when no wallet is
    /// connected) with `expected_chain_id`.
    pub async fn current_network_matches(
        &self,
        expected_chain_id: u64,
    ) -> Result<bool, GatewayError> {
        let current = match &self.wallet {
            Some(w) => w.chain_id().await?,
            None => self.reader.chain_id().await?,
        };
        Ok(current == expected_chain_id)
    }

    /// Make the wallet's active network match `expected`, registering it first if the wallet
    /// does not know it.
    pub async fn ensure_network(&self, expected: &NetworkConfig) -> Result<(), SwapError> {
        let matches = self
            .current_network_matches(expected.chain_id)
            .await
            .map_err(|e| SwapError::RpcError(e.to_string()))?;
        if matches {
            return Ok(());
        }

        let wallet = self.signer().map_err(|_| SwapError::SignerUnavailable)?;
        let chain_hex = expected.chain_id_hex();
        info!(chain_id = expected.chain_id, "requesting network switch");
        match wallet.request_network_switch(&chain_hex).await {
            Ok(()) => Ok(()),
            Err(GatewayError::UnknownChain(_)) => {
                info!(chain_id = expected.chain_id, "network unknown to wallet; registering");
                wallet
                    .request_network_add(expected)
                    .await
                    .map_err(|e| switch_rejected(&e))?;
                let now_matches = wallet
                    .chain_id()
                    .await
                    .is_ok_and(|id| id == expected.chain_id);
                if now_matches {
                    return Ok(());
                }
                wallet
                    .request_network_switch(&chain_hex)
                    .await
                    .map_err(|e| switch_rejected(&e))
            }
            Err(e) => Err(switch_rejected(&e)),
        }
    }

    pub async fn native_balance(&self, owner: Address) -> Result<U256, GatewayError> {
        self.reader.native_balance(owner).await
    }

    /// ERC20 balance with the token's decimals read from the contract, not the registry.
    pub async fn erc20_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<TokenAmount, GatewayError> {
        let base = self.reader.erc20_balance_of(token, owner).await?;
        let decimals = self.reader.erc20_decimals(token).await?;
        Ok(TokenAmount::from_base(base, decimals))
    }

    /// Sign and broadcast through the connected wallet.
    pub async fn send(&self, tx: TransactionRequest) -> Result<B256, GatewayError> {
        self.signer()?.sign_and_send(tx).await
    }

    /// Poll for a receipt until it appears or `timeout` passes.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TxReceipt, GatewayError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.reader.receipt(tx_hash).await {
                Ok(Some(r)) => return Ok(r),
                Ok(None) => {}
                Err(e) => warn!(%tx_hash, error = %e, "receipt lookup failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!("{tx_hash:#x}")));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn tx_status(&self, tx_hash: B256) -> Result<TxStatus, GatewayError> {
        Ok(match self.reader.receipt(tx_hash).await? {
            None => TxStatus::Pending,
            Some(r) if r.success => TxStatus::Success,
            Some(_) => TxStatus::Failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockReader, MockWallet};
    use super::*;

    fn network(chain_id: u64) -> NetworkConfig {
        NetworkConfig {
            chain_id,
            ..NetworkConfig::default()
        }
    }

    #[tokio::test]
    async fn reads_work_without_wallet_but_sends_do_not() {
        let reader = Arc::new(MockReader::default());
        reader.set_native_balance(U256::from(5_u64));
        let gw = ChainGateway::new(reader, None);

        let bal = gw.native_balance(Address::ZERO).await;
        assert_eq!(bal, Ok(U256::from(5_u64)), "read served by public endpoint");

        let sent = gw.send(TransactionRequest::default()).await;
        assert_eq!(sent, Err(GatewayError::SignerUnavailable), "send needs a signer");
        assert!(
            matches!(
                gw.ensure_network(&network(1)).await,
                Err(SwapError::SignerUnavailable)
            ),
            "switch needs a wallet"
        );
    }

    #[tokio::test]
    async fn matching_network_needs_no_switch() {
        let wallet = Arc::new(MockWallet::on_chain(10143));
        let gw = ChainGateway::new(Arc::new(MockReader::default()), Some(wallet.clone()));
        assert!(gw.ensure_network(&network(10143)).await.is_ok(), "already there");
        assert_eq!(wallet.switch_requests(), 0, "no switch requested");
    }

    #[tokio::test]
    async fn known_network_is_switched_to() {
        let wallet = Arc::new(MockWallet::on_chain(1));
        wallet.know_chain(10143);
        let gw = ChainGateway::new(Arc::new(MockReader::default()), Some(wallet.clone()));
        assert!(gw.ensure_network(&network(10143)).await.is_ok(), "switched");
        assert_eq!(wallet.chain_id().await, Ok(10143), "wallet on target chain");
        assert_eq!(wallet.add_requests(), 0, "no registration needed");
    }

    #[tokio::test]
    async fn unknown_network_is_registered_then_switched() {
        let wallet = Arc::new(MockWallet::on_chain(1));
        let gw = ChainGateway::new(Arc::new(MockReader::default()), Some(wallet.clone()));
        assert!(gw.ensure_network(&network(10143)).await.is_ok(), "added and switched");
        assert_eq!(wallet.add_requests(), 1, "registered once");
        assert_eq!(wallet.chain_id().await, Ok(10143), "on target chain");
    }

    #[tokio::test]
    async fn declined_switch_is_reported() {
        let wallet = Arc::new(MockWallet::on_chain(1));
        wallet.know_chain(10143);
        wallet.reject_network_requests();
        let gw = ChainGateway::new(Arc::new(MockReader::default()), Some(wallet));
        assert!(
            matches!(
                gw.ensure_network(&network(10143)).await,
                Err(SwapError::NetworkSwitchRejected(_))
            ),
            "declined switch"
        );
    }

    #[tokio::test]
    async fn declined_registration_is_reported() {
        let wallet = Arc::new(MockWallet::on_chain(1));
        wallet.reject_network_requests();
        let gw = ChainGateway::new(Arc::new(MockReader::default()), Some(wallet));
        assert!(
            matches!(
                gw.ensure_network(&network(10143)).await,
                Err(SwapError::NetworkSwitchRejected(_))
            ),
            "declined add"
        );
    }

    #[tokio::test]
    async fn erc20_balance_uses_live_decimals() {
        let reader = Arc::new(MockReader::default());
        reader.set_erc20_balance(U256::from(2_500_000_u64));
        reader.set_decimals(6);
        let gw = ChainGateway::new(reader, None);
        let bal = gw.erc20_balance(Address::repeat_byte(7), Address::ZERO).await;
        assert_eq!(
            bal.map(|b| b.to_string()),
            Ok("2.5".to_owned()),
            "six live decimals"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_wait_times_out() {
        let gw = ChainGateway::new(Arc::new(MockReader::default()), None);
        let r = gw
            .wait_for_receipt(
                B256::repeat_byte(1),
                Duration::from_secs(3),
                Duration::from_millis(500),
            )
            .await;
        assert!(matches!(r, Err(GatewayError::Timeout(_))), "timed out: {r:?}");
    }

    #[tokio::test]
    async fn status_reflects_receipt() {
        let reader = Arc::new(MockReader::default());
        let gw = ChainGateway::new(reader.clone(), None);
        let h = B256::repeat_byte(2);
        assert_eq!(gw.tx_status(h).await, Ok(TxStatus::Pending), "no receipt yet");
        reader.set_receipt_success(false);
        reader.mine(h);
        assert_eq!(gw.tx_status(h).await, Ok(TxStatus::Failed), "reverted");
    }
}

//! A wallet backed by a locally held private key. It behaves like a browser wallet towards the
//! swap core: it tracks which networks it knows and which one is active, and it signs and
//! broadcasts on the active network.

use super::{
    evm::{endpoint_list, provider_for_url, EvmProvider},
    Wallet,
};
use crate::{
    config::{NetworkConfig, RpcConfig},
    errors::GatewayError,
    retry::{first_success, FailoverPolicy},
};
use alloy::{
    consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718 as _,
    primitives::{Address, TxKind, B256, U256},
    providers::Provider as _,
    rpc::types::{BlockNumberOrTag, TransactionRequest},
    signers::{local::PrivateKeySigner, SignerSync as _},
};
use async_trait::async_trait;
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info};

/// Floor for the priority fee: 1.5 gwei.
const MIN_PRIORITY_FEE: u128 = 1_500_000_000;

/// Fee market inputs read from the chain right before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeMarket {
    /// Pending block base fee. `None` on chains without EIP-1559.
    pub base_fee: Option<u128>,
    pub gas_price: u128,
}

/// `(max_fee_per_gas, max_priority_fee_per_gas)`: priority is `max(1.5 gwei, gas_price / 10)`,
/// max fee is `2 * base_fee + priority`.
pub fn eip1559_fees(base_fee: u128, gas_price: u128) -> (u128, u128) {
    let priority = MIN_PRIORITY_FEE.max(gas_price / 10);
    let max_fee = base_fee
        .saturating_mul(2)
        .saturating_add(priority)
        .max(base_fee.saturating_add(priority));
    (max_fee, priority)
}

/// Fill fee fields, preferring EIP-1559 when the chain reports a base fee. Caller-set fees are
/// left alone.
pub fn fill_fees(mut tx: TransactionRequest, market: FeeMarket) -> TransactionRequest {
    if tx.max_fee_per_gas.is_some()
        || tx.max_priority_fee_per_gas.is_some()
        || tx.gas_price.is_some()
    {
        return tx;
    }
    match market.base_fee {
        Some(base_fee) => {
            let (max_fee, priority) = eip1559_fees(base_fee, market.gas_price);
            tx.max_fee_per_gas = Some(max_fee);
            tx.max_priority_fee_per_gas = Some(priority);
        }
        None => tx.gas_price = Some(market.gas_price),
    }
    tx
}

/// Gas estimate plus 20% headroom.
pub const fn padded_gas(estimate: u64) -> u64 {
    estimate.saturating_mul(120) / 100
}

fn already_broadcast(err: &eyre::Report) -> bool {
    let s = format!("{err:#}").to_lowercase();
    s.contains("already known")
        || s.contains("known transaction")
        || s.contains("already imported")
        || s.contains("already in mempool")
}

/// Sign a fully populated request. Returns the EIP-2718 envelope and its hash.
fn sign_request(
    signer: &PrivateKeySigner,
    tx: &TransactionRequest,
    chain_id: u64,
) -> eyre::Result<(TxEnvelope, B256)> {
    let to = tx.to.unwrap_or(TxKind::Create);
    let value = tx.value.unwrap_or(U256::ZERO);
    let input = tx.input.clone().into_input().unwrap_or_default();
    let nonce = tx.nonce.ok_or_else(|| eyre::eyre!("nonce not set"))?;
    let gas_limit = tx.gas.ok_or_else(|| eyre::eyre!("gas limit not set"))?;

    if let Some(max_fee_per_gas) = tx.max_fee_per_gas {
        let unsigned = TxEip1559 {
            chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas.unwrap_or(0),
            to,
            value,
            input,
            access_list: tx.access_list.clone().unwrap_or_default(),
        };
        let sig = signer
            .sign_hash_sync(&unsigned.signature_hash())
            .context("sign eip1559")?;
        let signed = unsigned.into_signed(sig);
        let hash = *signed.hash();
        Ok((TxEnvelope::Eip1559(signed), hash))
    } else {
        let unsigned = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: tx.gas_price.unwrap_or(0),
            gas_limit,
            to,
            value,
            input,
        };
        let sig = signer
            .sign_hash_sync(&unsigned.signature_hash())
            .context("sign legacy")?;
        let signed = unsigned.into_signed(sig);
        let hash = *signed.hash();
        Ok((TxEnvelope::Legacy(signed), hash))
    }
}

#[derive(Debug)]
struct Networks {
    known: BTreeMap<u64, NetworkConfig>,
    active: u64,
}

pub struct LocalWallet {
    signer: PrivateKeySigner,
    rpc: RpcConfig,
    networks: Mutex<Networks>,
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    /// Load a hex private key (with or without `0x`). The wallet starts on `home`.
    pub fn from_secret(
        key: &SecretString,
        home: &NetworkConfig,
        rpc: &RpcConfig,
    ) -> eyre::Result<Self> {
        let signer: PrivateKeySigner = key
            .expose_secret()
            .trim()
            .parse()
            .context("parse evm private key")?;
        Ok(Self {
            signer,
            rpc: rpc.clone(),
            networks: Mutex::new(Networks {
                known: BTreeMap::from([(home.chain_id, home.clone())]),
                active: home.chain_id,
            }),
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn networks(&self) -> MutexGuard<'_, Networks> {
        self.networks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_network(&self) -> Result<NetworkConfig, GatewayError> {
        let n = self.networks();
        n.known
            .get(&n.active)
            .cloned()
            .ok_or(GatewayError::UnknownChain(n.active))
    }

    async fn healthy_provider(
        &self,
        urls: &[String],
        policy: &FailoverPolicy,
    ) -> eyre::Result<EvmProvider> {
        first_success(
            urls,
            policy,
            |u| {
                let u = u.clone();
                let rpc = &self.rpc;
                async move {
                    let p = provider_for_url(&u, rpc)?;
                    p.get_block_number().await.context("get block number")?;
                    Ok(p)
                }
            },
            "select rpc",
        )
        .await
    }

    async fn send_on(
        &self,
        network: &NetworkConfig,
        mut tx: TransactionRequest,
    ) -> eyre::Result<B256> {
        let urls = endpoint_list(network);
        let policy = FailoverPolicy::from(&self.rpc);
        let provider = self.healthy_provider(&urls, &policy).await?;
        let from = self.signer.address();

        tx.chain_id = Some(network.chain_id);
        tx.from = Some(from);

        if tx.gas_price.is_none() && tx.max_fee_per_gas.is_none() {
            let base_fee = provider
                .get_block_by_number(BlockNumberOrTag::Pending)
                .await
                .ok()
                .flatten()
                .and_then(|b| b.header.base_fee_per_gas.map(u128::from));
            let gas_price = provider.get_gas_price().await.context("get gas price")?;
            tx = fill_fees(
                tx,
                FeeMarket {
                    base_fee,
                    gas_price,
                },
            );
        }

        if tx.nonce.is_none() {
            let n = provider
                .get_transaction_count(from)
                .pending()
                .await
                .context("get nonce")?;
            tx.nonce = Some(n);
        }

        if tx.gas.is_none() {
            let estimate = provider
                .estimate_gas(tx.clone())
                .await
                .context("estimate gas")?;
            tx.gas = Some(padded_gas(estimate));
        }

        let (envelope, tx_hash) = sign_request(&self.signer, &tx, network.chain_id)?;
        let raw = envelope.encoded_2718();
        debug!(%tx_hash, nonce = ?tx.nonce, gas = ?tx.gas, "broadcasting");

        first_success(
            &urls,
            &policy,
            |u| {
                let u = u.clone();
                let raw = raw.clone();
                let rpc = &self.rpc;
                async move {
                    let p = provider_for_url(&u, rpc)?;
                    match p.send_raw_transaction(&raw).await {
                        Ok(_pending) => Ok(()),
                        Err(e) => {
                            let report: eyre::Report = e.into();
                            if already_broadcast(&report) {
                                Ok(())
                            } else {
                                Err(report).context("broadcast raw tx")
                            }
                        }
                    }
                }
            },
            "send transaction",
        )
        .await?;

        Ok(tx_hash)
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(vec![self.signer.address()])
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(self.networks().active)
    }

    async fn request_network_switch(&self, chain_id_hex: &str) -> Result<(), GatewayError> {
        let target = u64::from_str_radix(chain_id_hex.trim().trim_start_matches("0x"), 16)
            .map_err(|e| GatewayError::Rpc(format!("bad chain id {chain_id_hex}: {e}")))?;
        let mut n = self.networks();
        if !n.known.contains_key(&target) {
            return Err(GatewayError::UnknownChain(target));
        }
        n.active = target;
        info!(chain_id = target, "wallet network switched");
        Ok(())
    }

    async fn request_network_add(&self, network: &NetworkConfig) -> Result<(), GatewayError> {
        if endpoint_list(network).is_empty() {
            return Err(GatewayError::Rpc(format!(
                "network {} has no rpc urls",
                network.chain_id
            )));
        }
        self.networks()
            .known
            .insert(network.chain_id, network.clone());
        info!(chain_id = network.chain_id, "wallet network registered");
        Ok(())
    }

    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<B256, GatewayError> {
        let network = self.active_network()?;
        self.send_on(&network, tx)
            .await
            .map_err(|e| GatewayError::from_report(&e))
    }
}

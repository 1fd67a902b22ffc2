use super::{ChainReader, TxReceipt};
use crate::{
    config::{NetworkConfig, RpcConfig},
    errors::GatewayError,
    retry::{first_success, FailoverPolicy},
};
use alloy::{
    network::{ReceiptResponse, TransactionBuilder as _},
    primitives::{Address, Bytes, Log, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionRequest},
    sol,
    sol_types::{SolCall as _, SolEvent as _},
};
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use std::{future::Future, time::Duration};

pub type EvmProvider = RootProvider;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    contract IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] path)
            external view returns (uint256[] amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external payable returns (uint256[] amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
    }
}

sol! {
    #[sol(rpc)]
    contract IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }
}

pub(crate) fn provider_for_url(url: &str, rpc: &RpcConfig) -> eyre::Result<EvmProvider> {
    let u: reqwest::Url = url
        .parse()
        .with_context(|| format!("invalid rpc url: {url}"))?;
    let client = Client::builder()
        .timeout(Duration::from_secs(rpc.request_timeout_seconds))
        .connect_timeout(Duration::from_secs(rpc.connect_timeout_seconds))
        .build()
        .context("build rpc http client")?;
    let http = alloy::transports::http::Http::with_client(client, u);
    let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
    Ok(RootProvider::new(rpc_client))
}

/// Trimmed, de-duplicated endpoint list with the primary first.
pub(crate) fn endpoint_list(network: &NetworkConfig) -> Vec<String> {
    let mut urls: Vec<String> = Vec::with_capacity(network.rpc_urls.len());
    for u in &network.rpc_urls {
        let t = u.trim();
        if t.is_empty() || urls.iter().any(|x| x == t) {
            continue;
        }
        urls.push(t.to_owned());
    }
    urls
}

/// JSON-RPC backed reader. Reads fail over across every configured endpoint; simulation uses
/// the primary endpoint only so a revert there is never masked by a lagging fallback.
#[derive(Debug, Clone)]
pub struct EvmReader {
    urls: Vec<String>,
    rpc: RpcConfig,
    policy: FailoverPolicy,
}

impl EvmReader {
    pub fn new(network: &NetworkConfig, rpc: &RpcConfig) -> eyre::Result<Self> {
        let urls = endpoint_list(network);
        if urls.is_empty() {
            eyre::bail!("network.rpc_urls is empty");
        }
        Ok(Self {
            urls,
            rpc: rpc.clone(),
            policy: FailoverPolicy::from(rpc),
        })
    }

    fn primary(&self) -> eyre::Result<EvmProvider> {
        let url = self
            .urls
            .first()
            .ok_or_else(|| eyre::eyre!("no rpc endpoint"))?;
        provider_for_url(url, &self.rpc)
    }

    async fn read<T, Fut>(
        &self,
        label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Send + Sync,
    ) -> Result<T, GatewayError>
    where
        T: Send,
        Fut: Future<Output = eyre::Result<T>> + Send,
    {
        first_success(
            &self.urls,
            &self.policy,
            |u| {
                let u = u.clone();
                let rpc = &self.rpc;
                let f = &f;
                async move {
                    let p = provider_for_url(&u, rpc)?;
                    f(p).await
                }
            },
            label,
        )
        .await
        .map_err(|e| GatewayError::from_report(&e))
    }
}

#[async_trait]
impl ChainReader for EvmReader {
    async fn chain_id(&self) -> Result<u64, GatewayError> {
        self.read("chain id", |p| async move {
            p.get_chain_id().await.context("get chain id")
        })
        .await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, GatewayError> {
        self.read("get balance", |p| async move {
            p.get_balance(owner).await.context("get balance")
        })
        .await
    }

    async fn erc20_balance_of(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<U256, GatewayError> {
        self.read("erc20 balance", |p| async move {
            let c = IERC20::new(token, &p);
            c.balanceOf(owner).call().await.context("erc20 balanceOf")
        })
        .await
    }

    async fn erc20_decimals(&self, token: Address) -> Result<u8, GatewayError> {
        self.read("erc20 decimals", |p| async move {
            let c = IERC20::new(token, &p);
            c.decimals().call().await.context("erc20 decimals")
        })
        .await
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, GatewayError> {
        self.read("erc20 allowance", |p| async move {
            let c = IERC20::new(token, &p);
            c.allowance(owner, spender)
                .call()
                .await
                .context("erc20 allowance")
        })
        .await
    }

    async fn get_amounts_out(
        &self,
        router: Address,
        amount_in: U256,
        path: Vec<Address>,
    ) -> Result<Vec<U256>, GatewayError> {
        self.read("router getAmountsOut", |p| {
            let path = path.clone();
            async move {
                let r = IUniswapV2Router02::new(router, &p);
                r.getAmountsOut(amount_in, path)
                    .call()
                    .await
                    .context("getAmountsOut")
            }
        })
        .await
    }

    async fn get_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<Address, GatewayError> {
        self.read("factory getPair", |p| async move {
            let f = IUniswapV2Factory::new(factory, &p);
            f.getPair(token_a, token_b).call().await.context("getPair")
        })
        .await
    }

    async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes, GatewayError> {
        let p = self.primary().map_err(|e| GatewayError::from_report(&e))?;
        p.call(tx.clone())
            .block(BlockNumberOrTag::Pending.into())
            .await
            .context("eth_call")
            .map_err(|e| GatewayError::from_report(&e))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, GatewayError> {
        let r = self
            .read("get tx receipt", |p| async move {
                p.get_transaction_receipt(tx_hash)
                    .await
                    .context("get transaction receipt")
            })
            .await?;
        Ok(r.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            block_number: r.block_number,
            gas_used: r.gas_used,
            success: ReceiptResponse::status(&r),
            logs: r.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        }))
    }
}

pub fn build_erc20_approve(
    from: Address,
    token: Address,
    spender: Address,
    value: U256,
) -> TransactionRequest {
    let calldata = IERC20::approveCall { spender, value }.abi_encode();
    TransactionRequest::default()
        .with_from(from)
        .with_to(token)
        .with_input(Bytes::from(calldata))
}

/// Sum of ERC20 `Transfer` amounts emitted by `token` to `recipient`.
pub fn transferred_to(logs: &[Log], token: Address, recipient: Address) -> Option<U256> {
    let mut total: Option<U256> = None;
    for l in logs.iter().filter(|l| l.address == token) {
        let Ok(ev) = IERC20::Transfer::decode_log_data(&l.data) else {
            continue;
        };
        if ev.to == recipient {
            total = Some(total.unwrap_or(U256::ZERO).saturating_add(ev.value));
        }
    }
    total
}

#[cfg(test)]
pub(crate) fn transfer_log(token: Address, from: Address, to: Address, value: U256) -> Log {
    let ev = IERC20::Transfer { from, to, value };
    Log {
        address: token,
        data: ev.encode_log_data(),
    }
}

//! Scripted chain and wallet doubles that count every call they receive.

use super::{ChainReader, TxReceipt, Wallet};
use crate::{chains::evm::IERC20, config::NetworkConfig, errors::GatewayError};
use alloy::{
    primitives::{Address, Bytes, Log, B256, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall as _,
};
use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ReaderState {
    chain_id: u64,
    native_balance: U256,
    erc20_balance: U256,
    decimals: u8,
    allowance: Result<U256, GatewayError>,
    amounts_out: Result<Vec<U256>, GatewayError>,
    pair: Address,
    simulate: Result<Bytes, GatewayError>,
    simulate_script: VecDeque<Result<Bytes, GatewayError>>,
    receipt_success: bool,
    receipt_logs: Vec<Log>,
    receipts: HashMap<B256, TxReceipt>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Debug)]
pub struct MockReader {
    state: Mutex<ReaderState>,
}

impl Default for MockReader {
    fn default() -> Self {
        Self {
            state: Mutex::new(ReaderState {
                chain_id: 10143,
                native_balance: U256::ZERO,
                erc20_balance: U256::ZERO,
                decimals: 18,
                allowance: Ok(U256::ZERO),
                amounts_out: Err(GatewayError::Reverted("no pool".to_owned())),
                pair: Address::ZERO,
                simulate: Ok(Bytes::new()),
                simulate_script: VecDeque::new(),
                receipt_success: true,
                receipt_logs: vec![],
                receipts: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }
}

impl MockReader {
    fn count(&self, name: &'static str) {
        *lock(&self.state).calls.entry(name).or_default() += 1;
    }

    pub fn calls(&self, name: &str) -> usize {
        lock(&self.state).calls.get(name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    pub fn set_native_balance(&self, v: U256) {
        lock(&self.state).native_balance = v;
    }

    pub fn set_erc20_balance(&self, v: U256) {
        lock(&self.state).erc20_balance = v;
    }

    pub fn set_decimals(&self, d: u8) {
        lock(&self.state).decimals = d;
    }

    pub fn set_allowance(&self, v: U256) {
        lock(&self.state).allowance = Ok(v);
    }

    pub fn fail_allowance(&self, e: GatewayError) {
        lock(&self.state).allowance = Err(e);
    }

    pub fn set_amounts_out(&self, out: U256) {
        lock(&self.state).amounts_out = Ok(vec![U256::ZERO, out]);
    }

    pub fn fail_amounts_out(&self, e: GatewayError) {
        lock(&self.state).amounts_out = Err(e);
    }

    pub fn set_pair(&self, pair: Address) {
        lock(&self.state).pair = pair;
    }

    pub fn fail_simulation(&self, e: GatewayError) {
        lock(&self.state).simulate = Err(e);
    }

    /// Answer the next simulation with `r`; later calls fall back to the standing result.
    pub fn queue_simulation(&self, r: Result<Bytes, GatewayError>) {
        lock(&self.state).simulate_script.push_back(r);
    }

    pub fn set_receipt_success(&self, ok: bool) {
        lock(&self.state).receipt_success = ok;
    }

    pub fn set_receipt_logs(&self, logs: Vec<Log>) {
        lock(&self.state).receipt_logs = logs;
    }

    /// Record a receipt for `hash` using the configured outcome and logs.
    pub fn mine(&self, hash: B256) {
        let mut s = lock(&self.state);
        let receipt = TxReceipt {
            tx_hash: hash,
            block_number: Some(100),
            gas_used: 120_000,
            success: s.receipt_success,
            logs: s.receipt_logs.clone(),
        };
        s.receipts.insert(hash, receipt);
    }
}

#[async_trait]
impl ChainReader for MockReader {
    async fn chain_id(&self) -> Result<u64, GatewayError> {
        self.count("chain_id");
        Ok(lock(&self.state).chain_id)
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256, GatewayError> {
        self.count("native_balance");
        Ok(lock(&self.state).native_balance)
    }

    async fn erc20_balance_of(
        &self,
        _token: Address,
        _owner: Address,
    ) -> Result<U256, GatewayError> {
        self.count("erc20_balance_of");
        Ok(lock(&self.state).erc20_balance)
    }

    async fn erc20_decimals(&self, _token: Address) -> Result<u8, GatewayError> {
        self.count("erc20_decimals");
        Ok(lock(&self.state).decimals)
    }

    async fn erc20_allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, GatewayError> {
        self.count("erc20_allowance");
        lock(&self.state).allowance.clone()
    }

    async fn get_amounts_out(
        &self,
        _router: Address,
        _amount_in: U256,
        _path: Vec<Address>,
    ) -> Result<Vec<U256>, GatewayError> {
        self.count("get_amounts_out");
        lock(&self.state).amounts_out.clone()
    }

    async fn get_pair(
        &self,
        _factory: Address,
        _token_a: Address,
        _token_b: Address,
    ) -> Result<Address, GatewayError> {
        self.count("get_pair");
        Ok(lock(&self.state).pair)
    }

    async fn simulate(&self, _tx: &TransactionRequest) -> Result<Bytes, GatewayError> {
        self.count("simulate");
        let mut s = lock(&self.state);
        match s.simulate_script.pop_front() {
            Some(r) => r,
            None => s.simulate.clone(),
        }
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, GatewayError> {
        self.count("receipt");
        Ok(lock(&self.state).receipts.get(&tx_hash).cloned())
    }
}

#[derive(Debug)]
struct WalletState {
    account: Address,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    reject_network: bool,
    send_error: Option<GatewayError>,
    switch_requests: usize,
    add_requests: usize,
    sent: Vec<TransactionRequest>,
}

#[derive(Debug)]
pub struct MockWallet {
    state: Mutex<WalletState>,
    /// When set, sent transactions are mined here and approvals update its allowance.
    chain: Option<Arc<MockReader>>,
}

impl MockWallet {
    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(WalletState {
                account: Address::repeat_byte(0xaa),
                chain_id,
                known_chains: BTreeSet::from([chain_id]),
                reject_network: false,
                send_error: None,
                switch_requests: 0,
                add_requests: 0,
                sent: vec![],
            }),
            chain: None,
        }
    }

    #[must_use]
    pub fn mining_into(mut self, chain: Arc<MockReader>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn account(&self) -> Address {
        lock(&self.state).account
    }

    pub fn know_chain(&self, chain_id: u64) {
        lock(&self.state).known_chains.insert(chain_id);
    }

    pub fn reject_network_requests(&self) {
        lock(&self.state).reject_network = true;
    }

    pub fn fail_sends(&self, e: GatewayError) {
        lock(&self.state).send_error = Some(e);
    }

    pub fn switch_requests(&self) -> usize {
        lock(&self.state).switch_requests
    }

    pub fn add_requests(&self) -> usize {
        lock(&self.state).add_requests
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        lock(&self.state).sent.clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(vec![lock(&self.state).account])
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(lock(&self.state).chain_id)
    }

    async fn request_network_switch(&self, chain_id_hex: &str) -> Result<(), GatewayError> {
        let target = u64::from_str_radix(chain_id_hex.trim_start_matches("0x"), 16)
            .map_err(|e| GatewayError::Rpc(e.to_string()))?;
        let mut s = lock(&self.state);
        s.switch_requests += 1;
        if !s.known_chains.contains(&target) {
            return Err(GatewayError::UnknownChain(target));
        }
        if s.reject_network {
            return Err(GatewayError::UserRejected("switch declined".to_owned()));
        }
        s.chain_id = target;
        Ok(())
    }

    async fn request_network_add(&self, network: &NetworkConfig) -> Result<(), GatewayError> {
        let mut s = lock(&self.state);
        s.add_requests += 1;
        if s.reject_network {
            return Err(GatewayError::UserRejected("add declined".to_owned()));
        }
        s.known_chains.insert(network.chain_id);
        Ok(())
    }

    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<B256, GatewayError> {
        let hash = {
            let mut s = lock(&self.state);
            if let Some(e) = s.send_error.clone() {
                return Err(e);
            }
            s.sent.push(tx.clone());
            let n = u8::try_from(s.sent.len()).unwrap_or(u8::MAX);
            B256::repeat_byte(n)
        };
        if let Some(chain) = &self.chain {
            let input = tx.input.input().cloned().unwrap_or_default();
            if let Ok(call) = IERC20::approveCall::abi_decode(&input) {
                chain.set_allowance(call.value);
            }
            chain.mine(hash);
        }
        Ok(hash)
    }
}

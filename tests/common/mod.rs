//! Deterministic in-process collaborator stubs driving the full pipeline.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use safetrader::amount::to_raw;
use safetrader::chain::{
    ChainHandle, ChainSet, FeeData, GasOracle, LogEntry, MultisigWallet, Rpc, RpcError,
    TxReceipt, WalletCall, WalletError, WalletProvider,
};
use safetrader::clients::aggregator::{AggregatorError, QuoteRequest, RouteProvider};
use safetrader::clients::bus::EventBus;
use safetrader::clients::directory::{DirectoryError, WalletDirectory};
use safetrader::clients::price_feed::{PriceError, PriceFeed, PricePoint};
use safetrader::clients::registry::TokenSource;
use safetrader::execution::orchestrator::{
    run_emission_consumer, Orchestrator, OrchestratorPolicy, SubmitOutcome,
};
use safetrader::execution::{
    run_workers, AllowanceManager, PositionSizer, Scheduler, SizingPolicy, TradeExecutor,
    WalletValidator,
};
use safetrader::models::token::{WalletDeployment, WalletRecord};
use safetrader::models::{
    BindingSource, NetworkKey, Side, Signal, SwapQuote, TokenBinding, Trade,
};
use safetrader::resolver::TokenResolver;
use safetrader::services::monitor::{run_monitor, Emission, MonitorCommand};

pub const WALLET: [u8; 20] = [0xAA; 20];
pub const ROUTER: [u8; 20] = [0xE1; 20];
pub const SPENDER: [u8; 20] = [0xE2; 20];
pub const PERMIT: [u8; 20] = [0xE3; 20];
pub const USDC_ARB: [u8; 20] = [0x01; 20];
pub const USDC_BASE: [u8; 20] = [0x02; 20];
pub const USDC_ETH: [u8; 20] = [0x03; 20];
pub const FOO_ARB: [u8; 20] = [0x10; 20];
pub const FOO_ETH: [u8; 20] = [0x11; 20];

pub fn wallet() -> Address {
    Address::from(WALLET)
}

const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: [u8; 32] = [
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d,
    0xaa, 0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23,
    0xb3, 0xef,
];

// ---------------------------------------------------------------------------
// Shared chain ledger
// ---------------------------------------------------------------------------

struct SwapEffect {
    sell_token: Address,
    sell_is_native: bool,
    buy_token: Address,
    buy_is_native: bool,
    wallet: Address,
    sell_amount: U256,
    buy_amount: U256,
}

/// Mutable chain state shared by the stub RPC, wallet and aggregator.
pub struct ChainLedger {
    balances: Mutex<HashMap<(Address, Address), U256>>,
    native: Mutex<HashMap<Address, U256>>,
    allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    contracts: Mutex<HashSet<Address>>,
    receipts: Mutex<HashMap<B256, TxReceipt>>,
    swap_effects: Mutex<HashMap<Vec<u8>, SwapEffect>>,
    approvals: AtomicUsize,
    executed: Mutex<Vec<WalletCall>>,
    next_tx: AtomicU64,
}

impl ChainLedger {
    pub fn new() -> Arc<Self> {
        let ledger = Arc::new(Self {
            balances: Mutex::new(HashMap::new()),
            native: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            contracts: Mutex::new(HashSet::new()),
            receipts: Mutex::new(HashMap::new()),
            swap_effects: Mutex::new(HashMap::new()),
            approvals: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            next_tx: AtomicU64::new(1),
        });
        // The multi-sig wallet has code and gas money by default.
        ledger.contracts.lock().unwrap().insert(wallet());
        ledger
            .native
            .lock()
            .unwrap()
            .insert(wallet(), U256::from(10u64).pow(U256::from(18u8)));
        ledger
    }

    pub fn set_balance(&self, token: Address, owner: Address, raw: U256) {
        self.balances.lock().unwrap().insert((token, owner), raw);
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        *self
            .balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .unwrap_or(&U256::ZERO)
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        *self
            .allowances
            .lock()
            .unwrap()
            .get(&(token, owner, spender))
            .unwrap_or(&U256::ZERO)
    }

    pub fn approval_count(&self) -> usize {
        self.approvals.load(Ordering::SeqCst)
    }

    pub fn executed_calls(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    fn next_hash(&self) -> B256 {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        B256::from(bytes)
    }
}

// ---------------------------------------------------------------------------
// Stub RPC
// ---------------------------------------------------------------------------

pub struct StubRpc {
    chain_id: u64,
    ledger: Arc<ChainLedger>,
}

impl StubRpc {
    pub fn new(chain_id: u64, ledger: Arc<ChainLedger>) -> Self {
        Self { chain_id, ledger }
    }
}

#[async_trait]
impl Rpc for StubRpc {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.chain_id)
    }

    async fn code(&self, addr: Address) -> Result<Bytes, RpcError> {
        if self.ledger.contracts.lock().unwrap().contains(&addr) {
            Ok(Bytes::from(vec![0x60, 0x80]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn native_balance(&self, addr: Address) -> Result<U256, RpcError> {
        Ok(*self
            .ledger
            .native
            .lock()
            .unwrap()
            .get(&addr)
            .unwrap_or(&U256::ZERO))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let word = |v: U256| Bytes::from(v.to_be_bytes::<32>().to_vec());
        match &data[..4.min(data.len())] {
            // balanceOf(address)
            [0x70, 0xa0, 0x82, 0x31] => {
                let owner = Address::from_slice(&data[16..36]);
                Ok(word(self.ledger.balance(to, owner)))
            }
            // allowance(owner, spender)
            [0xdd, 0x62, 0xed, 0x3e] => {
                let owner = Address::from_slice(&data[16..36]);
                let spender = Address::from_slice(&data[48..68]);
                Ok(word(self.ledger.allowance(to, owner, spender)))
            }
            _ => Ok(word(U256::ZERO)),
        }
    }

    async fn fee_data(&self) -> Result<FeeData, RpcError> {
        Ok(FeeData {
            gas_price: Some(1_000_000_000),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        })
    }

    async fn transaction_count(&self, _addr: Address) -> Result<u64, RpcError> {
        Ok(0)
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: &Bytes,
        _value: U256,
    ) -> Result<u64, RpcError> {
        Ok(100_000)
    }

    async fn send_raw(&self, _tx: Bytes) -> Result<B256, RpcError> {
        Ok(self.ledger.next_hash())
    }

    async fn wait_receipt(&self, hash: B256, _timeout: Duration) -> Result<TxReceipt, RpcError> {
        self.ledger
            .receipts
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or(RpcError::ReceiptTimeout(hash))
    }
}

// ---------------------------------------------------------------------------
// Stub multi-sig wallet
// ---------------------------------------------------------------------------

pub struct StubWallet {
    address: Address,
    ledger: Arc<ChainLedger>,
}

#[async_trait]
impl MultisigWallet for StubWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn owners(&self) -> Result<Vec<Address>, WalletError> {
        Ok(vec![Address::from([0xA9; 20])])
    }

    async fn threshold(&self) -> Result<u32, WalletError> {
        Ok(1)
    }

    async fn execute(
        &self,
        call: WalletCall,
        _gas: safetrader::chain::GasSettings,
        _gas_limit_hint: Option<u64>,
    ) -> Result<B256, WalletError> {
        self.ledger.executed.lock().unwrap().push(call.clone());
        let hash = self.ledger.next_hash();

        let mut logs = Vec::new();
        if call.data.len() >= 68 && call.data[..4] == APPROVE_SELECTOR {
            let spender = Address::from_slice(&call.data[16..36]);
            let value = U256::from_be_slice(&call.data[36..68]);
            self.ledger
                .allowances
                .lock()
                .unwrap()
                .insert((call.to, self.address, spender), value);
            self.ledger.approvals.fetch_add(1, Ordering::SeqCst);
        } else if let Some(effect) = self
            .ledger
            .swap_effects
            .lock()
            .unwrap()
            .remove(call.data.as_ref())
        {
            // Settle the swap against the ledger.
            if effect.sell_is_native {
                let mut native = self.ledger.native.lock().unwrap();
                let held = *native.get(&effect.wallet).unwrap_or(&U256::ZERO);
                native.insert(effect.wallet, held.saturating_sub(effect.sell_amount));
            } else {
                let held = self.ledger.balance(effect.sell_token, effect.wallet);
                self.ledger.set_balance(
                    effect.sell_token,
                    effect.wallet,
                    held.saturating_sub(effect.sell_amount),
                );
            }
            if effect.buy_is_native {
                let mut native = self.ledger.native.lock().unwrap();
                let held = *native.get(&effect.wallet).unwrap_or(&U256::ZERO);
                native.insert(effect.wallet, held.saturating_add(effect.buy_amount));
            } else {
                let held = self.ledger.balance(effect.buy_token, effect.wallet);
                self.ledger.set_balance(
                    effect.buy_token,
                    effect.wallet,
                    held.saturating_add(effect.buy_amount),
                );
                let mut to_topic = [0u8; 32];
                to_topic[12..].copy_from_slice(effect.wallet.as_slice());
                logs.push(LogEntry {
                    address: effect.buy_token,
                    topics: vec![
                        B256::from(TRANSFER_TOPIC),
                        B256::ZERO,
                        B256::from(to_topic),
                    ],
                    data: Bytes::from(effect.buy_amount.to_be_bytes::<32>().to_vec()),
                });
            }
        }

        self.ledger.receipts.lock().unwrap().insert(
            hash,
            TxReceipt {
                tx_hash: hash,
                status: Some(json!("0x1")),
                gas_used: Some(90_000),
                logs,
            },
        );
        Ok(hash)
    }
}

pub struct StubWalletProvider {
    ledger: Arc<ChainLedger>,
}

impl WalletProvider for StubWalletProvider {
    fn wallet(&self, _network: &NetworkKey, address: Address) -> Option<Arc<dyn MultisigWallet>> {
        Some(Arc::new(StubWallet {
            address,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

// ---------------------------------------------------------------------------
// Stub aggregator
// ---------------------------------------------------------------------------

pub struct StubAggregator {
    ledger: Arc<ChainLedger>,
    prices: Arc<PriceBook>,
    min_sell: Mutex<Option<U256>>,
    quotes: AtomicUsize,
    fail_next: AtomicBool,
    data_seq: AtomicU64,
}

impl StubAggregator {
    pub fn quote_count(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }

    pub fn fail_next_quote(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RouteProvider for StubAggregator {
    async fn quote(&self, req: &QuoteRequest) -> Result<SwapQuote, AggregatorError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AggregatorError::Unexpected("stub outage".into()));
        }

        // Convert the sell amount through USD prices into buy units.
        let sell_price = self.prices.usd(&req.sell.symbol).unwrap_or(Decimal::ONE);
        let buy_price = self.prices.usd(&req.buy.symbol).unwrap_or(Decimal::ONE);
        let sell_scale = Decimal::from(10u64.pow(req.sell.decimals as u32));
        let sell_units = Decimal::from_str_exact(&req.sell_amount_raw.to_string()).unwrap()
            / sell_scale;
        let buy_units = sell_units * sell_price / buy_price;
        let buy_amount = to_raw(buy_units.round_dp(req.buy.decimals as u32), req.buy.decimals)
            .unwrap_or(U256::ZERO);

        let seq = self.data_seq.fetch_add(1, Ordering::SeqCst);
        let data = Bytes::from(seq.to_be_bytes().to_vec());

        self.ledger.swap_effects.lock().unwrap().insert(
            data.to_vec(),
            SwapEffect {
                sell_token: req.sell.contract,
                sell_is_native: req.sell.is_native,
                buy_token: req.buy.contract,
                buy_is_native: req.buy.is_native,
                wallet: req.wallet,
                sell_amount: req.sell_amount_raw,
                buy_amount,
            },
        );

        Ok(SwapQuote {
            to: Address::from(ROUTER),
            data,
            value: if req.sell.is_native {
                req.sell_amount_raw
            } else {
                U256::ZERO
            },
            gas_hint: Some(210_000),
            spender: Address::from(SPENDER),
            buy_amount_hint_raw: buy_amount,
        })
    }

    async fn min_sell_amount(
        &self,
        _symbol: &str,
        _chain_id: u64,
    ) -> Result<Option<U256>, AggregatorError> {
        Ok(*self.min_sell.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Stub price feed
// ---------------------------------------------------------------------------

pub struct PriceBook {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl PriceBook {
    pub fn new() -> Arc<Self> {
        let book = Self {
            prices: Mutex::new(HashMap::new()),
        };
        book.prices
            .lock()
            .unwrap()
            .insert("USDC".into(), Decimal::ONE);
        Arc::new(book)
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_uppercase(), price);
    }

    pub fn usd(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(&symbol.to_uppercase())
            .copied()
    }
}

pub struct StubPriceFeed {
    book: Arc<PriceBook>,
}

#[async_trait]
impl PriceFeed for StubPriceFeed {
    async fn price(&self, symbol: &str) -> Result<Option<PricePoint>, PriceError> {
        Ok(self.book.usd(symbol).map(|price_usd| PricePoint {
            price_usd,
            change_24h: None,
            volume_24h: None,
            at: Utc::now(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Stub directory, token source, event bus
// ---------------------------------------------------------------------------

pub struct StubDirectory {
    records: Mutex<HashMap<String, WalletRecord>>,
}

impl StubDirectory {
    pub fn with_active(caller_id: &str, networks: &[&str]) -> Arc<Self> {
        let record = WalletRecord {
            caller_id: caller_id.into(),
            active_deployments: networks
                .iter()
                .map(|n| WalletDeployment {
                    caller_id: caller_id.into(),
                    wallet_address: wallet(),
                    network: NetworkKey::new(*n),
                    active: true,
                    status: "deployed".into(),
                })
                .collect(),
        };
        let records = Mutex::new(HashMap::from([(caller_id.to_string(), record)]));
        Arc::new(Self { records })
    }
}

#[async_trait]
impl WalletDirectory for StubDirectory {
    async fn wallet_record(&self, caller_id: &str) -> Result<Option<WalletRecord>, DirectoryError> {
        Ok(self.records.lock().unwrap().get(caller_id).cloned())
    }
}

pub struct RecordingBus {
    pub events: Mutex<Vec<(String, Value)>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, topic: &'static str, payload: Value) {
        self.events.lock().unwrap().push((topic.into(), payload));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct HarnessConfig {
    pub active_networks: Vec<&'static str>,
    pub token_networks: Vec<&'static str>,
    pub tp1_exit_percent: u32,
    pub trailing_enabled: bool,
    pub trailing_retracement_pct: Decimal,
    pub monitor_tick: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            active_networks: vec!["base", "arbitrum"],
            token_networks: vec!["arbitrum"],
            tp1_exit_percent: 100,
            trailing_enabled: true,
            trailing_retracement_pct: Decimal::from(2),
            monitor_tick: Duration::from_millis(40),
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<ChainLedger>,
    pub prices: Arc<PriceBook>,
    pub bus: Arc<RecordingBus>,
    pub aggregator: Arc<StubAggregator>,
}

fn stable_binding(network: &str, contract: [u8; 20]) -> TokenBinding {
    TokenBinding {
        symbol: "USDC".into(),
        network: NetworkKey::new(network),
        contract: Address::from(contract),
        decimals: 6,
        is_native: false,
        source: BindingSource::Known,
        verified: true,
    }
}

fn foo_binding(network: &str, contract: [u8; 20]) -> TokenBinding {
    TokenBinding {
        symbol: "FOO".into(),
        network: NetworkKey::new(network),
        contract: Address::from(contract),
        decimals: 18,
        is_native: false,
        source: BindingSource::Known,
        verified: true,
    }
}

impl Harness {
    pub async fn start(cfg: HarnessConfig) -> Self {
        let ledger = ChainLedger::new();
        let prices = PriceBook::new();

        let networks = [
            ("base", 8453u64, USDC_BASE),
            ("arbitrum", 42161, USDC_ARB),
            ("ethereum", 1, USDC_ETH),
        ];
        let handles = networks
            .iter()
            .map(|(key, chain_id, usdc)| ChainHandle {
                key: NetworkKey::new(*key),
                chain_id: *chain_id,
                rpc: Arc::new(StubRpc::new(*chain_id, Arc::clone(&ledger))) as Arc<dyn Rpc>,
                gas: GasOracle::new(20, 100_000_000),
                stable: stable_binding(key, *usdc),
                native_symbol: "ETH".into(),
                permit_contract: Some(Address::from(PERMIT)),
                receipt_wait: Duration::from_secs(2),
            })
            .collect();
        let chains = Arc::new(ChainSet::new(handles));

        let known: Vec<TokenBinding> = cfg
            .token_networks
            .iter()
            .map(|net| {
                let contract = if *net == "ethereum" { FOO_ETH } else { FOO_ARB };
                foo_binding(net, contract)
            })
            .collect();
        let resolver = TokenResolver::new(known, Vec::<Arc<dyn TokenSource>>::new());

        let wallets: Arc<dyn WalletProvider> = Arc::new(StubWalletProvider {
            ledger: Arc::clone(&ledger),
        });
        let aggregator = Arc::new(StubAggregator {
            ledger: Arc::clone(&ledger),
            prices: Arc::clone(&prices),
            min_sell: Mutex::new(None),
            quotes: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            data_seq: AtomicU64::new(1),
        });
        let routes: Arc<dyn RouteProvider> = aggregator.clone();
        let bus = RecordingBus::new();
        let directory = StubDirectory::with_active("user-1", &cfg.active_networks);

        let sizer = PositionSizer::new(SizingPolicy {
            default_percent: 20,
            max_percent: 80,
            min_usd: Decimal::new(1, 2),
            native_gas_reserve: U256::from(1_000_000_000_000_000u64),
        });
        let validator = WalletValidator::new(Arc::clone(&wallets));
        let executor = TradeExecutor::new(
            Arc::clone(&chains),
            Some(Arc::clone(&wallets)),
            Arc::clone(&routes),
            AllowanceManager::with_settle_delay(Duration::ZERO),
            50,
            false,
        );

        let scheduler = Arc::new(Scheduler::new());
        let pause = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (monitor_tx, monitor_rx) = mpsc::channel::<MonitorCommand>(64);
        let (emission_tx, emission_rx) = mpsc::channel::<Emission>(64);

        let orchestrator = Arc::new(Orchestrator::new(
            chains,
            directory,
            resolver,
            sizer,
            validator,
            executor,
            routes,
            bus.clone(),
            scheduler,
            monitor_tx,
            pause,
            OrchestratorPolicy {
                tp1_exit_percent: cfg.tp1_exit_percent,
                trailing_enabled: cfg.trailing_enabled,
                trailing_retracement_pct: cfg.trailing_retracement_pct,
            },
        ));

        let feed: Arc<dyn PriceFeed> = Arc::new(StubPriceFeed {
            book: Arc::clone(&prices),
        });
        tokio::spawn(run_monitor(monitor_rx, emission_tx, feed, cfg.monitor_tick));
        tokio::spawn(run_emission_consumer(Arc::clone(&orchestrator), emission_rx));
        run_workers(Arc::clone(&orchestrator), 4);

        Self {
            orchestrator,
            ledger,
            prices,
            bus,
            aggregator,
        }
    }

    pub fn fund_usdc(&self, network_usdc: [u8; 20], raw: u64) {
        self.ledger
            .set_balance(Address::from(network_usdc), wallet(), U256::from(raw));
    }

    pub fn buy_signal(&self, signal_id: &str) -> Signal {
        Signal {
            signal_id: signal_id.into(),
            caller_id: "user-1".into(),
            wallet_address: wallet(),
            side: Side::Buy,
            symbol: "FOO".into(),
            entry_price: Decimal::ONE,
            tp1: Decimal::new(105, 2),
            tp2: Decimal::new(110, 2),
            stop_loss: Decimal::new(95, 2),
            deadline: Utc::now() + chrono::Duration::hours(1),
        }
    }

    pub async fn submit(&self, signal: Signal) -> SubmitOutcome {
        self.orchestrator.submit_signal(signal).await
    }

    /// Poll until the trade satisfies `pred` or the timeout passes.
    pub async fn wait_for_trade<F>(&self, trade_id: uuid::Uuid, pred: F) -> Trade
    where
        F: Fn(&Trade) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(trade) = self.orchestrator.trade(trade_id).await {
                if pred(&trade) {
                    return trade;
                }
                if tokio::time::Instant::now() >= deadline {
                    panic!(
                        "timed out waiting for trade {trade_id}: state={} exits={}",
                        trade.state,
                        trade.exit_events.len()
                    );
                }
            } else if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for trade {trade_id}: not found");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn accepted_trade_id(outcome: &SubmitOutcome) -> uuid::Uuid {
    match outcome {
        SubmitOutcome::Accepted { trade_id, .. } => *trade_id,
        SubmitOutcome::Rejected { code, message, .. } => {
            panic!("expected acceptance, got {code:?}: {message}")
        }
    }
}

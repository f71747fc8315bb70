use alloy::primitives::{Address, U256};
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::executor::{ExecOutcome, TradeExecutor};
use super::scheduler::Scheduler;
use super::sizer::PositionSizer;
use super::validator::WalletValidator;
use crate::amount::{percent_of, raw_to_decimal};
use crate::chain::ChainSet;
use crate::clients::bus::{topics, EventBus};
use crate::clients::{RouteProvider, WalletDirectory};
use crate::errors::{ErrorCode, TradeError};
use crate::flow::Flow;
use crate::models::{
    BindingSource, ExecAction, ExecutionRequest, ExitEvent, ExitKind, NetworkKey, Side, Signal,
    TokenBinding, Trade, TradeState,
};
use crate::resolver::TokenResolver;
use crate::services::monitor::{Emission, MonitorCommand, MonitorParams};

/// Bounded signal-id dedup window.
const DEDUP_CAPACITY: usize = 10_000;

/// Poll interval while waiting for a concurrent submission of the same
/// signal id to classify.
const DEDUP_WAIT: Duration = Duration::from_millis(25);

/// Exit requests are retried this many times before giving up on the run.
const EXIT_RETRY_CAP: u32 = 5;

// ---------------------------------------------------------------------------
// Submission outcome & dedup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitOutcome {
    Accepted {
        signal_id: String,
        trade_id: Uuid,
    },
    Rejected {
        signal_id: String,
        code: ErrorCode,
        message: String,
        recommendation: &'static str,
        context: String,
    },
}

enum DedupEntry {
    InFlight,
    Done(SubmitOutcome),
}

enum BeginOutcome {
    /// This delivery owns the id and proceeds with admission.
    Owned,
    /// A prior delivery already classified the id.
    Duplicate(SubmitOutcome),
    /// A concurrent delivery of the same id is mid-admission.
    InFlight,
}

/// Bounded signal-id → classification map. First classification wins; the
/// oldest entries fall off once the capacity is reached.
struct DedupMap {
    entries: HashMap<String, DedupEntry>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupMap {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn classify(&mut self, signal_id: &str, outcome: SubmitOutcome) {
        if let Some(entry) = self.entries.get_mut(signal_id) {
            if matches!(entry, DedupEntry::InFlight) {
                *entry = DedupEntry::Done(outcome);
            }
        }
    }

    fn begin(&mut self, signal_id: &str) -> BeginOutcome {
        match self.entries.get(signal_id) {
            Some(DedupEntry::Done(outcome)) => return BeginOutcome::Duplicate(outcome.clone()),
            Some(DedupEntry::InFlight) => return BeginOutcome::InFlight,
            None => {}
        }
        self.entries
            .insert(signal_id.to_string(), DedupEntry::InFlight);
        self.order.push_back(signal_id.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        BeginOutcome::Owned
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Policy knobs fixed at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorPolicy {
    pub tp1_exit_percent: u32,
    pub trailing_enabled: bool,
    pub trailing_retracement_pct: Decimal,
}

/// Single source of truth for trade progression. Owns the trade map, admits
/// signals, consumes monitor emissions, and dispatches leased execution
/// requests to the executor.
pub struct Orchestrator {
    chains: Arc<ChainSet>,
    directory: Arc<dyn WalletDirectory>,
    resolver: TokenResolver,
    sizer: PositionSizer,
    validator: WalletValidator,
    executor: TradeExecutor,
    routes: Arc<dyn RouteProvider>,
    bus: Arc<dyn EventBus>,
    scheduler: Arc<Scheduler>,
    monitor_tx: mpsc::Sender<MonitorCommand>,
    trades: Mutex<HashMap<Uuid, Trade>>,
    dedup: Mutex<DedupMap>,
    pause: Arc<AtomicBool>,
    policy: OrchestratorPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chains: Arc<ChainSet>,
        directory: Arc<dyn WalletDirectory>,
        resolver: TokenResolver,
        sizer: PositionSizer,
        validator: WalletValidator,
        executor: TradeExecutor,
        routes: Arc<dyn RouteProvider>,
        bus: Arc<dyn EventBus>,
        scheduler: Arc<Scheduler>,
        monitor_tx: mpsc::Sender<MonitorCommand>,
        pause: Arc<AtomicBool>,
        policy: OrchestratorPolicy,
    ) -> Self {
        Self {
            chains,
            directory,
            resolver,
            sizer,
            validator,
            executor,
            routes,
            bus,
            scheduler,
            monitor_tx,
            trades: Mutex::new(HashMap::new()),
            dedup: Mutex::new(DedupMap::new(DEDUP_CAPACITY)),
            pause,
            policy,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn pause_flag(&self) -> &Arc<AtomicBool> {
        &self.pause
    }

    // -----------------------------------------------------------------------
    // Signal admission
    // -----------------------------------------------------------------------

    /// Admit a signal, idempotently on its signal id: a re-delivered signal
    /// replays the original classification without reprocessing.
    pub async fn submit_signal(&self, signal: Signal) -> SubmitOutcome {
        let flow = Flow::for_signal(&signal.signal_id);

        loop {
            let decision = self.dedup.lock().await.begin(&signal.signal_id);
            match decision {
                BeginOutcome::Owned => break,
                BeginOutcome::Duplicate(outcome) => {
                    counter!("signals_duplicate").increment(1);
                    tracing::info!(
                        flow = %flow.id(),
                        signal_id = %signal.signal_id,
                        "Duplicate signal — replaying prior classification"
                    );
                    return outcome;
                }
                BeginOutcome::InFlight => tokio::time::sleep(DEDUP_WAIT).await,
            }
        }

        let start = Instant::now();
        flow.start("orchestrator", "submit_signal");

        let outcome = match self.admit(&signal, &flow).await {
            Ok(trade_id) => {
                counter!("signals_accepted").increment(1);
                flow.complete("orchestrator", "submit_signal");
                self.bus
                    .publish(
                        topics::SIGNAL_ACCEPTED,
                        json!({
                            "signal_id": signal.signal_id,
                            "trade_id": trade_id,
                            "symbol": signal.symbol,
                            "side": signal.side,
                        }),
                    )
                    .await;
                SubmitOutcome::Accepted {
                    signal_id: signal.signal_id.clone(),
                    trade_id,
                }
            }
            Err(err) => {
                counter!("signals_rejected").increment(1);
                flow.fail("orchestrator", "submit_signal", &err.message);
                self.bus
                    .publish(
                        topics::SIGNAL_REJECTED,
                        json!({
                            "signal_id": signal.signal_id,
                            "code": err.code,
                            "message": err.message,
                        }),
                    )
                    .await;
                SubmitOutcome::Rejected {
                    signal_id: signal.signal_id.clone(),
                    code: err.code,
                    message: err.message.clone(),
                    recommendation: err.code.recommendation(),
                    context: err.summary(),
                }
            }
        };

        histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
        self.dedup
            .lock()
            .await
            .classify(&signal.signal_id, outcome.clone());
        outcome
    }

    async fn admit(&self, signal: &Signal, flow: &Flow) -> Result<Uuid, TradeError> {
        let tag = |e: TradeError| {
            e.with_signal(&signal.signal_id)
                .with_symbol(&signal.symbol)
                .with_wallet(signal.wallet_address)
        };

        // 1. Shape and invariants.
        signal
            .validate(Utc::now())
            .map_err(|e| tag(e.in_op("orchestrator", "validate_signal")))?;
        flow.step("orchestrator", "signal_validated");

        // 2. Directory record, then token/chain resolution ranked by the
        //    caller's active deployments.
        let record = self
            .directory
            .wallet_record(&signal.caller_id)
            .await
            .map_err(|e| {
                tag(TradeError::new(ErrorCode::RpcConnectionFailed, e.to_string())
                    .in_op("directory", "wallet_record"))
            })?
            .ok_or_else(|| {
                tag(TradeError::new(
                    ErrorCode::SafeNotDeployed,
                    format!("caller {} has no wallet directory record", signal.caller_id),
                ))
            })?;
        let active = record.active_networks();

        let bindings = self
            .resolver
            .resolve(&signal.symbol, &active)
            .await
            .map_err(|e| tag(e.in_op("resolver", "resolve")))?;
        flow.step("resolver", "token_resolved");

        let usable = bindings
            .iter()
            .find(|b| active.contains(&b.network) && self.chains.handle(&b.network).is_some());

        let token = match usable {
            Some(binding) => binding.clone(),
            None => {
                let err = if bindings.iter().any(|b| active.contains(&b.network)) {
                    tag(TradeError::new(
                        ErrorCode::UnsupportedNetwork,
                        format!(
                            "{} trades only on networks without a configured RPC",
                            signal.symbol
                        ),
                    ))
                } else {
                    let available: Vec<String> =
                        bindings.iter().map(|b| b.network.to_string()).collect();
                    tag(TradeError::new(
                        ErrorCode::SafeNotDeployed,
                        format!(
                            "{} is available on {} but the caller has no active wallet there",
                            signal.symbol,
                            available.join(", ")
                        ),
                    )
                    .with_network(&bindings[0].network))
                };
                self.record_admission_failure(signal, &bindings[0].network, err.code)
                    .await;
                return Err(err);
            }
        };

        let chain = self
            .chains
            .handle(&token.network)
            .expect("usable binding has a handle");

        let (sell, buy) = match signal.side {
            Side::Buy => (chain.stable.clone(), token.clone()),
            Side::Sell => (token.clone(), chain.stable.clone()),
        };
        let base_is_stable = matches!(signal.side, Side::Buy);

        // 3–4. Wallet validation, then sizing. Failures past this point have
        //      enough context to leave a failed Trade behind.
        let admitted: Result<_, TradeError> = async {
            self.validator
                .validate(chain, &record, signal.wallet_address, sell.is_native)
                .await?;
            flow.step("validator", "wallet_validated");

            let advisory = match self.routes.min_sell_amount(&sell.symbol, chain.chain_id).await {
                Ok(min) => min,
                Err(e) => {
                    tracing::warn!(error = %e, "Minimum-amount advisory unavailable");
                    None
                }
            };

            let plan = self
                .sizer
                .size(
                    chain,
                    signal.wallet_address,
                    &sell,
                    &buy,
                    None,
                    base_is_stable,
                    advisory,
                )
                .await?;
            flow.step("sizer", "position_planned");
            Ok(plan)
        }
        .await;

        let plan = match admitted {
            Ok(plan) => plan,
            Err(e) => {
                let err = tag(e).with_network(&token.network);
                self.record_admission_failure(signal, &token.network, err.code)
                    .await;
                return Err(err);
            }
        };

        // 5. Mint the trade and enqueue the entry.
        let trade_id = Uuid::new_v4();
        let trade = Trade::from_signal(trade_id, signal, chain.key.clone(), sell, buy);

        tracing::info!(
            flow = %flow.id(),
            trade_id = %trade_id,
            signal_id = %signal.signal_id,
            network = %trade.network,
            sell_amount = %plan.sell_amount_raw,
            rationale = %plan.rationale,
            "Trade admitted"
        );

        {
            let mut trades = self.trades.lock().await;
            trades.insert(trade_id, trade);
            gauge!("open_trades").set(count_open(&trades) as f64);
        }

        self.scheduler
            .enqueue(ExecutionRequest::enter(trade_id, plan.sell_amount_raw))
            .await;

        Ok(trade_id)
    }

    /// Leave a failed Trade behind for an admission failure that happened
    /// after a network was chosen, so inspection surfaces the classification.
    async fn record_admission_failure(
        &self,
        signal: &Signal,
        network: &NetworkKey,
        code: ErrorCode,
    ) {
        // Placeholder binding; the contract was never resolved for this side.
        let token = TokenBinding {
            symbol: signal.symbol.to_uppercase(),
            network: network.clone(),
            contract: Address::ZERO,
            decimals: 18,
            is_native: false,
            source: BindingSource::Registry,
            verified: false,
        };
        let (sell, buy) = match (self.chains.handle(network), signal.side) {
            (Some(chain), Side::Buy) => (chain.stable.clone(), token),
            (Some(chain), Side::Sell) => (token, chain.stable.clone()),
            (None, _) => (token.clone(), token),
        };

        let trade_id = Uuid::new_v4();
        let mut trade = Trade::from_signal(trade_id, signal, network.clone(), sell, buy);
        trade.state = TradeState::Failed;
        trade.failure_code = Some(code);

        counter!("trades_failed").increment(1);
        self.bus
            .publish(
                topics::TRADE_FAILED,
                json!({
                    "trade_id": trade_id,
                    "signal_id": signal.signal_id,
                    "code": code,
                }),
            )
            .await;

        let mut trades = self.trades.lock().await;
        trades.insert(trade_id, trade);
    }

    // -----------------------------------------------------------------------
    // Dispatch (called by scheduler workers with the trade lease held)
    // -----------------------------------------------------------------------

    pub async fn dispatch(&self, req: ExecutionRequest) {
        // Pause defers queue draining without rejecting anything.
        while self.pause.load(Ordering::Relaxed) && !self.scheduler.is_shutting_down() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        let Some(trade) = self.get_trade(req.trade_id).await else {
            tracing::warn!(trade_id = %req.trade_id, "Unknown trade — request dropped");
            return;
        };

        // Validate the request is legal in the current state; invalid
        // transitions are dropped, never executed.
        match req.action {
            ExecAction::Enter => {
                if trade.state != TradeState::Pending {
                    tracing::warn!(
                        trade_id = %trade.trade_id,
                        state = %trade.state,
                        "Enter request in illegal state — dropped"
                    );
                    return;
                }
                self.transition(req.trade_id, TradeState::Entering).await;
            }
            ExecAction::Exit { .. } => {
                if trade.state.is_terminal() {
                    tracing::info!(
                        trade_id = %trade.trade_id,
                        state = %trade.state,
                        "Exit requested on terminal trade — no-op"
                    );
                    return;
                }
                if !matches!(
                    trade.state,
                    TradeState::Entered | TradeState::PartiallyExited
                ) {
                    tracing::warn!(
                        trade_id = %trade.trade_id,
                        state = %trade.state,
                        "Exit request before entry completed — dropped"
                    );
                    return;
                }
            }
        }

        let trade = self.get_trade(req.trade_id).await.expect("trade exists");
        match self.executor.execute(&trade, &req).await {
            Ok(outcome) => self.apply_success(trade, req, outcome).await,
            Err(err) => self.apply_failure(trade, req, err).await,
        }
    }

    async fn apply_success(&self, trade: Trade, req: ExecutionRequest, outcome: ExecOutcome) {
        match req.action {
            ExecAction::Enter => self.apply_entry(trade, req, outcome).await,
            ExecAction::Exit { kind } => self.apply_exit(trade, req, kind, outcome).await,
        }
    }

    async fn apply_entry(&self, trade: Trade, req: ExecutionRequest, outcome: ExecOutcome) {
        let spent = raw_to_decimal(req.amount_raw, trade.sell_binding.decimals);
        let got = raw_to_decimal(outcome.filled_raw, trade.buy_binding.decimals);
        let observed = match (spent, got) {
            (Some(s), Some(g)) if !g.is_zero() && !s.is_zero() => match trade.side {
                Side::Buy => Some(s / g),
                Side::Sell => Some(g / s),
            },
            _ => None,
        };

        let updated = self
            .update_trade(trade.trade_id, |t| {
                t.state = TradeState::Entered;
                t.entry_tx_hash = outcome.tx_hash;
                t.entry_spent_raw = Some(req.amount_raw);
                t.entry_filled_raw = Some(outcome.filled_raw);
                t.entry_price_observed = observed;
            })
            .await;
        let Some(updated) = updated else { return };

        self.validator
            .invalidate(&updated.network, updated.wallet_address);
        counter!("trades_entered").increment(1);

        tracing::info!(
            trade_id = %updated.trade_id,
            tx_hash = ?updated.entry_tx_hash,
            filled = %outcome.filled_raw,
            entry_price = ?observed,
            "Trade entered"
        );

        self.bus
            .publish(
                topics::TRADE_ENTERED,
                json!({
                    "trade_id": updated.trade_id,
                    "signal_id": updated.signal_id,
                    "network": updated.network,
                    "symbol": updated.monitored_symbol(),
                    "tx_hash": updated.entry_tx_hash.map(|h| format!("{h:#x}")),
                }),
            )
            .await;

        let params = MonitorParams {
            trade_id: updated.trade_id,
            symbol: updated.monitored_symbol().to_string(),
            side: updated.side,
            entry_price: updated
                .entry_price_observed
                .unwrap_or(updated.entry_price_expected),
            tp1: updated.tp1,
            tp2: updated.tp2,
            stop_loss: updated.stop_loss,
            deadline: updated.deadline,
            trailing_enabled: self.policy.trailing_enabled,
            trailing_retracement_pct: self.policy.trailing_retracement_pct,
        };
        if self
            .monitor_tx
            .send(MonitorCommand::Attach(params))
            .await
            .is_err()
        {
            tracing::error!(trade_id = %updated.trade_id, "Monitor channel closed — trade unmonitored");
        }
    }

    async fn apply_exit(
        &self,
        trade: Trade,
        req: ExecutionRequest,
        kind: ExitKind,
        outcome: ExecOutcome,
    ) {
        let entry_filled = trade.entry_filled_raw.unwrap_or_default();

        // Percentage of the original fill, in basis points, capped so the
        // running total never exceeds 100.
        let pct_bps: i64 = if entry_filled.is_zero() {
            10_000
        } else {
            (req.amount_raw.saturating_mul(U256::from(10_000u64)) / entry_filled).to::<u64>()
                as i64
        };
        let already = trade.exited_percent();
        let pct = Decimal::new(pct_bps, 2).min(Decimal::ONE_HUNDRED - already);

        let price = req
            .trigger_price
            .unwrap_or(trade.entry_price_expected);

        // PnL in base (stable) units, from what is observable on-chain.
        let pnl_base = match trade.side {
            Side::Buy => {
                let received =
                    raw_to_decimal(outcome.filled_raw, trade.sell_binding.decimals)
                        .unwrap_or_default();
                let cost = trade
                    .entry_spent_raw
                    .and_then(|raw| raw_to_decimal(raw, trade.sell_binding.decimals))
                    .unwrap_or_default();
                received - cost * pct / Decimal::ONE_HUNDRED
            }
            Side::Sell => {
                let entry_received = trade
                    .entry_filled_raw
                    .and_then(|raw| raw_to_decimal(raw, trade.buy_binding.decimals))
                    .unwrap_or_default();
                let spent = raw_to_decimal(req.amount_raw, trade.buy_binding.decimals)
                    .unwrap_or_default();
                entry_received * pct / Decimal::ONE_HUNDRED - spent
            }
        };

        let event = ExitEvent {
            kind,
            price,
            amount_raw: req.amount_raw,
            percentage_of_position: pct,
            tx_hash: outcome.tx_hash,
            at: Utc::now(),
            pnl_base,
        };

        let updated = self
            .update_trade(trade.trade_id, |t| {
                t.exit_events.push(event.clone());
                let total = t.exited_percent();
                if total >= Decimal::ONE_HUNDRED || t.remaining_raw().is_zero() {
                    t.state = kind.terminal_state();
                } else {
                    t.state = TradeState::PartiallyExited;
                }
            })
            .await;
        let Some(updated) = updated else { return };

        self.validator
            .invalidate(&updated.network, updated.wallet_address);

        tracing::info!(
            trade_id = %updated.trade_id,
            kind = %kind,
            pct = %pct,
            state = %updated.state,
            pnl_base = %pnl_base,
            "Exit executed"
        );

        self.bus
            .publish(
                topics::TRADE_EXITED,
                json!({
                    "trade_id": updated.trade_id,
                    "signal_id": updated.signal_id,
                    "kind": kind,
                    "price": price,
                    "percentage": pct,
                    "pnl_base": pnl_base,
                    "state": updated.state,
                }),
            )
            .await;

        if updated.state.is_terminal() {
            counter!("trades_exited").increment(1);
            self.finalize(updated.trade_id).await;
        }
    }

    async fn apply_failure(&self, trade: Trade, req: ExecutionRequest, err: TradeError) {
        match req.action {
            ExecAction::Enter => {
                tracing::error!(
                    trade_id = %trade.trade_id,
                    code = ?err.code,
                    error = %err.message,
                    "Entry failed"
                );
                counter!("trades_failed").increment(1);
                self.update_trade(trade.trade_id, |t| {
                    t.state = TradeState::Failed;
                    t.failure_code = Some(err.code);
                })
                .await;
                self.bus
                    .publish(
                        topics::TRADE_FAILED,
                        json!({
                            "trade_id": trade.trade_id,
                            "signal_id": trade.signal_id,
                            "code": err.code,
                            "message": err.message,
                        }),
                    )
                    .await;
                self.finalize(trade.trade_id).await;
            }
            ExecAction::Exit { kind } => {
                let attempt = req.attempt + 1;
                if attempt <= EXIT_RETRY_CAP {
                    // Stop-loss and deadline exits bypass backoff on their
                    // first retry.
                    let urgent = matches!(kind, ExitKind::StopLoss | ExitKind::Deadline);
                    let delay = if urgent && attempt == 1 {
                        Duration::ZERO
                    } else {
                        crate::retry::RetryPolicy::exit_requeue().delay_for(attempt)
                    };

                    tracing::warn!(
                        trade_id = %trade.trade_id,
                        kind = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err.message,
                        "Exit failed — re-queueing"
                    );

                    let mut retry = req.clone();
                    retry.attempt = attempt;
                    let scheduler = Arc::clone(&self.scheduler);
                    tokio::spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        scheduler.enqueue(retry).await;
                    });
                } else {
                    // Give up on this run; the monitor re-arms and will
                    // re-emit on the next threshold crossing.
                    tracing::error!(
                        trade_id = %trade.trade_id,
                        kind = %kind,
                        error = %err.message,
                        "Exit retries exhausted — monitor re-armed"
                    );
                    let params = MonitorParams {
                        trade_id: trade.trade_id,
                        symbol: trade.monitored_symbol().to_string(),
                        side: trade.side,
                        entry_price: trade
                            .entry_price_observed
                            .unwrap_or(trade.entry_price_expected),
                        tp1: trade.tp1,
                        tp2: trade.tp2,
                        stop_loss: trade.stop_loss,
                        deadline: trade.deadline,
                        trailing_enabled: self.policy.trailing_enabled,
                        trailing_retracement_pct: self.policy.trailing_retracement_pct,
                    };
                    let _ = self.monitor_tx.send(MonitorCommand::Attach(params)).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Monitor emissions
    // -----------------------------------------------------------------------

    pub async fn handle_emission(&self, emission: Emission) {
        let Some(trade) = self.get_trade(emission.trade_id).await else {
            return;
        };
        if trade.state.is_terminal() {
            return;
        }

        self.bus
            .publish(
                topics::MONITOR_EMISSION,
                json!({
                    "trade_id": emission.trade_id,
                    "kind": emission.kind,
                    "price": emission.price,
                }),
            )
            .await;

        if emission.kind == ExitKind::Tp2 {
            // TP2 arms the trailing stop; the position itself exits on the
            // trailing retracement (or fully here when trailing is off).
            self.update_trade(emission.trade_id, |t| {
                t.trailing_high = Some(emission.price);
            })
            .await;
            if self.policy.trailing_enabled {
                return;
            }
        }

        let remaining = trade.remaining_raw();
        if remaining.is_zero() {
            return;
        }

        let amount = match emission.kind {
            ExitKind::Tp1 => percent_of(remaining, self.policy.tp1_exit_percent.clamp(1, 100)),
            _ => remaining,
        };
        if amount.is_zero() {
            return;
        }

        self.scheduler
            .enqueue(ExecutionRequest::exit(
                emission.trade_id,
                emission.kind,
                amount,
                Some(emission.price),
                format!("{} at {}", emission.kind, emission.price),
            ))
            .await;
    }

    /// Manual full exit, queued at high priority. Terminal trades are a
    /// no-op that reports the terminal state.
    pub async fn request_manual_exit(&self, trade_id: Uuid) -> Option<TradeState> {
        let trade = self.get_trade(trade_id).await?;
        if trade.state.is_terminal() {
            return Some(trade.state);
        }
        if !matches!(
            trade.state,
            TradeState::Entered | TradeState::PartiallyExited
        ) {
            tracing::warn!(trade_id = %trade_id, state = %trade.state, "Manual exit before entry — ignored");
            return Some(trade.state);
        }

        let remaining = trade.remaining_raw();
        if remaining.is_zero() {
            return Some(trade.state);
        }

        self.scheduler
            .enqueue(ExecutionRequest::exit(
                trade_id,
                ExitKind::Manual,
                remaining,
                None,
                "manual exit requested".into(),
            ))
            .await;
        Some(trade.state)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop accepting work, drop pending requests, and mark their trades
    /// failed for later reconciliation.
    pub async fn shutdown(&self) {
        self.scheduler.begin_shutdown();
        let dropped = self.scheduler.drain_pending().await;
        for req in dropped {
            tracing::warn!(
                trade_id = %req.trade_id,
                action = %req.action,
                "Pending request dropped at shutdown"
            );
            self.update_trade(req.trade_id, |t| {
                if !t.state.is_terminal() {
                    t.state = TradeState::Failed;
                    t.failure_code = Some(ErrorCode::SystemShutdown);
                }
            })
            .await;
        }
    }

    // -----------------------------------------------------------------------
    // Trade access
    // -----------------------------------------------------------------------

    pub async fn trade(&self, trade_id: Uuid) -> Option<Trade> {
        self.get_trade(trade_id).await
    }

    pub async fn trades_snapshot(&self) -> Vec<Trade> {
        let trades = self.trades.lock().await;
        let mut all: Vec<Trade> = trades.values().cloned().collect();
        all.sort_by_key(|t| t.updated_at);
        all
    }

    async fn get_trade(&self, trade_id: Uuid) -> Option<Trade> {
        self.trades.lock().await.get(&trade_id).cloned()
    }

    /// Mutate a trade under the store lock and return the updated copy.
    async fn update_trade<F>(&self, trade_id: Uuid, f: F) -> Option<Trade>
    where
        F: FnOnce(&mut Trade),
    {
        let mut trades = self.trades.lock().await;
        let trade = trades.get_mut(&trade_id)?;
        f(trade);
        trade.updated_at = Utc::now();
        let copy = trade.clone();
        gauge!("open_trades").set(count_open(&trades) as f64);
        Some(copy)
    }

    /// Apply a state transition, enforcing the legal state machine.
    async fn transition(&self, trade_id: Uuid, next: TradeState) -> bool {
        let mut trades = self.trades.lock().await;
        let Some(trade) = trades.get_mut(&trade_id) else {
            return false;
        };
        if !trade.state.can_transition_to(next) {
            tracing::warn!(
                trade_id = %trade_id,
                from = %trade.state,
                to = %next,
                "Illegal state transition — dropped"
            );
            return false;
        }
        trade.state = next;
        trade.updated_at = Utc::now();
        true
    }

    /// Terminal-state cleanup: cancel queued work and detach the monitor.
    async fn finalize(&self, trade_id: Uuid) {
        self.scheduler.cancel_trade(trade_id).await;
        let _ = self.monitor_tx.send(MonitorCommand::Detach(trade_id)).await;
    }
}

fn count_open(trades: &HashMap<Uuid, Trade>) -> usize {
    trades.values().filter(|t| !t.state.is_terminal()).count()
}

/// Pump monitor emissions into the orchestrator.
pub async fn run_emission_consumer(
    orchestrator: Arc<Orchestrator>,
    mut emissions: mpsc::Receiver<Emission>,
) {
    while let Some(emission) = emissions.recv().await {
        orchestrator.handle_emission(emission).await;
    }
    tracing::warn!("Emission channel closed");
}

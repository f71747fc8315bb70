use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use crate::clients::PriceFeed;
use crate::models::{ExitKind, Side};

/// Parameters fixed at attach time.
#[derive(Debug, Clone)]
pub struct MonitorParams {
    pub trade_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub stop_loss: Decimal,
    pub deadline: DateTime<Utc>,
    pub trailing_enabled: bool,
    pub trailing_retracement_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Armed,
    Tp1Hit,
    Tp2Hit,
}

struct Watch {
    params: MonitorParams,
    state: WatchState,
    /// Price extremum since entering `Tp2Hit` (high for buys, low for sells).
    trailing: Option<Decimal>,
}

#[derive(Debug)]
pub enum MonitorCommand {
    Attach(MonitorParams),
    Detach(Uuid),
}

/// One exit condition firing for one trade.
#[derive(Debug, Clone)]
pub struct Emission {
    pub trade_id: Uuid,
    pub kind: ExitKind,
    pub price: Decimal,
}

/// Run the position monitor loop: poll prices at a fixed cadence, drive each
/// trade's threshold state machine, and emit at most one exit event per trade
/// per tick onto the back-pressured scheduler channel.
///
/// The monitor never executes trades.
pub async fn run_monitor(
    mut commands: mpsc::Receiver<MonitorCommand>,
    emissions: mpsc::Sender<Emission>,
    feed: Arc<dyn PriceFeed>,
    tick: Duration,
) {
    let mut watches: HashMap<Uuid, Watch> = HashMap::new();
    let mut ticker = interval(tick);
    // The first interval tick completes immediately; skip it so attach
    // commands sent at startup are seen before the first evaluation.
    ticker.tick().await;

    tracing::info!(tick_secs = tick.as_secs(), "Position monitor started");

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(MonitorCommand::Attach(params)) => {
                    tracing::info!(
                        trade_id = %params.trade_id,
                        symbol = %params.symbol,
                        tp1 = %params.tp1,
                        tp2 = %params.tp2,
                        stop_loss = %params.stop_loss,
                        "Monitor attached"
                    );
                    watches.insert(params.trade_id, Watch {
                        params,
                        state: WatchState::Armed,
                        trailing: None,
                    });
                    gauge!("monitored_trades").set(watches.len() as f64);
                }
                Some(MonitorCommand::Detach(trade_id)) => {
                    if watches.remove(&trade_id).is_some() {
                        tracing::debug!(trade_id = %trade_id, "Monitor detached");
                        gauge!("monitored_trades").set(watches.len() as f64);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                run_tick(&mut watches, feed.as_ref(), &emissions).await;
                gauge!("monitored_trades").set(watches.len() as f64);
            }
        }
    }

    tracing::warn!("Position monitor command channel closed — stopping");
}

async fn run_tick(
    watches: &mut HashMap<Uuid, Watch>,
    feed: &dyn PriceFeed,
    emissions: &mpsc::Sender<Emission>,
) {
    if watches.is_empty() {
        return;
    }

    // One batched fetch per tick across all monitored symbols.
    let mut symbols: Vec<String> = watches.values().map(|w| w.params.symbol.clone()).collect();
    symbols.sort();
    symbols.dedup();

    let prices = match feed.prices(&symbols).await {
        Ok(p) => p,
        Err(e) => {
            // No state changes on a failed tick.
            tracing::warn!(error = %e, "Price fetch failed — skipping tick");
            return;
        }
    };

    let now = Utc::now();
    let mut detached = Vec::new();

    for (trade_id, watch) in watches.iter_mut() {
        let Some(point) = prices.get(&watch.params.symbol) else {
            tracing::debug!(
                trade_id = %trade_id,
                symbol = %watch.params.symbol,
                "No price this tick"
            );
            continue;
        };

        if let Some(kind) = evaluate(watch, point.price_usd, now) {
            counter!("monitor_emissions").increment(1);
            tracing::info!(
                trade_id = %trade_id,
                kind = %kind,
                price = %point.price_usd,
                "Exit condition fired"
            );

            if emissions
                .send(Emission {
                    trade_id: *trade_id,
                    kind,
                    price: point.price_usd,
                })
                .await
                .is_err()
            {
                tracing::error!("Emission channel closed — monitor cannot deliver exits");
                return;
            }

            // Terminal emissions detach before any further evaluation.
            if matches!(
                kind,
                ExitKind::Deadline | ExitKind::StopLoss | ExitKind::TrailingStop
            ) {
                detached.push(*trade_id);
            }
        }
    }

    for trade_id in detached {
        watches.remove(&trade_id);
    }
}

/// Evaluate one watch against one price. Mutates the watch state machine and
/// returns at most one emission, most-urgent-first:
/// DEADLINE > STOP_LOSS > TRAILING_STOP > TP2 > TP1.
fn evaluate(watch: &mut Watch, price: Decimal, now: DateTime<Utc>) -> Option<ExitKind> {
    let p = &watch.params;
    let hundred = Decimal::ONE_HUNDRED;

    if now >= p.deadline {
        return Some(ExitKind::Deadline);
    }

    match p.side {
        Side::Buy => {
            if price <= p.stop_loss {
                return Some(ExitKind::StopLoss);
            }

            if watch.state == WatchState::Tp2Hit && p.trailing_enabled {
                let high = watch.trailing.map_or(price, |h| h.max(price));
                watch.trailing = Some(high);
                let floor = high * (Decimal::ONE - p.trailing_retracement_pct / hundred);
                if price <= floor {
                    return Some(ExitKind::TrailingStop);
                }
            }

            if watch.state == WatchState::Tp1Hit && price >= p.tp2 {
                watch.state = WatchState::Tp2Hit;
                if p.trailing_enabled {
                    watch.trailing = Some(price);
                }
                return Some(ExitKind::Tp2);
            }

            if watch.state == WatchState::Armed && price >= p.tp1 {
                watch.state = WatchState::Tp1Hit;
                return Some(ExitKind::Tp1);
            }
        }
        Side::Sell => {
            if price >= p.stop_loss {
                return Some(ExitKind::StopLoss);
            }

            if watch.state == WatchState::Tp2Hit && p.trailing_enabled {
                let low = watch.trailing.map_or(price, |l| l.min(price));
                watch.trailing = Some(low);
                let ceiling = low * (Decimal::ONE + p.trailing_retracement_pct / hundred);
                if price >= ceiling {
                    return Some(ExitKind::TrailingStop);
                }
            }

            if watch.state == WatchState::Tp1Hit && price <= p.tp2 {
                watch.state = WatchState::Tp2Hit;
                if p.trailing_enabled {
                    watch.trailing = Some(price);
                }
                return Some(ExitKind::Tp2);
            }

            if watch.state == WatchState::Armed && price <= p.tp1 {
                watch.state = WatchState::Tp1Hit;
                return Some(ExitKind::Tp1);
            }
        }
    }

    None
}

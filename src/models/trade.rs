use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{NetworkKey, Side, Signal, TokenBinding};
use crate::errors::ErrorCode;

// ---------------------------------------------------------------------------
// TradeState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Pending,
    Entering,
    Entered,
    PartiallyExited,
    Exited,
    StoppedOut,
    Expired,
    Failed,
}

impl TradeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeState::Exited | TradeState::StoppedOut | TradeState::Expired | TradeState::Failed
        )
    }

    /// Legal transitions of the trade state machine. Terminal states are
    /// absorbing.
    pub fn can_transition_to(self, next: TradeState) -> bool {
        use TradeState::*;
        match (self, next) {
            (Pending, Entering) | (Pending, Failed) => true,
            (Entering, Entered) | (Entering, Failed) => true,
            (Entered, PartiallyExited)
            | (Entered, Exited)
            | (Entered, StoppedOut)
            | (Entered, Expired)
            | (Entered, Failed) => true,
            (PartiallyExited, PartiallyExited)
            | (PartiallyExited, Exited)
            | (PartiallyExited, StoppedOut)
            | (PartiallyExited, Expired)
            | (PartiallyExited, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeState::Pending => "pending",
            TradeState::Entering => "entering",
            TradeState::Entered => "entered",
            TradeState::PartiallyExited => "partially_exited",
            TradeState::Exited => "exited",
            TradeState::StoppedOut => "stopped_out",
            TradeState::Expired => "expired",
            TradeState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// ExitKind / ExitEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitKind {
    Tp1,
    Tp2,
    StopLoss,
    TrailingStop,
    Deadline,
    Manual,
}

impl ExitKind {
    /// Tick tie-break precedence; lower wins (most urgent first).
    pub fn urgency(self) -> u8 {
        match self {
            ExitKind::Deadline => 0,
            ExitKind::StopLoss => 1,
            ExitKind::TrailingStop => 2,
            ExitKind::Tp2 => 3,
            ExitKind::Tp1 => 4,
            ExitKind::Manual => 5,
        }
    }

    /// Terminal state the trade lands in when this kind closes the full
    /// remaining position.
    pub fn terminal_state(self) -> TradeState {
        match self {
            ExitKind::StopLoss => TradeState::StoppedOut,
            ExitKind::Deadline => TradeState::Expired,
            _ => TradeState::Exited,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitKind::Tp1 => "TP1",
            ExitKind::Tp2 => "TP2",
            ExitKind::StopLoss => "STOP_LOSS",
            ExitKind::TrailingStop => "TRAILING_STOP",
            ExitKind::Deadline => "DEADLINE",
            ExitKind::Manual => "MANUAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitEvent {
    pub kind: ExitKind,
    pub price: Decimal,
    pub amount_raw: U256,
    pub percentage_of_position: Decimal,
    pub tx_hash: Option<B256>,
    pub at: DateTime<Utc>,
    pub pnl_base: Decimal,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// The central mutable record of the pipeline. Owned exclusively by the
/// orchestrator; everything else sees it through the trade store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub signal_id: String,
    pub caller_id: String,
    pub wallet_address: Address,
    pub network: NetworkKey,
    pub sell_binding: TokenBinding,
    pub buy_binding: TokenBinding,
    pub side: Side,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub stop_loss: Decimal,
    pub deadline: DateTime<Utc>,
    pub entry_price_expected: Decimal,

    pub state: TradeState,
    pub failure_code: Option<ErrorCode>,
    pub entry_tx_hash: Option<B256>,
    /// Sell-side amount spent on entry, in the sell token's smallest unit.
    pub entry_spent_raw: Option<U256>,
    pub entry_filled_raw: Option<U256>,
    pub entry_price_observed: Option<Decimal>,
    pub trailing_high: Option<Decimal>,
    pub exit_events: Vec<ExitEvent>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn from_signal(
        trade_id: Uuid,
        signal: &Signal,
        network: NetworkKey,
        sell_binding: TokenBinding,
        buy_binding: TokenBinding,
    ) -> Self {
        Self {
            trade_id,
            signal_id: signal.signal_id.clone(),
            caller_id: signal.caller_id.clone(),
            wallet_address: signal.wallet_address,
            network,
            sell_binding,
            buy_binding,
            side: signal.side,
            tp1: signal.tp1,
            tp2: signal.tp2,
            stop_loss: signal.stop_loss,
            deadline: signal.deadline,
            entry_price_expected: signal.entry_price,
            state: TradeState::Pending,
            failure_code: None,
            entry_tx_hash: None,
            entry_spent_raw: None,
            entry_filled_raw: None,
            entry_price_observed: None,
            trailing_high: None,
            exit_events: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Sum of percentage_of_position across recorded exits.
    pub fn exited_percent(&self) -> Decimal {
        self.exit_events
            .iter()
            .map(|e| e.percentage_of_position)
            .sum()
    }

    /// The symbol whose price drives the monitor: the token bought on a buy,
    /// the token sold on a sell.
    pub fn monitored_symbol(&self) -> &str {
        match self.side {
            Side::Buy => &self.buy_binding.symbol,
            Side::Sell => &self.sell_binding.symbol,
        }
    }

    /// Filled quantity still held, in the buy token's smallest unit.
    pub fn remaining_raw(&self) -> U256 {
        let filled = self.entry_filled_raw.unwrap_or(U256::ZERO);
        let exited: U256 = self
            .exit_events
            .iter()
            .fold(U256::ZERO, |acc, e| acc.saturating_add(e.amount_raw));
        filled.saturating_sub(exited)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade {} {} {} on {} [{}]",
            self.trade_id, self.side, self.buy_binding.symbol, self.network, self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_absorbing() {
        use TradeState::*;
        for terminal in [Exited, StoppedOut, Expired, Failed] {
            for next in [
                Pending,
                Entering,
                Entered,
                PartiallyExited,
                Exited,
                StoppedOut,
                Expired,
                Failed,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be illegal"
                );
            }
        }
    }

    #[test]
    fn test_no_skip_of_entering() {
        assert!(!TradeState::Pending.can_transition_to(TradeState::Entered));
        assert!(TradeState::Pending.can_transition_to(TradeState::Entering));
        assert!(TradeState::Entering.can_transition_to(TradeState::Entered));
    }

    #[test]
    fn test_exit_urgency_precedence() {
        assert!(ExitKind::Deadline.urgency() < ExitKind::StopLoss.urgency());
        assert!(ExitKind::StopLoss.urgency() < ExitKind::TrailingStop.urgency());
        assert!(ExitKind::TrailingStop.urgency() < ExitKind::Tp2.urgency());
        assert!(ExitKind::Tp2.urgency() < ExitKind::Tp1.urgency());
    }

    #[test]
    fn test_terminal_state_per_kind() {
        assert_eq!(ExitKind::StopLoss.terminal_state(), TradeState::StoppedOut);
        assert_eq!(ExitKind::Deadline.terminal_state(), TradeState::Expired);
        assert_eq!(ExitKind::Tp1.terminal_state(), TradeState::Exited);
        assert_eq!(ExitKind::TrailingStop.terminal_state(), TradeState::Exited);
    }
}

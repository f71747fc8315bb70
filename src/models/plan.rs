use alloy::primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{ExitKind, NetworkKey, TokenBinding};

// ---------------------------------------------------------------------------
// PositionPlan
// ---------------------------------------------------------------------------

/// Concrete sizing decision produced by the position sizer. Single-use: it
/// must not outlive the work unit that produced it.
#[derive(Debug, Clone)]
pub struct PositionPlan {
    pub wallet_address: Address,
    pub network: NetworkKey,
    pub sell_binding: TokenBinding,
    pub buy_binding: TokenBinding,
    pub sell_amount_raw: U256,
    /// Percentage asked for by the signal/config, in whole percent.
    pub percentage_requested: u32,
    /// Percentage actually applied after policy caps.
    pub percentage_effective: u32,
    pub min_amount_raw: U256,
    pub gas_reserve_raw: U256,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// SwapQuote
// ---------------------------------------------------------------------------

/// Executable swap call from the aggregator. Opaque to the core apart from
/// `spender`. Single-use.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_hint: Option<u64>,
    pub spender: Address,
    pub buy_amount_hint_raw: U256,
}

// ---------------------------------------------------------------------------
// ExecutionRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecAction {
    Enter,
    Exit { kind: ExitKind },
}

impl fmt::Display for ExecAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecAction::Enter => write!(f, "enter"),
            ExecAction::Exit { kind } => write!(f, "exit/{kind}"),
        }
    }
}

/// The scheduler's work unit.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub trade_id: Uuid,
    pub action: ExecAction,
    pub amount_raw: U256,
    pub reason: String,
    pub priority: Priority,
    /// Price observed at the moment the exit was triggered, when known.
    pub trigger_price: Option<Decimal>,
    /// Retry counter for failed exit requests.
    pub attempt: u32,
}

impl ExecutionRequest {
    pub fn enter(trade_id: Uuid, amount_raw: U256) -> Self {
        Self {
            trade_id,
            action: ExecAction::Enter,
            amount_raw,
            reason: "signal admitted".into(),
            priority: Priority::Medium,
            trigger_price: None,
            attempt: 0,
        }
    }

    pub fn exit(
        trade_id: Uuid,
        kind: ExitKind,
        amount_raw: U256,
        trigger_price: Option<Decimal>,
        reason: String,
    ) -> Self {
        // Stop-loss and deadline exits jump the queue.
        let priority = match kind {
            ExitKind::StopLoss | ExitKind::Deadline | ExitKind::Manual => Priority::High,
            _ => Priority::Medium,
        };
        Self {
            trade_id,
            action: ExecAction::Exit { kind },
            amount_raw,
            reason,
            priority,
            trigger_price,
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_exit_priority_by_kind() {
        let id = Uuid::new_v4();
        let sl = ExecutionRequest::exit(id, ExitKind::StopLoss, U256::from(1), None, "sl".into());
        assert_eq!(sl.priority, Priority::High);
        let dl = ExecutionRequest::exit(id, ExitKind::Deadline, U256::from(1), None, "dl".into());
        assert_eq!(dl.priority, Priority::High);
        let tp = ExecutionRequest::exit(id, ExitKind::Tp1, U256::from(1), None, "tp1".into());
        assert_eq!(tp.priority, Priority::Medium);
    }
}

pub mod allowance;
pub mod executor;
pub mod orchestrator;
pub mod scheduler;
pub mod sizer;
pub mod validator;

pub use allowance::AllowanceManager;
pub use executor::{ExecOutcome, TradeExecutor};
pub use orchestrator::{run_emission_consumer, Orchestrator, OrchestratorPolicy, SubmitOutcome};
pub use scheduler::{run_workers, Scheduler};
pub use sizer::{PositionSizer, SizingPolicy};
pub use validator::{ValidatedWallet, WalletValidator};

use crate::chain::{RpcError, WalletError};
use crate::clients::AggregatorError;
use crate::errors::{ErrorCode, TradeError};

/// Per-step code mapping for chain-level failures.
pub(crate) fn map_rpc_err(e: RpcError) -> TradeError {
    match e {
        RpcError::ReceiptTimeout(hash) => TradeError::new(
            ErrorCode::TransactionTimeout,
            format!("no receipt for {hash:#x} in time"),
        ),
        other => TradeError::new(ErrorCode::RpcConnectionFailed, other.to_string()),
    }
}

pub(crate) fn map_wallet_err(e: WalletError) -> TradeError {
    match e {
        WalletError::Rpc(inner) => map_rpc_err(inner),
        other => TradeError::new(ErrorCode::SwapExecutionFailed, other.to_string()),
    }
}

pub(crate) fn map_aggregator_err(e: AggregatorError) -> TradeError {
    match e {
        AggregatorError::RateLimited => {
            TradeError::new(ErrorCode::ApiRateLimited, "aggregator rate limit hit")
        }
        AggregatorError::InsufficientLiquidity(symbol) => TradeError::new(
            ErrorCode::InsufficientLiquidity,
            format!("not enough liquidity to route {symbol}"),
        ),
        AggregatorError::Http(inner) => {
            TradeError::new(ErrorCode::SwapQuoteFailed, inner.to_string())
        }
        AggregatorError::Unexpected(msg) => TradeError::new(ErrorCode::SwapQuoteFailed, msg),
    }
}

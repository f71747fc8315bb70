use alloy::primitives::Address;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ErrorCode, TradeError};
use crate::execution::SubmitOutcome;
use crate::models::{Side, Signal};
use crate::AppState;

/// Wire shape for signal submission. The handler is a thin adapter: it
/// parses this into a `Signal` and hands it to the orchestrator.
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    /// Stable across retransmissions when the client provides one; minted
    /// here otherwise.
    #[serde(default)]
    pub signal_id: Option<String>,
    pub caller_id: String,
    pub wallet_address: String,
    pub side: String,
    pub symbol: String,
    pub entry_price: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub stop_loss: Decimal,
    pub deadline: DateTime<Utc>,
}

impl SignalRequest {
    fn into_signal(self) -> Result<Signal, TradeError> {
        let side = Side::from_api_str(&self.side).ok_or_else(|| {
            TradeError::new(
                ErrorCode::InvalidSignalFormat,
                format!("side must be BUY or SELL, got {:?}", self.side),
            )
        })?;

        let wallet_address: Address = self.wallet_address.parse().map_err(|_| {
            TradeError::new(
                ErrorCode::InvalidSignalFormat,
                format!("wallet_address {:?} is not a valid address", self.wallet_address),
            )
        })?;

        Ok(Signal {
            signal_id: self
                .signal_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            caller_id: self.caller_id,
            wallet_address,
            side,
            symbol: self.symbol.trim().to_uppercase(),
            entry_price: self.entry_price,
            tp1: self.tp1,
            tp2: self.tp2,
            stop_loss: self.stop_loss,
            deadline: self.deadline,
        })
    }
}

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SignalRequest>,
) -> Result<Json<SubmitOutcome>, TradeError> {
    let signal = req.into_signal()?;
    let outcome = state.orchestrator.submit_signal(signal).await;
    Ok(Json(outcome))
}

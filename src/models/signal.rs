use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::errors::{ErrorCode, TradeError};

/// An immutable trading signal as admitted from ingress. Lives from receipt
/// until it is classified accepted, rejected or expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Opaque id minted by ingress; stable across retransmissions.
    pub signal_id: String,
    pub caller_id: String,
    pub wallet_address: Address,
    pub side: Side,
    pub symbol: String,
    pub entry_price: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub stop_loss: Decimal,
    pub deadline: DateTime<Utc>,
}

impl Signal {
    /// Validate shape and price-level invariants.
    ///
    /// For buy: stopLoss < entryPrice < tp1 <= tp2.
    /// For sell: tp2 <= tp1 < entryPrice < stopLoss.
    /// The deadline must be strictly in the future.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), TradeError> {
        if self.signal_id.is_empty() || self.caller_id.is_empty() {
            return Err(TradeError::new(
                ErrorCode::InvalidSignalFormat,
                "signal_id and caller_id are required",
            ));
        }

        if self.symbol.trim().is_empty() {
            return Err(TradeError::new(
                ErrorCode::InvalidSignalFormat,
                "token symbol is required",
            ));
        }

        let levels = [self.entry_price, self.tp1, self.tp2, self.stop_loss];
        if levels.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(TradeError::new(
                ErrorCode::InvalidPriceLevels,
                "all price levels must be positive",
            ));
        }

        let ordered = match self.side {
            Side::Buy => {
                self.stop_loss < self.entry_price
                    && self.entry_price < self.tp1
                    && self.tp1 <= self.tp2
            }
            Side::Sell => {
                self.tp2 <= self.tp1
                    && self.tp1 < self.entry_price
                    && self.entry_price < self.stop_loss
            }
        };
        if !ordered {
            return Err(TradeError::new(
                ErrorCode::InvalidPriceLevels,
                format!(
                    "price levels not ordered for {}: sl={} entry={} tp1={} tp2={}",
                    self.side, self.stop_loss, self.entry_price, self.tp1, self.tp2
                ),
            ));
        }

        if self.deadline <= now {
            return Err(TradeError::new(
                ErrorCode::SignalExpired,
                format!("deadline {} is not in the future", self.deadline),
            ));
        }

        Ok(())
    }
}

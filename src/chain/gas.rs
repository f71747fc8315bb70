use super::provider::FeeData;

/// Fee settings applied to the outer multi-sig transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSettings {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

/// Chooses fee settings from live node data. EIP-1559 tips win when the node
/// reports them; otherwise the legacy price is bumped and clamped to the
/// chain's configured floor.
#[derive(Debug, Clone, Copy)]
pub struct GasOracle {
    bump_percent: u64,
    floor_wei: u128,
}

impl GasOracle {
    pub fn new(bump_percent: u64, floor_wei: u128) -> Self {
        Self {
            bump_percent,
            floor_wei,
        }
    }

    pub fn choose(&self, fees: &FeeData) -> GasSettings {
        if let (Some(max_fee), Some(tip)) =
            (fees.max_fee_per_gas, fees.max_priority_fee_per_gas)
        {
            return GasSettings::Eip1559 {
                max_fee_per_gas: max_fee.max(self.floor_wei),
                max_priority_fee_per_gas: tip,
            };
        }

        let base = fees.gas_price.unwrap_or(self.floor_wei);
        let bumped = base.saturating_mul(100 + self.bump_percent as u128) / 100;
        GasSettings::Legacy {
            gas_price: bumped.max(self.floor_wei),
        }
    }
}

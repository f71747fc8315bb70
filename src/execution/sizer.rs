use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

use super::map_rpc_err;
use crate::amount::{format_raw, percent_of, to_raw};
use crate::chain::{erc20, ChainHandle};
use crate::config::AppConfig;
use crate::errors::{ErrorCode, TradeError};
use crate::models::{PositionPlan, TokenBinding};

/// Startup-fixed sizing policy.
#[derive(Debug, Clone)]
pub struct SizingPolicy {
    /// Percentage applied when the signal does not ask for one.
    pub default_percent: u32,
    /// Hard cap on the requested percentage.
    pub max_percent: u32,
    /// USD floor applied when the sell side is a stablecoin (1:1 assumed).
    pub min_usd: Decimal,
    /// Native units left unspent for gas when selling the native asset.
    pub native_gas_reserve: U256,
}

impl SizingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_percent: config.position_percentage,
            max_percent: config.max_position_percentage,
            min_usd: config.min_usd_amount,
            native_gas_reserve: config.native_gas_reserve,
        }
    }
}

/// Sizes the sell-side amount of a trade from the wallet's balance. Talks to
/// the chain only; the aggregator's per-token minimum arrives as an advisory
/// input.
pub struct PositionSizer {
    policy: SizingPolicy,
}

impl PositionSizer {
    pub fn new(policy: SizingPolicy) -> Self {
        Self { policy }
    }

    pub async fn size(
        &self,
        chain: &ChainHandle,
        wallet: Address,
        sell: &TokenBinding,
        buy: &TokenBinding,
        percent_requested: Option<u32>,
        base_is_stable: bool,
        advisory_min: Option<U256>,
    ) -> Result<PositionPlan, TradeError> {
        let balance = if sell.is_native {
            chain
                .rpc
                .native_balance(wallet)
                .await
                .map_err(map_rpc_err)?
        } else {
            let ret = chain
                .rpc
                .call(sell.contract, erc20::balance_of_call(wallet))
                .await
                .map_err(map_rpc_err)?;
            erc20::decode_uint(&ret).ok_or_else(|| {
                TradeError::new(ErrorCode::RpcConnectionFailed, "malformed balanceOf response")
            })?
        };

        build_plan(
            &self.policy,
            wallet,
            sell,
            buy,
            balance,
            percent_requested,
            base_is_stable,
            advisory_min,
        )
    }
}

/// Pure sizing policy, separated from the balance read.
#[allow(clippy::too_many_arguments)]
pub fn build_plan(
    policy: &SizingPolicy,
    wallet: Address,
    sell: &TokenBinding,
    buy: &TokenBinding,
    balance_raw: U256,
    percent_requested: Option<u32>,
    base_is_stable: bool,
    advisory_min: Option<U256>,
) -> Result<PositionPlan, TradeError> {
    let requested = percent_requested.unwrap_or(policy.default_percent);
    if requested < 1 || requested > policy.max_percent {
        return Err(TradeError::new(
            ErrorCode::InvalidPositionPercentage,
            format!(
                "position percentage {requested} outside [1, {}]",
                policy.max_percent
            ),
        ));
    }

    let gas_reserve = if sell.is_native {
        policy.native_gas_reserve
    } else {
        U256::ZERO
    };
    let available = balance_raw.saturating_sub(gas_reserve);

    if available.is_zero() {
        let code = if base_is_stable {
            ErrorCode::InsufficientStablecoinBalance
        } else {
            ErrorCode::SafeInsufficientBalance
        };
        return Err(TradeError::new(
            code,
            format!(
                "no spendable {} balance (held {}, gas reserve {})",
                sell.symbol,
                format_raw(balance_raw, sell.decimals),
                format_raw(gas_reserve, sell.decimals)
            ),
        ));
    }

    // Basis-point arithmetic, truncating toward zero.
    let sell_amount = percent_of(available, requested);

    let usd_min = if base_is_stable {
        to_raw(policy.min_usd, sell.decimals).unwrap_or(U256::ZERO)
    } else {
        U256::ZERO
    };
    let min_amount = usd_min.max(advisory_min.unwrap_or(U256::ZERO));

    if sell_amount.is_zero() || sell_amount < min_amount {
        return Err(TradeError::new(
            ErrorCode::PositionSizeTooSmall,
            format!(
                "{requested}% of {} {} is below the minimum {} {}",
                format_raw(available, sell.decimals),
                sell.symbol,
                format_raw(min_amount, sell.decimals),
                sell.symbol
            ),
        ));
    }

    Ok(PositionPlan {
        wallet_address: wallet,
        network: sell.network.clone(),
        sell_binding: sell.clone(),
        buy_binding: buy.clone(),
        sell_amount_raw: sell_amount,
        percentage_requested: requested,
        percentage_effective: requested,
        min_amount_raw: min_amount,
        gas_reserve_raw: gas_reserve,
        rationale: format!(
            "{requested}% of {} spendable {}",
            format_raw(available, sell.decimals),
            sell.symbol
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BindingSource, NetworkKey};

    fn policy() -> SizingPolicy {
        SizingPolicy {
            default_percent: 20,
            max_percent: 80,
            min_usd: Decimal::new(1, 2), // $0.01
            native_gas_reserve: U256::from(1_000_000_000_000_000u64),
        }
    }

    fn stable() -> TokenBinding {
        TokenBinding {
            symbol: "USDC".into(),
            network: NetworkKey::new("arbitrum"),
            contract: Address::from([0x01; 20]),
            decimals: 6,
            is_native: false,
            source: BindingSource::Known,
            verified: true,
        }
    }

    fn token() -> TokenBinding {
        TokenBinding {
            symbol: "FOO".into(),
            network: NetworkKey::new("arbitrum"),
            contract: Address::from([0x02; 20]),
            decimals: 18,
            is_native: false,
            source: BindingSource::Known,
            verified: true,
        }
    }

    fn wallet() -> Address {
        Address::from([0xAA; 20])
    }

    #[test]
    fn test_twenty_percent_of_thousand_usdc() {
        // 1000.00 USDC at 6 decimals
        let plan = build_plan(
            &policy(),
            wallet(),
            &stable(),
            &token(),
            U256::from(1_000_000_000u64),
            None,
            true,
            None,
        )
        .unwrap();
        assert_eq!(plan.sell_amount_raw, U256::from(200_000_000u64));
        assert_eq!(plan.percentage_effective, 20);
        assert_eq!(plan.gas_reserve_raw, U256::ZERO);
    }

    #[test]
    fn test_percentage_bounds() {
        for pct in [0u32, 81, 100] {
            let err = build_plan(
                &policy(),
                wallet(),
                &stable(),
                &token(),
                U256::from(1_000_000_000u64),
                Some(pct),
                true,
                None,
            )
            .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidPositionPercentage, "pct={pct}");
        }
    }

    #[test]
    fn test_dust_balance_too_small() {
        // $0.005 — 20% is $0.001, below the $0.01 floor
        let err = build_plan(
            &policy(),
            wallet(),
            &stable(),
            &token(),
            U256::from(5_000u64),
            None,
            true,
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::PositionSizeTooSmall);
        assert!(err.message.contains("0.01"));
    }

    #[test]
    fn test_zero_balance_is_insufficient() {
        let err = build_plan(
            &policy(),
            wallet(),
            &stable(),
            &token(),
            U256::ZERO,
            None,
            true,
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStablecoinBalance);
    }

    #[test]
    fn test_native_sell_reserves_gas() {
        let mut native = token();
        native.symbol = "ETH".into();
        native.is_native = true;
        native.decimals = 18;

        // 0.002 ETH held; 0.001 reserved → 20% of 0.001
        let plan = build_plan(
            &policy(),
            wallet(),
            &native,
            &stable(),
            U256::from(2_000_000_000_000_000u64),
            None,
            false,
            None,
        )
        .unwrap();
        assert_eq!(plan.gas_reserve_raw, U256::from(1_000_000_000_000_000u64));
        assert_eq!(plan.sell_amount_raw, U256::from(200_000_000_000_000u64));
    }

    #[test]
    fn test_advisory_minimum_wins_when_larger() {
        let err = build_plan(
            &policy(),
            wallet(),
            &stable(),
            &token(),
            U256::from(1_000_000u64), // $1 → 20% = $0.20
            None,
            true,
            Some(U256::from(500_000u64)), // $0.50 advisory floor
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::PositionSizeTooSmall);
        assert!(err.message.contains("0.5"));
    }

    #[test]
    fn test_sizer_bound_invariant() {
        // sellAmountRaw = ⌊(balance − reserve) × pct / 100⌋ and ≤ balance − reserve
        let balance = U256::from(987_654_321u64);
        for pct in [1u32, 33, 50, 80] {
            let plan = build_plan(
                &policy(),
                wallet(),
                &stable(),
                &token(),
                balance,
                Some(pct),
                true,
                None,
            )
            .unwrap();
            let expected = balance * U256::from(pct) / U256::from(100u64);
            assert_eq!(plan.sell_amount_raw, expected);
            assert!(plan.sell_amount_raw <= balance);
        }
    }
}

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::{map_rpc_err, map_wallet_err};
use crate::amount::format_raw;
use crate::chain::{erc20, ChainHandle, MultisigWallet, WalletCall};
use crate::errors::{ErrorCode, TradeError};
use crate::models::TokenBinding;

/// Grace period after an approval confirms before the allowance is re-read,
/// tolerating RPC state propagation lag.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Ensures the wallet holds sufficient allowance toward every spender a swap
/// needs: the chain's canonical permit contract when configured, then the
/// quote's spender. Insufficient allowances are raised to `U256::MAX` through
/// a multi-sig approval and confirmed on chain before the swap proceeds.
pub struct AllowanceManager {
    settle_delay: Duration,
}

impl Default for AllowanceManager {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
        }
    }
}

impl AllowanceManager {
    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    pub async fn ensure(
        &self,
        chain: &ChainHandle,
        wallet: &Arc<dyn MultisigWallet>,
        sell: &TokenBinding,
        quote_spender: Address,
        amount: U256,
    ) -> Result<(), TradeError> {
        // Native assets move by value, not allowance.
        if sell.is_native {
            return Ok(());
        }

        let mut spenders = Vec::with_capacity(2);
        if let Some(permit) = chain.permit_contract {
            spenders.push(permit);
        }
        if !spenders.contains(&quote_spender) {
            spenders.push(quote_spender);
        }

        for spender in spenders {
            let current = self.read_allowance(chain, wallet.address(), sell, spender).await?;
            if current >= amount {
                tracing::debug!(
                    token = %sell,
                    spender = %spender,
                    allowance = %format_raw(current, sell.decimals),
                    "Allowance sufficient"
                );
                continue;
            }

            tracing::info!(
                token = %sell,
                spender = %spender,
                current = %format_raw(current, sell.decimals),
                required = %format_raw(amount, sell.decimals),
                "Raising allowance to max"
            );

            let fees = chain.rpc.fee_data().await.map_err(map_rpc_err)?;
            let tx_hash = wallet
                .execute(
                    WalletCall {
                        to: sell.contract,
                        value: U256::ZERO,
                        data: erc20::approve_call(spender, U256::MAX),
                    },
                    chain.gas.choose(&fees),
                    None,
                )
                .await
                .map_err(map_wallet_err)?;

            let receipt = chain
                .rpc
                .wait_receipt(tx_hash, chain.receipt_wait)
                .await
                .map_err(map_rpc_err)?;
            if !receipt.succeeded() {
                return Err(TradeError::new(
                    ErrorCode::SwapExecutionFailed,
                    format!("approval {tx_hash:#x} reverted"),
                ));
            }

            sleep(self.settle_delay).await;

            let after = self.read_allowance(chain, wallet.address(), sell, spender).await?;
            if after < amount {
                return Err(TradeError::new(
                    ErrorCode::SwapExecutionFailed,
                    format!(
                        "allowance to {spender:#x} still {} after approval",
                        format_raw(after, sell.decimals)
                    ),
                ));
            }

            tracing::info!(
                token = %sell,
                spender = %spender,
                tx_hash = %tx_hash,
                "Allowance confirmed"
            );
        }

        Ok(())
    }

    async fn read_allowance(
        &self,
        chain: &ChainHandle,
        owner: Address,
        sell: &TokenBinding,
        spender: Address,
    ) -> Result<U256, TradeError> {
        let ret = chain
            .rpc
            .call(sell.contract, erc20::allowance_call(owner, spender))
            .await
            .map_err(map_rpc_err)?;
        erc20::decode_uint(&ret).ok_or_else(|| {
            TradeError::new(ErrorCode::RpcConnectionFailed, "malformed allowance response")
        })
    }
}

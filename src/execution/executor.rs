use alloy::primitives::{B256, U256};
use std::sync::Arc;

use super::allowance::AllowanceManager;
use super::{map_aggregator_err, map_rpc_err, map_wallet_err};
use crate::amount::format_raw;
use crate::chain::{erc20, ChainSet, WalletCall, WalletProvider};
use crate::clients::{QuoteRequest, RouteProvider};
use crate::errors::{ErrorCode, TradeError};
use crate::models::{ExecAction, ExecutionRequest, Trade};

/// Result of one executed entry or exit swap.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Outer transaction hash; `None` in dry-run mode.
    pub tx_hash: Option<B256>,
    /// Buy-side amount received, in its smallest unit.
    pub filled_raw: U256,
}

/// Wraps the multi-sig wallet for swap execution: quote, allowances, build,
/// sign, broadcast, confirm. Stateless beyond its collaborators; per-trade
/// ordering is the scheduler's lease.
///
/// Without a wallet provider (no agent key configured) every request runs as
/// a dry run regardless of the flag.
pub struct TradeExecutor {
    chains: Arc<ChainSet>,
    wallets: Option<Arc<dyn WalletProvider>>,
    routes: Arc<dyn RouteProvider>,
    allowances: AllowanceManager,
    slippage_bps: u64,
    dry_run: bool,
}

impl TradeExecutor {
    pub fn new(
        chains: Arc<ChainSet>,
        wallets: Option<Arc<dyn WalletProvider>>,
        routes: Arc<dyn RouteProvider>,
        allowances: AllowanceManager,
        slippage_bps: u64,
        dry_run: bool,
    ) -> Self {
        Self {
            chains,
            wallets,
            routes,
            allowances,
            slippage_bps,
            dry_run,
        }
    }

    pub async fn execute(
        &self,
        trade: &Trade,
        request: &ExecutionRequest,
    ) -> Result<ExecOutcome, TradeError> {
        // Exit mirrors enter with the bindings swapped.
        let (sell, buy) = match request.action {
            ExecAction::Enter => (&trade.sell_binding, &trade.buy_binding),
            ExecAction::Exit { .. } => (&trade.buy_binding, &trade.sell_binding),
        };

        let chain = self.chains.handle(&trade.network).ok_or_else(|| {
            TradeError::new(
                ErrorCode::UnsupportedNetwork,
                format!("network {} is not configured", trade.network),
            )
        })?;

        let quote = self
            .routes
            .quote(&QuoteRequest {
                chain_id: chain.chain_id,
                wallet: trade.wallet_address,
                sell: sell.clone(),
                buy: buy.clone(),
                sell_amount_raw: request.amount_raw,
                slippage_bps: self.slippage_bps,
            })
            .await
            .map_err(map_aggregator_err)?;

        if self.dry_run || self.wallets.is_none() {
            let mode = if self.wallets.is_none() {
                "no-wallet"
            } else {
                "dry-run"
            };
            let filled = if quote.buy_amount_hint_raw.is_zero() {
                request.amount_raw
            } else {
                quote.buy_amount_hint_raw
            };
            tracing::info!(
                trade_id = %trade.trade_id,
                action = %request.action,
                sell = %sell,
                buy = %buy,
                amount = %format_raw(request.amount_raw, sell.decimals),
                mode,
                "[DRY-RUN] Would execute swap"
            );
            return Ok(ExecOutcome {
                tx_hash: None,
                filled_raw: filled,
            });
        }

        let wallets = self.wallets.as_ref().expect("checked above");
        let wallet = wallets
            .wallet(&trade.network, trade.wallet_address)
            .ok_or_else(|| {
                TradeError::new(
                    ErrorCode::SwapExecutionFailed,
                    format!("no wallet adapter for {} on {}", trade.wallet_address, trade.network),
                )
            })?;

        self.allowances
            .ensure(chain, &wallet, sell, quote.spender, request.amount_raw)
            .await?;

        let fees = chain.rpc.fee_data().await.map_err(map_rpc_err)?;
        let tx_hash = wallet
            .execute(
                WalletCall {
                    to: quote.to,
                    value: quote.value,
                    data: quote.data.clone(),
                },
                chain.gas.choose(&fees),
                quote.gas_hint,
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
                format!("swap {tx_hash:#x} reverted"),
            )
            .with_trade(trade.trade_id));
        }

        // Estimate the fill from Transfer events into the wallet; native
        // receipts carry no token transfer, so fall back to the quote's hint.
        let filled_raw = if buy.is_native {
            quote.buy_amount_hint_raw
        } else {
            let observed =
                erc20::sum_transfers_to(&receipt.logs, buy.contract, trade.wallet_address);
            if observed.is_zero() {
                quote.buy_amount_hint_raw
            } else {
                observed
            }
        };

        tracing::info!(
            trade_id = %trade.trade_id,
            action = %request.action,
            tx_hash = %tx_hash,
            filled = %format_raw(filled_raw, buy.decimals),
            "Swap confirmed"
        );

        Ok(ExecOutcome {
            tx_hash: Some(tx_hash),
            filled_raw,
        })
    }
}

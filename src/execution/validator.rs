use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

use super::{map_rpc_err, map_wallet_err};
use crate::cache::TtlCache;
use crate::chain::{ChainHandle, WalletProvider};
use crate::errors::{ErrorCode, TradeError};
use crate::models::token::WalletRecord;
use crate::models::NetworkKey;

/// On-chain validation results live for two minutes, invalidated whenever the
/// executor observes a state change for the wallet.
const VALIDATION_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ValidatedWallet {
    pub owners: Vec<Address>,
    pub threshold: u32,
    pub native_balance: U256,
}

/// Confirms a wallet is usable on a chain: the directory lists an active
/// deployment, code exists at the address, and the owner/threshold setup is
/// sane. A zero native balance is advisory unless the trade itself is
/// native-denominated.
pub struct WalletValidator {
    wallets: Arc<dyn WalletProvider>,
    cache: TtlCache<(NetworkKey, Address), ValidatedWallet>,
}

impl WalletValidator {
    pub fn new(wallets: Arc<dyn WalletProvider>) -> Self {
        Self {
            wallets,
            cache: TtlCache::new(VALIDATION_TTL),
        }
    }

    pub async fn validate(
        &self,
        chain: &ChainHandle,
        record: &WalletRecord,
        wallet: Address,
        native_trade: bool,
    ) -> Result<ValidatedWallet, TradeError> {
        let network = &chain.key;

        // Directory first: the active-deployments list is authoritative.
        if record.active_on(wallet, network).is_none() {
            return Err(TradeError::new(
                ErrorCode::SafeNotDeployed,
                format!("no active wallet deployment on {network}"),
            )
            .with_wallet(wallet)
            .with_network(network));
        }

        let key = (network.clone(), wallet);
        let validated = match self.cache.get(&key) {
            Some(hit) => hit,
            None => {
                let fresh = self.validate_on_chain(chain, wallet).await?;
                self.cache.insert(key, fresh.clone());
                fresh
            }
        };

        if validated.native_balance.is_zero() {
            if native_trade {
                return Err(TradeError::new(
                    ErrorCode::SafeInsufficientBalance,
                    format!("wallet holds no native {} to trade", chain.native_symbol),
                )
                .with_wallet(wallet)
                .with_network(network));
            }
            // Gas is paid from the native balance; zero is survivable until
            // the first broadcast, so warn rather than reject.
            tracing::warn!(
                wallet = %wallet,
                network = %network,
                "Wallet has zero native balance — broadcasts may fail"
            );
        }

        Ok(validated)
    }

    async fn validate_on_chain(
        &self,
        chain: &ChainHandle,
        wallet: Address,
    ) -> Result<ValidatedWallet, TradeError> {
        let code = chain.rpc.code(wallet).await.map_err(map_rpc_err)?;
        if code.is_empty() {
            return Err(TradeError::new(
                ErrorCode::SafeNotDeployed,
                format!("no contract code at {wallet:#x} on {}", chain.key),
            )
            .with_wallet(wallet)
            .with_network(&chain.key));
        }

        let adapter = self.wallets.wallet(&chain.key, wallet).ok_or_else(|| {
            TradeError::new(
                ErrorCode::UnsupportedNetwork,
                format!("no wallet adapter for {}", chain.key),
            )
        })?;

        let owners = adapter.owners().await.map_err(map_wallet_err)?;
        let threshold = adapter.threshold().await.map_err(map_wallet_err)?;

        if owners.is_empty() || threshold < 1 {
            return Err(TradeError::new(
                ErrorCode::SafeInvalidConfiguration,
                format!("owners={} threshold={threshold}", owners.len()),
            )
            .with_wallet(wallet)
            .with_network(&chain.key));
        }

        let native_balance = chain
            .rpc
            .native_balance(wallet)
            .await
            .map_err(map_rpc_err)?;

        Ok(ValidatedWallet {
            owners,
            threshold,
            native_balance,
        })
    }

    /// Drop the cached entry after the executor has changed on-chain state
    /// for this wallet.
    pub fn invalidate(&self, network: &NetworkKey, wallet: Address) {
        self.cache.invalidate(&(network.clone(), wallet));
    }
}

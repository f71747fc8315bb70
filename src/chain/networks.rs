use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::gas::GasOracle;
use super::provider::{HttpRpc, Rpc};
use super::safe::{MultisigWallet, SafeWallet};
use crate::config::AppConfig;
use crate::models::{NetworkKey, TokenBinding};

/// Everything the pipeline needs to touch one network.
#[derive(Clone)]
pub struct ChainHandle {
    pub key: NetworkKey,
    pub chain_id: u64,
    pub rpc: Arc<dyn Rpc>,
    pub gas: GasOracle,
    pub stable: TokenBinding,
    pub native_symbol: String,
    pub permit_contract: Option<Address>,
    pub receipt_wait: Duration,
}

/// The set of configured networks, keyed by their opaque network key.
pub struct ChainSet {
    handles: HashMap<NetworkKey, ChainHandle>,
}

impl ChainSet {
    pub fn new(handles: Vec<ChainHandle>) -> Self {
        Self {
            handles: handles.into_iter().map(|h| (h.key.clone(), h)).collect(),
        }
    }

    /// Build HTTP-RPC-backed handles from startup configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let handles = config
            .networks
            .iter()
            .filter_map(|net| {
                let stable = config.stable_binding(&net.key)?;
                Some(ChainHandle {
                    key: net.key.clone(),
                    chain_id: net.chain_id,
                    rpc: Arc::new(HttpRpc::new(
                        net.rpc_url.clone(),
                        Duration::from_secs(config.rpc_timeout_secs),
                    )) as Arc<dyn Rpc>,
                    gas: GasOracle::new(config.gas_bump_percent, net.gas_floor_wei),
                    stable,
                    native_symbol: net.native_symbol.clone(),
                    permit_contract: net.permit_contract,
                    receipt_wait: Duration::from_secs(config.receipt_wait_seconds),
                })
            })
            .collect();
        Self::new(handles)
    }

    pub fn handle(&self, key: &NetworkKey) -> Option<&ChainHandle> {
        self.handles.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NetworkKey> {
        self.handles.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wallet provider
// ---------------------------------------------------------------------------

/// Hands out the shared multi-sig adapter instance for a `(wallet, chain)`
/// pair. Instances tolerate concurrent reads; broadcasts are serialised by
/// the scheduler's per-trade lease.
pub trait WalletProvider: Send + Sync {
    fn wallet(&self, network: &NetworkKey, address: Address) -> Option<Arc<dyn MultisigWallet>>;
}

pub struct SafeWalletProvider {
    chains: Arc<ChainSet>,
    signer: PrivateKeySigner,
    instances: DashMap<(NetworkKey, Address), Arc<dyn MultisigWallet>>,
}

impl SafeWalletProvider {
    pub fn new(chains: Arc<ChainSet>, signer: PrivateKeySigner) -> Self {
        Self {
            chains,
            signer,
            instances: DashMap::new(),
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }
}

impl WalletProvider for SafeWalletProvider {
    fn wallet(&self, network: &NetworkKey, address: Address) -> Option<Arc<dyn MultisigWallet>> {
        let handle = self.chains.handle(network)?;
        let entry = self
            .instances
            .entry((network.clone(), address))
            .or_insert_with(|| {
                Arc::new(SafeWallet::new(
                    Arc::clone(&handle.rpc),
                    self.signer.clone(),
                    address,
                    handle.chain_id,
                )) as Arc<dyn MultisigWallet>
            });
        Some(Arc::clone(entry.value()))
    }
}

use alloy::primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel contract address the aggregator uses for native assets.
pub const NATIVE_SENTINEL: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

// ---------------------------------------------------------------------------
// NetworkKey
// ---------------------------------------------------------------------------

/// Opaque network identifier ("base", "arbitrum", ...). Round-trips through
/// adapters unchanged; the core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkKey(String);

impl NetworkKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NetworkKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// TokenBinding
// ---------------------------------------------------------------------------

/// Where a token binding was resolved from. Lower values rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Known,
    Registry,
    DexListing,
}

impl BindingSource {
    pub fn priority(self) -> u8 {
        match self {
            BindingSource::Known => 0,
            BindingSource::Registry => 1,
            BindingSource::DexListing => 2,
        }
    }
}

/// A (symbol, network, contract) resolution produced by the token resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub symbol: String,
    pub network: NetworkKey,
    pub contract: Address,
    pub decimals: u8,
    pub is_native: bool,
    pub source: BindingSource,
    /// Set when the listing index reports liquidity above the verification
    /// threshold; used only for ranking.
    #[serde(default)]
    pub verified: bool,
}

impl TokenBinding {
    pub fn native(symbol: impl Into<String>, network: NetworkKey, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            network,
            contract: NATIVE_SENTINEL,
            decimals,
            is_native: true,
            source: BindingSource::Known,
            verified: true,
        }
    }
}

impl fmt::Display for TokenBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.network)
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// A wallet's holding of one token, in the token's smallest unit.
#[derive(Debug, Clone)]
pub struct Balance {
    pub wallet: Address,
    pub network: NetworkKey,
    pub binding: TokenBinding,
    pub raw: U256,
}

impl Balance {
    pub fn decimals(&self) -> u8 {
        self.binding.decimals
    }
}

// ---------------------------------------------------------------------------
// WalletDeployment (directory-owned, read-only here)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletDeployment {
    pub caller_id: String,
    pub wallet_address: Address,
    pub network: NetworkKey,
    pub active: bool,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub caller_id: String,
    pub active_deployments: Vec<WalletDeployment>,
}

impl WalletRecord {
    /// The active deployment for `wallet` on `network`, if the directory
    /// lists one.
    pub fn active_on(&self, wallet: Address, network: &NetworkKey) -> Option<&WalletDeployment> {
        self.active_deployments
            .iter()
            .find(|d| d.active && d.wallet_address == wallet && &d.network == network)
    }

    /// Networks on which the caller has any active deployment.
    pub fn active_networks(&self) -> Vec<NetworkKey> {
        self.active_deployments
            .iter()
            .filter(|d| d.active)
            .map(|d| d.network.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_active_on_requires_exact_match() {
        let record = WalletRecord {
            caller_id: "user-1".into(),
            active_deployments: vec![
                WalletDeployment {
                    caller_id: "user-1".into(),
                    wallet_address: addr(1),
                    network: "base".into(),
                    active: true,
                    status: "deployed".into(),
                },
                WalletDeployment {
                    caller_id: "user-1".into(),
                    wallet_address: addr(1),
                    network: "arbitrum".into(),
                    active: false,
                    status: "pending".into(),
                },
            ],
        };

        assert!(record.active_on(addr(1), &"base".into()).is_some());
        // Inactive deployment does not count
        assert!(record.active_on(addr(1), &"arbitrum".into()).is_none());
        // Different wallet does not count
        assert!(record.active_on(addr(2), &"base".into()).is_none());
    }

    #[test]
    fn test_source_priority_order() {
        assert!(BindingSource::Known.priority() < BindingSource::Registry.priority());
        assert!(BindingSource::Registry.priority() < BindingSource::DexListing.priority());
    }
}

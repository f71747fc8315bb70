use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::models::token::NATIVE_SENTINEL;
use crate::models::{BindingSource, NetworkKey, TokenBinding};

/// Default native gas reserve: 0.001 in 18-decimal native units.
const DEFAULT_GAS_RESERVE_WEI: u128 = 1_000_000_000_000_000;

/// Default legacy gas price floor: 0.1 gwei.
const DEFAULT_GAS_FLOOR_WEI: u128 = 100_000_000;

// ---------------------------------------------------------------------------
// Per-network table (configuration, never code)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub key: NetworkKey,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Base stablecoin used as the sell side of buys on this network.
    pub stable_symbol: String,
    pub stable_contract: Address,
    pub stable_decimals: u8,
    pub native_symbol: String,
    /// Canonical permit contract, when one is in use on this chain.
    #[serde(default)]
    pub permit_contract: Option<Address>,
    #[serde(default = "default_gas_floor")]
    pub gas_floor_wei: u128,
}

fn default_gas_floor() -> u128 {
    DEFAULT_GAS_FLOOR_WEI
}

/// Entry in the built-in canonical token registry.
#[derive(Debug, Clone, Deserialize)]
pub struct KnownToken {
    pub symbol: String,
    pub network: NetworkKey,
    pub contract: Address,
    pub decimals: u8,
    #[serde(default)]
    pub is_native: bool,
}

impl KnownToken {
    pub fn to_binding(&self) -> TokenBinding {
        TokenBinding {
            symbol: self.symbol.clone(),
            network: self.network.clone(),
            contract: if self.is_native {
                NATIVE_SENTINEL
            } else {
                self.contract
            },
            decimals: self.decimals,
            is_native: self.is_native,
            source: BindingSource::Known,
            verified: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// Agent signer key (hex). Absent → monitor-only mode, no execution.
    pub private_key: Option<String>,

    pub networks: Vec<NetworkConfig>,
    pub known_tokens: Vec<KnownToken>,

    // Collaborator endpoints
    pub aggregator_url: String,
    pub price_feed_url: String,
    pub registry_url: String,
    pub listing_url: String,
    pub directory_url: String,
    pub event_bus_url: Option<String>,

    // Sizing policy
    pub position_percentage: u32,
    pub max_position_percentage: u32,
    pub min_usd_amount: Decimal,
    pub native_gas_reserve: U256,

    // Execution policy
    pub default_slippage_bps: u64,
    pub executor_fan_out: usize,
    pub receipt_wait_seconds: u64,
    pub gas_bump_percent: u64,
    pub dry_run: bool,

    // Monitor policy
    pub monitor_tick_seconds: u64,
    pub trailing_stop_enabled: bool,
    pub trailing_retracement_pct: Decimal,
    /// Fraction of the position sold on TP1, whole percent (100 = full exit).
    pub tp1_exit_percent: u32,

    // Timeouts
    pub rpc_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let networks: Vec<NetworkConfig> = match env::var("NETWORKS_JSON") {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("NETWORKS_JSON is not valid: {e}"))?,
            Err(_) => Vec::new(),
        };

        let known_tokens: Vec<KnownToken> = match env::var("KNOWN_TOKENS_JSON") {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("KNOWN_TOKENS_JSON is not valid: {e}"))?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            private_key: env::var("PRIVATE_KEY").ok(),

            networks,
            known_tokens,

            aggregator_url: env::var("AGGREGATOR_URL")
                .unwrap_or_else(|_| "https://api.0x.org".into()),
            price_feed_url: env::var("PRICE_FEED_URL")
                .unwrap_or_else(|_| "https://api.dexscreener.com".into()),
            registry_url: env::var("TOKEN_REGISTRY_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".into()),
            listing_url: env::var("LISTING_INDEX_URL")
                .unwrap_or_else(|_| "https://api.dexscreener.com".into()),
            directory_url: env::var("DIRECTORY_URL")
                .unwrap_or_else(|_| "http://localhost:8090".into()),
            event_bus_url: env::var("EVENT_BUS_URL").ok(),

            position_percentage: parse_env("POSITION_PERCENTAGE", 20),
            max_position_percentage: parse_env("MAX_POSITION_PERCENTAGE", 80),
            min_usd_amount: parse_env("MIN_USD_AMOUNT", Decimal::new(1, 2)),
            native_gas_reserve: env::var("NATIVE_GAS_RESERVE")
                .ok()
                .and_then(|s| U256::from_str(&s).ok())
                .unwrap_or(U256::from(DEFAULT_GAS_RESERVE_WEI)),

            default_slippage_bps: parse_env("DEFAULT_SLIPPAGE_BPS", 50),
            executor_fan_out: parse_env("EXECUTOR_FAN_OUT", 8),
            receipt_wait_seconds: parse_env("RECEIPT_WAIT_SECONDS", 120),
            gas_bump_percent: parse_env("GAS_BUMP_PERCENT", 20),
            dry_run: parse_env("DRY_RUN", false),

            monitor_tick_seconds: parse_env("MONITOR_TICK_SECONDS", 30),
            trailing_stop_enabled: parse_env("TRAILING_STOP_ENABLED", true),
            trailing_retracement_pct: parse_env("TRAILING_RETRACEMENT_PCT", Decimal::from(2)),
            tp1_exit_percent: parse_env("TP1_EXIT_PERCENT", 100),

            rpc_timeout_secs: parse_env("RPC_TIMEOUT_SECS", 10),
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS", 5),
        })
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn network(&self, key: &NetworkKey) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| &n.key == key)
    }

    /// Built-in registry lookup, highest-priority resolver source.
    pub fn known_bindings(&self, symbol: &str) -> Vec<TokenBinding> {
        self.known_tokens
            .iter()
            .filter(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .map(KnownToken::to_binding)
            .collect()
    }

    /// The stablecoin binding configured as the base token on a network.
    pub fn stable_binding(&self, key: &NetworkKey) -> Option<TokenBinding> {
        let net = self.network(key)?;
        Some(TokenBinding {
            symbol: net.stable_symbol.clone(),
            network: net.key.clone(),
            contract: net.stable_contract,
            decimals: net.stable_decimals,
            is_native: false,
            source: BindingSource::Known,
            verified: true,
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

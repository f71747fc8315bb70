use alloy::primitives::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::registry::{SourceError, TokenSource};
use crate::models::{BindingSource, NetworkKey, TokenBinding};

/// Pairs with at least this much USD liquidity carry the verification flag
/// used in resolver ranking.
const LIQUIDITY_VERIFIED_USD: i64 = 10_000;

/// Listing pairs rarely publish decimals; ERC-20s overwhelmingly use 18.
const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<PairDto>,
}

#[derive(Debug, Deserialize)]
struct PairDto {
    #[serde(alias = "chainId")]
    chain_id: String,
    #[serde(alias = "baseToken")]
    base_token: PairTokenDto,
    #[serde(default)]
    liquidity: Option<LiquidityDto>,
}

#[derive(Debug, Deserialize)]
struct PairTokenDto {
    address: Address,
    symbol: String,
    #[serde(default)]
    decimals: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct LiquidityDto {
    #[serde(default)]
    usd: Option<Decimal>,
}

/// DEX listing index. Only the base side of each pair is used; the quote
/// side is whatever the pool pairs against and is not a resolution of the
/// searched symbol.
#[derive(Debug, Clone)]
pub struct HttpListingIndex {
    http: reqwest::Client,
    base_url: String,
}

impl HttpListingIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for HttpListingIndex {
    fn name(&self) -> &'static str {
        "listing-index"
    }

    async fn lookup(&self, symbol: &str) -> Result<Vec<TokenBinding>, SourceError> {
        let url = format!("{}/latest/dex/search", self.base_url);
        let resp: SearchResponse = self
            .http
            .get(&url)
            .query(&[("q", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp
            .pairs
            .into_iter()
            .filter(|p| p.base_token.symbol.eq_ignore_ascii_case(symbol))
            .map(|p| {
                let verified = p
                    .liquidity
                    .as_ref()
                    .and_then(|l| l.usd)
                    .map(|usd| usd >= Decimal::from(LIQUIDITY_VERIFIED_USD))
                    .unwrap_or(false);
                TokenBinding {
                    symbol: p.base_token.symbol.to_uppercase(),
                    network: NetworkKey::new(p.chain_id),
                    contract: p.base_token.address,
                    decimals: p.base_token.decimals.unwrap_or(DEFAULT_DECIMALS),
                    is_native: false,
                    source: BindingSource::DexListing,
                    verified,
                }
            })
            .collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone)]
pub struct PricePoint {
    pub price_usd: Decimal,
    pub change_24h: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub at: DateTime<Utc>,
}

/// USD price source. `price` returns `None` for unknown tokens; transport
/// failures are errors.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<Option<PricePoint>, PriceError>;

    /// Batched lookup; symbols without a price are absent from the map.
    async fn prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PricePoint>, PriceError> {
        let mut out = HashMap::new();
        for symbol in symbols {
            if out.contains_key(symbol) {
                continue;
            }
            if let Some(point) = self.price(symbol).await? {
                out.insert(symbol.clone(), point);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation (DEX pair search shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<PairDto>,
}

#[derive(Debug, Deserialize)]
struct PairDto {
    #[serde(alias = "baseToken")]
    base_token: BaseTokenDto,
    #[serde(default, alias = "priceUsd")]
    price_usd: Option<String>,
    #[serde(default)]
    volume: Option<WindowDto>,
    #[serde(default, alias = "priceChange")]
    price_change: Option<WindowDto>,
    #[serde(default)]
    liquidity: Option<LiquidityDto>,
}

#[derive(Debug, Deserialize)]
struct BaseTokenDto {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct WindowDto {
    #[serde(default)]
    h24: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct LiquidityDto {
    #[serde(default)]
    usd: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPriceFeed {
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
impl PriceFeed for HttpPriceFeed {
    async fn price(&self, symbol: &str) -> Result<Option<PricePoint>, PriceError> {
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

        // Deepest matching pair wins.
        let best = resp
            .pairs
            .into_iter()
            .filter(|p| p.base_token.symbol.eq_ignore_ascii_case(symbol))
            .max_by_key(|p| {
                p.liquidity
                    .as_ref()
                    .and_then(|l| l.usd)
                    .unwrap_or(Decimal::ZERO)
            });

        let Some(pair) = best else {
            return Ok(None);
        };
        let Some(price_str) = pair.price_usd else {
            return Ok(None);
        };
        let price_usd = price_str
            .parse()
            .map_err(|_| PriceError::Unexpected(format!("bad price {price_str}")))?;

        Ok(Some(PricePoint {
            price_usd,
            change_24h: pair.price_change.and_then(|w| w.h24),
            volume_24h: pair.volume.and_then(|w| w.h24),
            at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_parses() {
        let raw = r#"{
            "pairs": [
                {
                    "baseToken": {"symbol": "FOO"},
                    "priceUsd": "1.0432",
                    "volume": {"h24": 1250000},
                    "priceChange": {"h24": -2.4},
                    "liquidity": {"usd": 480000}
                },
                {
                    "baseToken": {"symbol": "FOOBAR"},
                    "priceUsd": "0.01"
                }
            ]
        }"#;
        let resp: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.pairs.len(), 2);
        assert_eq!(resp.pairs[0].base_token.symbol, "FOO");
        assert_eq!(
            resp.pairs[0].liquidity.as_ref().unwrap().usd,
            Some(Decimal::from(480_000))
        );
    }
}

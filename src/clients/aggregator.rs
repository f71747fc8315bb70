use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::{SwapQuote, TokenBinding};
use crate::retry::{retry_async, RetryPolicy};

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by aggregator")]
    RateLimited,

    #[error("insufficient liquidity for {0}")]
    InsufficientLiquidity(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl AggregatorError {
    pub fn retriable(&self) -> bool {
        matches!(self, AggregatorError::Http(_) | AggregatorError::RateLimited)
    }
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub wallet: Address,
    pub sell: TokenBinding,
    pub buy: TokenBinding,
    pub sell_amount_raw: U256,
    pub slippage_bps: u64,
}

/// Thin contract over the external DEX aggregator. Returns an executable
/// call plus the spender that must hold the sell-side allowance.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn quote(&self, req: &QuoteRequest) -> Result<SwapQuote, AggregatorError>;

    /// Advisory per-token minimum sell amount, when the aggregator has one.
    async fn min_sell_amount(
        &self,
        symbol: &str,
        chain_id: u64,
    ) -> Result<Option<U256>, AggregatorError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuoteDto {
    to: Address,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, alias = "estimatedGas")]
    estimated_gas: Option<String>,
    #[serde(alias = "allowanceTarget")]
    allowance_target: Address,
    #[serde(default, alias = "buyAmount")]
    buy_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MinAmountDto {
    #[serde(default, alias = "minSellAmount")]
    min_sell_amount: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpAggregator {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAggregator {
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

    async fn quote_once(&self, req: &QuoteRequest) -> Result<SwapQuote, AggregatorError> {
        let url = format!("{}/swap/v1/quote", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("chainId", req.chain_id.to_string()),
                ("takerAddress", format!("{:#x}", req.wallet)),
                ("sellToken", format!("{:#x}", req.sell.contract)),
                ("buyToken", format!("{:#x}", req.buy.contract)),
                ("sellAmount", req.sell_amount_raw.to_string()),
                ("slippageBps", req.slippage_bps.to_string()),
            ])
            .send()
            .await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(AggregatorError::RateLimited);
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("INSUFFICIENT_ASSET_LIQUIDITY") {
                return Err(AggregatorError::InsufficientLiquidity(
                    req.sell.symbol.clone(),
                ));
            }
            return Err(AggregatorError::Unexpected(body));
        }

        let dto: QuoteDto = resp.json().await?;

        let data = dto
            .data
            .parse()
            .map_err(|_| AggregatorError::Unexpected("bad calldata".into()))?;
        let value = dto
            .value
            .as_deref()
            .map(parse_amount)
            .transpose()?
            .unwrap_or(U256::ZERO);
        let buy_amount_hint_raw = dto
            .buy_amount
            .as_deref()
            .map(parse_amount)
            .transpose()?
            .unwrap_or(U256::ZERO);
        let gas_hint = dto
            .estimated_gas
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok());

        Ok(SwapQuote {
            to: dto.to,
            data,
            value,
            gas_hint,
            spender: dto.allowance_target,
            buy_amount_hint_raw,
        })
    }
}

fn parse_amount(s: &str) -> Result<U256, AggregatorError> {
    U256::from_str(s).map_err(|_| AggregatorError::Unexpected(format!("bad amount {s}")))
}

#[async_trait]
impl RouteProvider for HttpAggregator {
    async fn quote(&self, req: &QuoteRequest) -> Result<SwapQuote, AggregatorError> {
        // Network and rate-limit failures retry with capped backoff before
        // propagating.
        retry_async(
            RetryPolicy::quote(),
            |attempt| {
                if attempt > 1 {
                    tracing::debug!(attempt, sell = %req.sell, buy = %req.buy, "Re-quoting");
                }
                self.quote_once(req)
            },
            AggregatorError::retriable,
        )
        .await
    }

    async fn min_sell_amount(
        &self,
        symbol: &str,
        chain_id: u64,
    ) -> Result<Option<U256>, AggregatorError> {
        let url = format!("{}/swap/v1/tokens/min-amount", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("chainId", &chain_id.to_string())])
            .send()
            .await?;

        if !resp.status().is_success() {
            // The advisory endpoint is optional; absence is not an error.
            return Ok(None);
        }

        let dto: MinAmountDto = resp.json().await?;
        Ok(dto
            .min_sell_amount
            .as_deref()
            .map(parse_amount)
            .transpose()?)
    }
}

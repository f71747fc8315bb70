use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{BindingSource, NetworkKey, TokenBinding};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl SourceError {
    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Http(_))
    }
}

/// A collaborator that can resolve a token symbol to contract bindings.
/// The resolver unions every source's output in priority order.
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(&self, symbol: &str) -> Result<Vec<TokenBinding>, SourceError>;
}

// ---------------------------------------------------------------------------
// External token-metadata registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenEntryDto {
    symbol: String,
    network: String,
    address: Address,
    decimals: u8,
}

#[derive(Debug, Clone)]
pub struct HttpTokenRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenRegistry {
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
impl TokenSource for HttpTokenRegistry {
    fn name(&self) -> &'static str {
        "token-registry"
    }

    async fn lookup(&self, symbol: &str) -> Result<Vec<TokenBinding>, SourceError> {
        let url = format!("{}/tokens", self.base_url);
        let entries: Vec<TokenEntryDto> = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(entries
            .into_iter()
            .filter(|e| e.symbol.eq_ignore_ascii_case(symbol))
            .map(|e| TokenBinding {
                symbol: e.symbol.to_uppercase(),
                network: NetworkKey::new(e.network),
                contract: e.address,
                decimals: e.decimals,
                is_native: false,
                source: BindingSource::Registry,
                verified: false,
            })
            .collect())
    }
}

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::models::token::WalletRecord;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Read-only user/wallet directory. The active-deployments list it returns
/// is authoritative for wallet validation; the core never writes back.
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn wallet_record(&self, caller_id: &str) -> Result<Option<WalletRecord>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
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
impl WalletDirectory for HttpDirectory {
    async fn wallet_record(&self, caller_id: &str) -> Result<Option<WalletRecord>, DirectoryError> {
        let url = format!("{}/wallets/{}", self.base_url, caller_id);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record: WalletRecord = resp.error_for_status()?.json().await?;
        Ok(Some(record))
    }
}

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::retry::{retry_async, RetryPolicy};

/// How often a pending receipt is re-polled.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Transient read failures retry briefly before propagating. Broadcasts are
/// never retried here: a re-send after an ambiguous failure could double-spend
/// the nonce.
const READ_RETRY: RetryPolicy =
    RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(1));

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("no receipt for {0:#x} within timeout")]
    ReceiptTimeout(B256),
}

impl RpcError {
    pub fn retriable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            // -32005 is the conventional "limit exceeded" code.
            RpcError::Node { code, .. } => *code == -32005,
            RpcError::Unexpected(_) => false,
            RpcError::ReceiptTimeout(_) => true,
        }
    }
}

/// Live fee data as reported by the node. Either the 1559 pair or the legacy
/// gas price may be absent depending on the chain.
#[derive(Debug, Clone, Default)]
pub struct FeeData {
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeData {
    pub fn has_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some() && self.max_priority_fee_per_gas.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Transaction receipt with the raw status value preserved. Providers differ
/// on the shape of `status`; see [`TxReceipt::succeeded`].
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub status: Option<Value>,
    pub gas_used: Option<u64>,
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Tolerant success check: status 1 (number or hex string), the string
    /// "success", boolean true, or — for providers that omit status — the
    /// presence of the final hash.
    pub fn succeeded(&self) -> bool {
        match &self.status {
            None => true,
            Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            Some(Value::String(s)) => {
                s == "0x1" || s == "1" || s.eq_ignore_ascii_case("success")
            }
            Some(_) => false,
        }
    }
}

/// Read/write Ethereum-family JSON-RPC surface the core depends on. One
/// instance per network.
#[async_trait]
pub trait Rpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, RpcError>;
    async fn code(&self, addr: Address) -> Result<Bytes, RpcError>;
    async fn native_balance(&self, addr: Address) -> Result<U256, RpcError>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError>;
    async fn fee_data(&self) -> Result<FeeData, RpcError>;
    async fn transaction_count(&self, addr: Address) -> Result<u64, RpcError>;
    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<u64, RpcError>;
    async fn send_raw(&self, tx: Bytes) -> Result<B256, RpcError>;
    async fn wait_receipt(&self, hash: B256, timeout: Duration) -> Result<TxReceipt, RpcError>;
}

// ---------------------------------------------------------------------------
// HTTP JSON-RPC implementation
// ---------------------------------------------------------------------------

pub struct HttpRpc {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn read(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        retry_async(
            READ_RETRY,
            |_| self.request(method, params.clone()),
            RpcError::retriable,
        )
        .await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp: Value = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            return Err(RpcError::Node {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        resp.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Unexpected("missing result field".into()))
    }

    fn parse_quantity(value: &Value) -> Result<U256, RpcError> {
        let s = value
            .as_str()
            .ok_or_else(|| RpcError::Unexpected(format!("expected quantity, got {value}")))?;
        let digits = s.strip_prefix("0x").unwrap_or(s);
        U256::from_str_radix(digits, 16)
            .map_err(|_| RpcError::Unexpected(format!("bad quantity {s}")))
    }

    fn parse_bytes(value: &Value) -> Result<Bytes, RpcError> {
        let s = value
            .as_str()
            .ok_or_else(|| RpcError::Unexpected(format!("expected bytes, got {value}")))?;
        s.parse()
            .map_err(|_| RpcError::Unexpected(format!("bad bytes {s}")))
    }

    fn parse_receipt(value: &Value) -> Result<TxReceipt, RpcError> {
        let tx_hash = value
            .get("transactionHash")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RpcError::Unexpected("receipt without transactionHash".into()))?;

        let gas_used = value
            .get("gasUsed")
            .and_then(|v| Self::parse_quantity(v).ok())
            .map(|u| u.to::<u64>());

        let logs = value
            .get("logs")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|l| serde_json::from_value(l.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(TxReceipt {
            tx_hash,
            status: value.get("status").cloned(),
            gas_used,
            logs,
        })
    }
}

#[async_trait]
impl Rpc for HttpRpc {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let v = self.read("eth_chainId", json!([])).await?;
        Ok(Self::parse_quantity(&v)?.to::<u64>())
    }

    async fn code(&self, addr: Address) -> Result<Bytes, RpcError> {
        let v = self
            .read("eth_getCode", json!([format!("{addr:#x}"), "latest"]))
            .await?;
        Self::parse_bytes(&v)
    }

    async fn native_balance(&self, addr: Address) -> Result<U256, RpcError> {
        let v = self
            .read("eth_getBalance", json!([format!("{addr:#x}"), "latest"]))
            .await?;
        Self::parse_quantity(&v)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let v = self
            .read(
                "eth_call",
                json!([{"to": format!("{to:#x}"), "data": format!("{data}")}, "latest"]),
            )
            .await?;
        Self::parse_bytes(&v)
    }

    async fn fee_data(&self) -> Result<FeeData, RpcError> {
        let gas_price = self
            .read("eth_gasPrice", json!([]))
            .await
            .ok()
            .and_then(|v| Self::parse_quantity(&v).ok())
            .map(|u| u.to::<u128>());

        // maxPriorityFeePerGas is absent on pre-1559 chains; treat failure as
        // "legacy only".
        let priority = self
            .read("eth_maxPriorityFeePerGas", json!([]))
            .await
            .ok()
            .and_then(|v| Self::parse_quantity(&v).ok())
            .map(|u| u.to::<u128>());

        let max_fee = match (gas_price, priority) {
            (Some(gp), Some(tip)) => Some(gp.saturating_mul(2).saturating_add(tip)),
            _ => None,
        };

        Ok(FeeData {
            gas_price,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        })
    }

    async fn transaction_count(&self, addr: Address) -> Result<u64, RpcError> {
        let v = self
            .read(
                "eth_getTransactionCount",
                json!([format!("{addr:#x}"), "pending"]),
            )
            .await?;
        Ok(Self::parse_quantity(&v)?.to::<u64>())
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<u64, RpcError> {
        let v = self
            .read(
                "eth_estimateGas",
                json!([{
                    "from": format!("{from:#x}"),
                    "to": format!("{to:#x}"),
                    "data": format!("{data}"),
                    "value": format!("{value:#x}"),
                }]),
            )
            .await?;
        Ok(Self::parse_quantity(&v)?.to::<u64>())
    }

    async fn send_raw(&self, tx: Bytes) -> Result<B256, RpcError> {
        let v = self
            .request("eth_sendRawTransaction", json!([format!("{tx}")]))
            .await?;
        v.as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RpcError::Unexpected(format!("bad tx hash {v}")))
    }

    async fn wait_receipt(&self, hash: B256, timeout: Duration) -> Result<TxReceipt, RpcError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let v = self
                .read("eth_getTransactionReceipt", json!([format!("{hash:#x}")]))
                .await?;
            if !v.is_null() {
                return Self::parse_receipt(&v);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RpcError::ReceiptTimeout(hash));
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt_with_status(status: Option<Value>) -> TxReceipt {
        TxReceipt {
            tx_hash: B256::from([1u8; 32]),
            status,
            gas_used: None,
            logs: Vec::new(),
        }
    }

    #[test]
    fn test_receipt_status_conventions() {
        // All of these indicate success per the adapter contract.
        assert!(receipt_with_status(Some(json!("0x1"))).succeeded());
        assert!(receipt_with_status(Some(json!("1"))).succeeded());
        assert!(receipt_with_status(Some(json!(1))).succeeded());
        assert!(receipt_with_status(Some(json!("success"))).succeeded());
        assert!(receipt_with_status(Some(json!(true))).succeeded());
        // Providers that omit status: presence of the hash is enough.
        assert!(receipt_with_status(None).succeeded());

        assert!(!receipt_with_status(Some(json!("0x0"))).succeeded());
        assert!(!receipt_with_status(Some(json!(0))).succeeded());
        assert!(!receipt_with_status(Some(json!(false))).succeeded());
        assert!(!receipt_with_status(Some(json!("reverted"))).succeeded());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(
            HttpRpc::parse_quantity(&json!("0x1b4")).unwrap(),
            U256::from(436u64)
        );
        assert!(HttpRpc::parse_quantity(&json!(12)).is_err());
    }

    #[test]
    fn test_node_error_retriability() {
        let limit = RpcError::Node {
            code: -32005,
            message: "limit exceeded".into(),
        };
        assert!(limit.retriable());

        let revert = RpcError::Node {
            code: 3,
            message: "execution reverted".into(),
        };
        assert!(!revert.retriable());
    }
}

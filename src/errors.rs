use alloy::primitives::Address;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{short_addr, NetworkKey};

// ---------------------------------------------------------------------------
// Closed error code set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSignalFormat,
    InvalidPriceLevels,
    SignalExpired,
    TokenNotFound,
    UnsupportedNetwork,
    SafeNotDeployed,
    SafeInvalidConfiguration,
    SafeInsufficientBalance,
    InsufficientStablecoinBalance,
    InvalidPositionPercentage,
    PositionSizeTooSmall,
    PositionSizeTooLarge,
    SwapQuoteFailed,
    SwapExecutionFailed,
    InsufficientLiquidity,
    SlippageTooHigh,
    RpcConnectionFailed,
    NetworkCongestion,
    TransactionTimeout,
    PriceDataUnavailable,
    ApiRateLimited,
    ConfigurationError,
    SystemShutdown,
    UnknownError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    Network,
    System,
    Auth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorCode {
    pub fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            InvalidSignalFormat | InvalidPriceLevels | SignalExpired | UnsupportedNetwork
            | SafeInvalidConfiguration | InvalidPositionPercentage | PositionSizeTooSmall
            | PositionSizeTooLarge | SlippageTooHigh => ErrorKind::Validation,
            TokenNotFound | SafeNotDeployed => ErrorKind::NotFound,
            SafeInsufficientBalance | InsufficientStablecoinBalance => ErrorKind::InsufficientFunds,
            SwapQuoteFailed | InsufficientLiquidity | RpcConnectionFailed | NetworkCongestion
            | TransactionTimeout | PriceDataUnavailable => ErrorKind::Network,
            SwapExecutionFailed | ApiRateLimited | ConfigurationError | SystemShutdown
            | UnknownError => ErrorKind::System,
        }
    }

    pub fn retriable(self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            SwapQuoteFailed
                | RpcConnectionFailed
                | NetworkCongestion
                | TransactionTimeout
                | PriceDataUnavailable
                | ApiRateLimited
        )
    }

    pub fn severity(self) -> Severity {
        use ErrorCode::*;
        match self {
            NetworkCongestion => Severity::Low,
            InvalidSignalFormat | InvalidPriceLevels | SignalExpired | InvalidPositionPercentage
            | PositionSizeTooSmall | PositionSizeTooLarge | TokenNotFound => Severity::Medium,
            UnsupportedNetwork | SafeNotDeployed | SafeInvalidConfiguration
            | SafeInsufficientBalance | InsufficientStablecoinBalance | SwapQuoteFailed
            | InsufficientLiquidity | SlippageTooHigh | RpcConnectionFailed
            | TransactionTimeout | PriceDataUnavailable | ApiRateLimited => Severity::High,
            SwapExecutionFailed | ConfigurationError | SystemShutdown | UnknownError => {
                Severity::Critical
            }
        }
    }

    /// Whether the caller can fix the condition themselves.
    pub fn actionable(self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            InvalidSignalFormat
                | InvalidPriceLevels
                | SignalExpired
                | TokenNotFound
                | UnsupportedNetwork
                | SafeNotDeployed
                | SafeInvalidConfiguration
                | SafeInsufficientBalance
                | InsufficientStablecoinBalance
                | InvalidPositionPercentage
                | PositionSizeTooSmall
                | PositionSizeTooLarge
                | SlippageTooHigh
        )
    }

    pub fn recommendation(self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidSignalFormat => "check the signal payload shape and required fields",
            InvalidPriceLevels => "ensure stop-loss, entry and take-profits are ordered for the side",
            SignalExpired => "submit a signal with a deadline in the future",
            TokenNotFound => "verify the token symbol or provide a contract address",
            UnsupportedNetwork => "use a network with a configured RPC endpoint",
            SafeNotDeployed => "deploy the wallet on the target network and activate it",
            SafeInvalidConfiguration => "check the wallet owners and signing threshold",
            SafeInsufficientBalance => "fund the wallet with native gas tokens",
            InsufficientStablecoinBalance => "top up the wallet's stablecoin balance",
            InvalidPositionPercentage => "use a position percentage between 1 and 80",
            PositionSizeTooSmall => "increase the position percentage or wallet balance",
            PositionSizeTooLarge => "reduce the requested position percentage",
            SwapQuoteFailed => "retry shortly; the aggregator may be degraded",
            SwapExecutionFailed => "inspect the transaction on a block explorer",
            InsufficientLiquidity => "reduce the trade size or pick a deeper market",
            SlippageTooHigh => "raise the slippage tolerance or reduce size",
            RpcConnectionFailed => "retry shortly; the RPC endpoint is unreachable",
            NetworkCongestion => "the network is congested; execution may be delayed",
            TransactionTimeout => "the transaction was not confirmed in time; check its status",
            PriceDataUnavailable => "retry shortly; price sources are degraded",
            ApiRateLimited => "slow down; an upstream API is rate-limiting",
            ConfigurationError => "fix the service configuration and restart",
            SystemShutdown => "the service is shutting down; resubmit later",
            UnknownError => "contact the operator with the correlation id",
        }
    }
}

// ---------------------------------------------------------------------------
// TradeError
// ---------------------------------------------------------------------------

/// Structured context threaded with every error. All fields optional except
/// the component that raised it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub service: &'static str,
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct TradeError {
    pub code: ErrorCode,
    pub message: String,
    pub context: ErrorContext,
}

impl TradeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn in_op(mut self, service: &'static str, operation: &'static str) -> Self {
        self.context.service = service;
        self.context.operation = operation;
        self
    }

    pub fn with_signal(mut self, signal_id: &str) -> Self {
        self.context.signal_id = Some(signal_id.to_string());
        self
    }

    pub fn with_trade(mut self, trade_id: Uuid) -> Self {
        self.context.trade_id = Some(trade_id);
        self
    }

    pub fn with_wallet(mut self, wallet: Address) -> Self {
        self.context.wallet = Some(wallet);
        self
    }

    pub fn with_network(mut self, network: &NetworkKey) -> Self {
        self.context.network = Some(network.clone());
        self
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.context.symbol = Some(symbol.to_string());
        self
    }

    pub fn retriable(&self) -> bool {
        self.code.retriable()
    }

    /// Compact context summary for user-visible rejections. Never includes
    /// raw RPC traces.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref s) = self.context.symbol {
            parts.push(s.clone());
        }
        if let Some(ref n) = self.context.network {
            parts.push(n.to_string());
        }
        if let Some(w) = self.context.wallet {
            parts.push(short_addr(&format!("{w:#x}")));
        }
        if let Some(ref s) = self.context.signal_id {
            parts.push(s.clone());
        }
        parts.join(" ")
    }
}

// ---------------------------------------------------------------------------
// HTTP mapping
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    code: ErrorCode,
    error: String,
    recommendation: &'static str,
    context: String,
}

impl IntoResponse for TradeError {
    fn into_response(self) -> Response {
        let status = match self.code.kind() {
            ErrorKind::Validation | ErrorKind::InsufficientFunds => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Network => StatusCode::BAD_GATEWAY,
            ErrorKind::System => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.code.severity() >= Severity::High {
            tracing::error!(code = ?self.code, error = %self.message, "Request failed");
        }

        (
            status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                error: self.message.clone(),
                recommendation: self.code.recommendation(),
                context: self.summary(),
            }),
        )
            .into_response()
    }
}

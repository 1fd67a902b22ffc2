use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A structured error suitable for printing to a caller as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ErrorReport {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Failures surfaced by the swap core. Every variant is terminal for the current attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no signer connected")]
    SignerUnavailable,

    #[error("owner {owner} is not the connected signer {signer}")]
    SignerMismatch { owner: String, signer: String },

    #[error("network switch rejected: {0}")]
    NetworkSwitchRejected(String),

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: String,
        available: String,
    },

    #[error("approval failed: {0}")]
    ApprovalFailed(String),

    #[error("transaction rejected by user")]
    UserRejected,

    #[error("insufficient funds for gas or value")]
    InsufficientFunds,

    #[error("output below minimum; raise slippage tolerance or reduce the amount")]
    SlippageExceeded,

    #[error("timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(String),

    #[error("index api error: {0}")]
    IndexApiError(String),

    #[error("rpc error: {0}")]
    RpcError(String),
}

impl SwapError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::SignerUnavailable => "signer_unavailable",
            Self::SignerMismatch { .. } => "signer_mismatch",
            Self::NetworkSwitchRejected(_) => "network_switch_rejected",
            Self::QuoteUnavailable(_) => "quote_unavailable",
            Self::UnknownToken(_) => "unknown_token",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::ApprovalFailed(_) => "approval_failed",
            Self::UserRejected => "user_rejected",
            Self::InsufficientFunds => "insufficient_funds",
            Self::SlippageExceeded => "slippage_exceeded",
            Self::ConfirmationTimeout(_) => "confirmation_timeout",
            Self::IndexApiError(_) => "index_api_error",
            Self::RpcError(_) => "rpc_error",
        }
    }

    /// User cancellations are reported, but they are not failures of the system.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserRejected)
    }
}

impl From<SwapError> for ErrorReport {
    fn from(e: SwapError) -> Self {
        let code = e.code();
        match e {
            SwapError::InsufficientBalance {
                requested,
                available,
            } => Self::new(code, "insufficient balance").with_data(serde_json::json!({
                "requested": requested,
                "available": available,
            })),
            SwapError::UserRejected => Self::new(code, "transaction cancelled in wallet"),
            other => Self::new(code, other.to_string()),
        }
    }
}

/// Errors reported by the chain-facing seams (RPC provider and wallet).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("no signer connected")]
    SignerUnavailable,

    #[error("user rejected the request: {0}")]
    UserRejected(String),

    #[error("chain {0} is not registered with the wallet")]
    UnknownChain(u64),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("timed out waiting for receipt of {0}")]
    Timeout(String),

    #[error("rpc: {0}")]
    Rpc(String),
}

impl GatewayError {
    /// Sort a raw provider/wallet failure message into a gateway error.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("action_rejected")
            || lower.contains("code 4001")
        {
            Self::UserRejected(msg)
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds(msg)
        } else if lower.contains("execution reverted") || lower.contains("revert") {
            Self::Reverted(msg)
        } else {
            Self::Rpc(msg)
        }
    }

    pub fn from_report(err: &eyre::Report) -> Self {
        Self::from_message(format!("{err:#}"))
    }
}

/// Classify a failure from the dispatch or confirmation of a swap transaction.
pub fn classify_swap_failure(err: GatewayError) -> SwapError {
    match err {
        GatewayError::SignerUnavailable => SwapError::SignerUnavailable,
        GatewayError::UserRejected(_) => SwapError::UserRejected,
        GatewayError::InsufficientFunds(_) => SwapError::InsufficientFunds,
        GatewayError::Reverted(reason) if reason.contains("INSUFFICIENT_OUTPUT_AMOUNT") => {
            SwapError::SlippageExceeded
        }
        GatewayError::Reverted(reason) => SwapError::RpcError(format!("reverted: {reason}")),
        GatewayError::Timeout(hash) => SwapError::ConfirmationTimeout(hash),
        GatewayError::UnknownChain(id) => {
            SwapError::NetworkSwitchRejected(format!("chain {id} is unknown to the wallet"))
        }
        GatewayError::Rpc(msg) if msg.contains("INSUFFICIENT_OUTPUT_AMOUNT") => {
            SwapError::SlippageExceeded
        }
        GatewayError::Rpc(msg) => SwapError::RpcError(msg),
    }
}

//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so degraded scans can be traced
//! back to the RPC outcome or orchestration step that caused them.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: ledger RPC errors (never escape SafeCall)
//! - SCAN_xxx: orchestration errors (never escape `RiskScanner::scan`)
//! - CFG_xxx: configuration errors
//! - BLOCKLIST_xxx: fallback lookup errors

use std::fmt;
use std::sync::Arc;

/// Application-wide error type
#[derive(Debug, Clone)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error (shared so coalesced waiters can clone it)
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors
    // ============================================
    /// RPC connection failed
    RpcConnectionFailed,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,
    /// RPC returned error response
    RpcError,
    /// Invalid RPC response
    RpcInvalidResponse,

    // ============================================
    // Scan Errors
    // ============================================
    /// Scan exceeded its deadline after acquiring the scan mutex
    ScanTimeout,
    /// Uncaught failure while orchestrating a scan
    ScanFailure,
    /// Pre-scan skipped because the address keeps failing
    ScanSkipped,
    /// Call refused because its scan already passed the deadline
    ScanCancelled,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Missing API key
    ConfigMissingApiKey,

    // ============================================
    // Input / Collaborator Errors
    // ============================================
    /// Address is empty or malformed
    InvalidAddress,
    /// Blocklist lookup failed
    BlocklistUnavailable,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::ScanTimeout => "SCAN_TIMEOUT",
            Self::ScanFailure => "SCAN_FAILED",
            Self::ScanSkipped => "SCAN_SKIPPED",
            Self::ScanCancelled => "SCAN_CANCELLED",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigMissingApiKey => "CFG_MISSING_API_KEY",

            Self::InvalidAddress => "ADDRESS_INVALID",
            Self::BlocklistUnavailable => "BLOCKLIST_UNAVAILABLE",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout | Self::RpcRateLimited | Self::RpcConnectionFailed | Self::ScanTimeout
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// RPC connection failed
    pub fn rpc_connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcConnectionFailed, msg)
    }

    /// RPC timeout
    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    /// RPC rate limited
    pub fn rpc_rate_limited() -> Self {
        Self::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)")
    }

    /// RPC returned an error object
    pub fn rpc_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcError, msg)
    }

    /// RPC response could not be decoded
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    /// Scan deadline exceeded
    pub fn scan_timeout(deadline_secs: u64) -> Self {
        Self::new(
            ErrorCode::ScanTimeout,
            format!("Scan exceeded {}s deadline", deadline_secs),
        )
    }

    /// Ledger call refused after the scan was abandoned
    pub fn scan_cancelled(label: &str) -> Self {
        Self::new(
            ErrorCode::ScanCancelled,
            format!("{} skipped, scan past its deadline", label),
        )
    }

    /// Orchestration failure
    pub fn scan_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ScanFailure, msg)
    }

    /// Invalid address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Missing API key
    pub fn missing_api_key(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingApiKey,
            format!("Missing API key: {}", key_name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(key: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {}", key, value),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::new(
                ErrorCode::RpcConnectionFailed,
                format!("Connection failed: {}", err),
            )
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            Self::rpc_rate_limited()
        } else {
            Self::new(ErrorCode::RpcError, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::new(ErrorCode::ScanFailure, "Scan task panicked")
        } else {
            Self::new(ErrorCode::ScanFailure, "Scan task cancelled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::rpc_timeout("Connection timed out");
        assert_eq!(err.code, ErrorCode::RpcTimeout);
        assert_eq!(err.code_str(), "RPC_TIMEOUT");
        assert_eq!(err.to_string(), "[RPC_TIMEOUT] Connection timed out");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::RpcTimeout.is_retryable());
        assert!(ErrorCode::RpcRateLimited.is_retryable());
        assert!(!ErrorCode::RpcInvalidResponse.is_retryable());
        assert!(!ErrorCode::BlocklistUnavailable.is_retryable());
    }

    #[test]
    fn test_clone_keeps_source() {
        let parse = serde_json::from_str::<u64>("not json").unwrap_err();
        let err = AppError::from(parse);
        let cloned = err.clone();
        assert_eq!(cloned.code, ErrorCode::RpcInvalidResponse);
        assert!(std::error::Error::source(&cloned).is_some());
    }
}

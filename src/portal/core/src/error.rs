//! Error handling for the portal session core.
//!
//! This module provides:
//! - A single [`PortalError`] type with a machine-readable [`ErrorCode`]
//! - User-facing messages separated from internal detail
//! - Severity-aware logging through `tracing`
//! - Error metrics through the `metrics` facade
//! - Boundary errors for the external collaborators ([`GatewayError`],
//!   [`StoreError`]) and their conversion into [`PortalError`]
//!
//! Public operations on the session manager never let a `PortalError`
//! escape as a panic; they return it as a structured result or publish it as
//! a lifecycle event.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::telemetry::metrics::ERRORS_TOTAL;
use crate::telemetry::SensitiveFieldRedactor;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for portal operations.
pub type Result<T> = std::result::Result<T, PortalError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and are carried inside lifecycle event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration Errors (1000-1099)
    ConfigurationError,
    InvalidConfiguration,

    // Gateway Errors (2000-2099)
    GatewayUnavailable,
    NotInitialized,

    // Credential Errors (3000-3099)
    CredentialError,
    InvalidInput,

    // Resolution Errors (4000-4099)
    ResolutionError,

    // Routing Errors (5000-5099)
    RoutingAmbiguity,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ConfigurationError => 1000,
            Self::InvalidConfiguration => 1002,

            Self::GatewayUnavailable => 2000,
            Self::NotInitialized => 2001,

            Self::CredentialError => 3000,
            Self::InvalidInput => 3001,

            Self::ResolutionError => 4000,

            Self::RoutingAmbiguity => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Check if this error may succeed on a later attempt.
    ///
    /// Only gateway availability is retried, and only by the caller of
    /// `initialize()` through its retry policy.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "configuration",
            2000..=2099 => "gateway",
            3000..=3099 => "credential",
            4000..=4099 => "resolution",
            5000..=5099 => "routing",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// User errors (bad credentials, bad input)
    Low,
    /// Expected operational outcomes (no dashboard, early calls)
    Medium,
    /// Collaborator failures (gateway, role store)
    High,
    /// The portal cannot start
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::CredentialError | ErrorCode::InvalidInput => Self::Low,

            ErrorCode::RoutingAmbiguity | ErrorCode::NotInitialized => Self::Medium,

            ErrorCode::GatewayUnavailable | ErrorCode::ResolutionError => Self::High,

            ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration
            | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (principal, membership, page)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the portal session core.
#[derive(Error, Debug)]
pub struct PortalError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to show inline or on the login page)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl PortalError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Required static configuration is missing or malformed.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
            .with_details(ErrorDetails::new().with_suggestion("Contact support"))
    }

    /// The identity gateway could not be reached or built.
    pub fn gateway_unavailable(internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::GatewayUnavailable,
            "Authentication service is unavailable",
            internal,
        )
    }

    /// An operation needed the gateway handle before it was acquired.
    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::NotInitialized, "Identity gateway not available")
    }

    /// The gateway rejected a credential operation.
    pub fn credential(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::CredentialError, message)
    }

    /// Input was rejected before contacting the gateway.
    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Role lookup failed for a principal.
    pub fn resolution(principal_id: impl Into<String>, internal: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ResolutionError,
            "Failed to load organization roles",
            internal,
        )
        .with_details(ErrorDetails::new().with_entity("principal", principal_id))
    }

    /// An authenticated principal has no role with a dashboard.
    pub fn routing_ambiguity(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::RoutingAmbiguity, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Context pairs with sensitive keys and token-shaped values masked.
    pub fn redacted_context(&self) -> Vec<(String, String)> {
        let redactor = SensitiveFieldRedactor::global();
        let mut pairs: Vec<(String, String)> = self
            .details
            .context
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), redactor.redact(key, &value))
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Serializable summary for event payloads and outcomes.
    pub fn summary(&self) -> ErrorSummary {
        ErrorSummary {
            code: self.code,
            message: self.user_message.to_string(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    context = ?self.redacted_context(),
                    entity_id = ?self.details.entity_id,
                    suggested_action = ?self.details.suggested_action,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    context = ?self.redacted_context(),
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            ERRORS_TOTAL,
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Summary
// ═══════════════════════════════════════════════════════════════════════════════

/// Cloneable, serializable view of a [`PortalError`].
///
/// Carried by lifecycle events and initialization outcomes, where the full
/// error (with its boxed source) cannot be shared between subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&PortalError> for ErrorSummary {
    fn from(error: &PortalError) -> Self {
        error.summary()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Boundary Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors reported by an identity gateway implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway could not be reached or constructed.
    #[error("Identity gateway unreachable: {0}")]
    Unavailable(String),

    /// Email/password pair was not accepted.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// The gateway refused the request with its own message.
    #[error("{0}")]
    Rejected(String),
}

impl From<GatewayError> for PortalError {
    fn from(error: GatewayError) -> Self {
        match &error {
            GatewayError::Unavailable(reason) => {
                PortalError::gateway_unavailable(reason.clone()).with_source(error)
            }
            GatewayError::InvalidCredentials => {
                PortalError::credential("Invalid credentials").with_source(error)
            }
            GatewayError::Rejected(message) => {
                PortalError::credential(message.clone()).with_source(error)
            }
        }
    }
}

/// Errors reported by an organization/role store implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Role store unreachable: {0}")]
    Unavailable(String),

    #[error("Role store query failed: {0}")]
    Query(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<config::ConfigError> for PortalError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::InvalidConfiguration,
            "Configuration could not be loaded",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

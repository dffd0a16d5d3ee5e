//! Unified error envelope.
//!
//! Single error type for the whole gateway. Providers never define their own
//! error enums; everything that can go wrong is one of the kinds below, with
//! native error type/code passed through in the detail record.

use serde::{Deserialize, Serialize};

use super::common::{Provider, RequestType};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Non-2xx from the upstream provider.
    ProviderApiError,
    /// Malformed unified request; never reaches the wire.
    OperationError,
    /// Capability not implemented by the selected provider.
    UnsupportedOperation,
    /// Caller cancelled the request context.
    RequestCancelled,
    /// Deadline exceeded.
    RequestTimeout,
    /// Encode failure building a native payload.
    SerializationError,
    /// Decode failure reading a native response.
    DecodeError,
    /// Token fetch or key-configuration validation failure.
    AuthError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProviderApiError => "provider_api_error",
            ErrorKind::OperationError => "operation_error",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::RequestCancelled => "request_cancelled",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::SerializationError => "serialization_error",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::AuthError => "auth_error",
        }
    }
}

/// Native error payload carried alongside the normalized kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Provider-native error type, e.g. `invalid_request_error` or
    /// `ValidationException`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Raw upstream body, captured on demand and capped at 512 KiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<serde_json::Value>,
}

/// The gateway error envelope.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{}: {}", .kind.as_str(), .error.message)]
pub struct GatewayError {
    pub kind: ErrorKind,
    /// True when the failure originated inside the gateway rather than the
    /// provider (validation, serialization, gating, cancellation).
    pub is_gateway_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_requested: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
}

impl GatewayError {
    fn new(kind: ErrorKind, is_gateway_error: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            is_gateway_error,
            status_code: None,
            event_id: None,
            error: ErrorDetail {
                message: message.into(),
                ..Default::default()
            },
            provider: None,
            model_requested: None,
            request_type: None,
        }
    }

    /// Malformed unified request. Never reaches the wire.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationError, true, message)
    }

    /// Capability gate: the provider does not implement this operation.
    pub fn unsupported(provider: Provider, model: impl Into<String>, request_type: RequestType) -> Self {
        let mut err = Self::new(
            ErrorKind::UnsupportedOperation,
            true,
            format!(
                "operation {} is not supported by provider {}",
                request_type, provider
            ),
        );
        err.provider = Some(provider);
        err.model_requested = Some(model.into());
        err.request_type = Some(request_type);
        err
    }

    /// Non-2xx upstream response.
    pub fn provider_api(provider: Provider, status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::ProviderApiError, false, message);
        err.provider = Some(provider);
        err.status_code = Some(status);
        err
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthError, true, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationError, true, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeError, true, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::RequestCancelled, true, "request cancelled")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::RequestTimeout, true, "request timed out")
    }

    /// Attach the native error type (e.g. `invalid_request_error`).
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error.error_type = Some(error_type.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.error.param = Some(param.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_inner(mut self, inner: serde_json::Value) -> Self {
        self.error.inner_error = Some(inner);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_requested = Some(model.into());
        self
    }

    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    /// Fill provider/model/request-type metadata without overwriting values
    /// a deeper layer already stamped.
    pub fn contextualize(
        mut self,
        provider: &Provider,
        model: &str,
        request_type: RequestType,
    ) -> Self {
        if self.provider.is_none() {
            self.provider = Some(provider.clone());
        }
        if self.model_requested.is_none() {
            self.model_requested = Some(model.to_string());
        }
        if self.request_type.is_none() {
            self.request_type = Some(request_type);
        }
        self
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return GatewayError::timeout();
        }
        let status = err.status().map(|s| s.as_u16());
        let mut gateway_err = GatewayError::new(ErrorKind::ProviderApiError, false, err.to_string());
        gateway_err.status_code = status;
        gateway_err
    }
}

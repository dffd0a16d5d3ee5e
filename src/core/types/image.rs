//! Image-generation types and size parsing.

use serde::{Deserialize, Serialize};

use super::common::{is_default_extra, Provider, ResponseExtraFields};
use super::errors::GatewayError;

/// Parsed `"WIDTHxHEIGHT"` size string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    /// Parse `"1024x768"`. Missing or non-integer components are a
    /// client-side error and never reach the wire.
    pub fn parse(size: &str) -> Result<Self, GatewayError> {
        let mut parts = size.splitn(2, 'x');
        let width = parts.next().unwrap_or("");
        let height = parts.next().unwrap_or("");
        let width: u32 = width
            .parse()
            .map_err(|_| GatewayError::operation("invalid size format"))?;
        let height: u32 = height
            .parse()
            .map_err(|_| GatewayError::operation("invalid size format"))?;
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Normalize an output-format extension. The only alias in the wild is
/// `jpeg` for `jpg`.
pub fn normalize_output_format(format: &str) -> String {
    if format.eq_ignore_ascii_case("jpeg") {
        "jpg".to_string()
    } else {
        format.to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    /// `"WIDTHxHEIGHT"`, validated before any HTTP call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_steps: Option<u32>,
    #[serde(flatten, default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub provider: Provider,
    pub model: String,
    /// The prompt.
    pub input: String,
    #[serde(default)]
    pub params: ImageParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::errors::ErrorKind;

    #[test]
    fn test_size_round_trip() {
        let size = ImageSize::parse("1024x768").unwrap();
        assert_eq!(size, ImageSize { width: 1024, height: 768 });
        assert_eq!(size.to_string(), "1024x768");
    }

    #[test]
    fn test_size_missing_component() {
        let err = ImageSize::parse("1024").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationError);
        assert_eq!(err.error.message, "invalid size format");
    }

    #[test]
    fn test_size_non_integer() {
        assert!(ImageSize::parse("1024xtall").is_err());
        assert!(ImageSize::parse("widex768").is_err());
        assert!(ImageSize::parse("x").is_err());
        assert!(ImageSize::parse("").is_err());
    }

    #[test]
    fn test_output_format_normalization() {
        assert_eq!(normalize_output_format("jpeg"), "jpg");
        assert_eq!(normalize_output_format("JPEG"), "jpg");
        assert_eq!(normalize_output_format("png"), "png");
        assert_eq!(normalize_output_format("WEBP"), "webp");
    }
}

//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::core::types::errors::GatewayError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub struct SigV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token,
            region: region.into(),
            service: "bedrock".to_string(),
        }
    }

    /// Sign a request. Returns every header to send, including the
    /// canonical ones the signature covers.
    pub fn sign_request(
        &self,
        method: &str,
        url: &str,
        extra_headers: &[(&str, String)],
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, GatewayError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| GatewayError::operation(format!("invalid URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| GatewayError::operation("missing host in URL"))?;
        let path = parsed.path();
        let query = parsed.query().unwrap_or("");

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        // BTreeMap gives the case-insensitive-sorted order SigV4 requires,
        // keys already lowercased.
        let mut canonical: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in extra_headers {
            canonical.insert(name.to_lowercase(), value.trim().to_string());
        }
        canonical.insert("host".to_string(), host.to_string());
        canonical.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.session_token {
            canonical.insert("x-amz-security-token".to_string(), token.clone());
        }

        let canonical_headers = canonical
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        let signed_headers = canonical.keys().cloned().collect::<Vec<_>>().join(";");

        let payload_hash = hex::encode(Sha256::digest(body));
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n\n{}\n{}",
            method.to_uppercase(),
            path,
            query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp)?;
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers: Vec<(String, String)> = canonical
            .into_iter()
            .filter(|(k, _)| k != "host")
            .collect();
        headers.push(("authorization".to_string(), authorization));
        Ok(headers)
    }

    fn calculate_signature(
        &self,
        string_to_sign: &str,
        date_stamp: &str,
    ) -> Result<String, GatewayError> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
        Ok(hex::encode(signature))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::auth(format!("HMAC key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hmac_sha256_known_vector() {
        let result = hmac_sha256(b"key", b"message").unwrap();
        assert_eq!(
            hex::encode(result),
            "6e9ef29b75fffc5b7abae527d58fdadb2fe42e7219011e917a9c6e0c3d5e4c3b"
        );
    }

    #[test]
    fn test_sign_request_produces_required_headers() {
        let signer = SigV4Signer::new("AKIATEST", "testsecret", None, "us-east-1");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let headers = signer
            .sign_request(
                "POST",
                "https://bedrock-runtime.us-east-1.amazonaws.com/model/test/converse",
                &[("content-type", "application/json".to_string())],
                b"{}",
                timestamp,
            )
            .unwrap();

        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"authorization"));
        assert!(names.contains(&"x-amz-date"));
        assert!(!names.contains(&"host"));

        let auth = &headers.iter().find(|(k, _)| k == "authorization").unwrap().1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIATEST/20240101/us-east-1/bedrock/aws4_request"));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date"));
    }

    #[test]
    fn test_signature_deterministic() {
        let signer = SigV4Signer::new("AKIATEST", "testsecret", None, "us-east-1");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let sign = |body: &[u8]| {
            signer
                .sign_request(
                    "POST",
                    "https://bedrock-runtime.us-east-1.amazonaws.com/model/test/converse",
                    &[],
                    body,
                    timestamp,
                )
                .unwrap()
                .into_iter()
                .find(|(k, _)| k == "authorization")
                .unwrap()
                .1
        };
        assert_eq!(sign(b"{}"), sign(b"{}"));
        assert_ne!(sign(b"{}"), sign(b"{\"a\":1}"));
    }

    #[test]
    fn test_session_token_included() {
        let signer = SigV4Signer::new("AK", "SK", Some("TOKEN".to_string()), "eu-west-1");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let headers = signer
            .sign_request("POST", "https://example.amazonaws.com/x", &[], b"", timestamp)
            .unwrap();
        assert!(headers
            .iter()
            .any(|(k, v)| k == "x-amz-security-token" && v == "TOKEN"));
    }
}

//! Authentication for the trigger endpoints.
//!
//! The mode comes from `TriggerConfig::auth_mode`; the same secret is used as
//! the HMAC key or the bearer token value.

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;

use autopost_core::config::{TriggerAuthMode, TriggerConfig};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-autopost-signature";

/// Check a request against the configured mode. Returns a ready 401 reply on failure.
pub fn authorize(
    cfg: &TriggerConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), (StatusCode, Json<Value>)> {
    let checked = match cfg.auth_mode {
        TriggerAuthMode::HmacSha256 => verify_hmac_sha256(headers, body, cfg.secret.as_deref()),
        TriggerAuthMode::BearerToken => verify_bearer_token(headers, cfg.secret.as_deref()),
        TriggerAuthMode::None => Ok(()),
    };
    checked.map_err(|reason| auth_error(&reason))
}

/// Verify `sha256=<hex>` in X-Autopost-Signature against the raw body.
fn verify_hmac_sha256(headers: &HeaderMap, body: &[u8], secret: Option<&str>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured".to_string())?;

    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Autopost-Signature header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Autopost-Signature header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Autopost-Signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, secret: Option<&str>) -> Result<(), String> {
    let expected = secret.ok_or_else(|| "no bearer token configured".to_string())?;

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if tokens_match(token, expected) {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

/// Constant-time token comparison: both sides are reduced to a MAC under the
/// same key and checked with `verify_slice`, so neither length nor a shared
/// prefix shows up in the timing.
fn tokens_match(candidate: &str, expected: &str) -> bool {
    const KEY: &[u8] = b"autopost-bearer-token";
    let digest = |token: &str| {
        let mut mac = HmacSha256::new_from_slice(KEY).ok()?;
        mac.update(token.as_bytes());
        Some(mac)
    };
    match (digest(candidate), digest(expected)) {
        (Some(candidate), Some(expected)) => expected
            .verify_slice(&candidate.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "trigger authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(mode: TriggerAuthMode, secret: Option<&str>) -> TriggerConfig {
        TriggerConfig {
            auth_mode: mode,
            secret: secret.map(str::to_string),
            ..TriggerConfig::default()
        }
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn with_header(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn valid_signature_is_accepted() {
        let cfg = config(TriggerAuthMode::HmacSha256, Some("s3cret"));
        let body = br#"{"source":"cron"}"#;
        let headers = with_header(SIGNATURE_HEADER, &sign("s3cret", body));
        assert!(authorize(&cfg, &headers, body).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let cfg = config(TriggerAuthMode::HmacSha256, Some("s3cret"));
        let headers = with_header(SIGNATURE_HEADER, &sign("s3cret", b"original"));
        let (status, _) = authorize(&cfg, &headers, b"tampered").unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_signature_is_rejected() {
        let cfg = config(TriggerAuthMode::HmacSha256, Some("s3cret"));
        assert!(verify_hmac_sha256(&HeaderMap::new(), b"", cfg.secret.as_deref())
            .unwrap_err()
            .contains("missing"));
    }

    #[test]
    fn bearer_token_must_match() {
        let cfg = config(TriggerAuthMode::BearerToken, Some("tok"));
        assert!(authorize(&cfg, &with_header("authorization", "Bearer tok"), b"").is_ok());
        assert!(authorize(&cfg, &with_header("authorization", "Bearer nope"), b"").is_err());
        assert!(authorize(&cfg, &with_header("authorization", "Basic tok"), b"").is_err());
    }

    #[test]
    fn token_comparison_handles_prefixes_and_lengths() {
        assert!(tokens_match("tok", "tok"));
        assert!(!tokens_match("to", "tok"));
        assert!(!tokens_match("tokk", "tok"));
        assert!(!tokens_match("", "tok"));
    }

    #[test]
    fn unset_secret_fails_closed() {
        let cfg = config(TriggerAuthMode::BearerToken, None);
        assert!(authorize(&cfg, &with_header("authorization", "Bearer x"), b"").is_err());
    }

    #[test]
    fn none_mode_accepts_anything() {
        let cfg = config(TriggerAuthMode::None, None);
        assert!(authorize(&cfg, &HeaderMap::new(), b"whatever").is_ok());
    }
}

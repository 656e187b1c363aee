//! Webhook signature verification and event envelope parsing.
//!
//! The processor signs each delivery with `Stripe-Signature:
//! t=<unix>,v1=<hmac-sha256 of "{t}.{payload}">`. Signatures older than the
//! tolerance window are rejected to stop replays.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Checks a delivery's signature header against the endpoint secret.
///
/// Returns `Ok(false)` for a well-formed header that fails verification
/// (wrong secret, tampered payload, stale timestamp) and `Err` only when the
/// header itself is malformed.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<bool, AppError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| {
                    AppError::ValidationError("Malformed signature timestamp".to_string())
                })?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        AppError::ValidationError("Signature header missing timestamp".to_string())
    })?;
    if signatures.is_empty() {
        return Err(AppError::ValidationError(
            "Signature header missing v1 signature".to_string(),
        ));
    }

    if (now_unix - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Ok(false);
    }

    for signature in signatures {
        let Ok(decoded) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::InternalServerError("Invalid webhook secret".to_string()))?;
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        // verify_slice is constant-time over the digest
        if mac.verify_slice(&decoded).is_ok() {
            return Ok(true);
        }
    }

    Ok(false)
}

/// The processor's event envelope. `object` stays raw JSON; each handler
/// picks out the fields it needs.
#[derive(Debug, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

pub fn parse_event(payload: &[u8]) -> Result<Event, AppError> {
    serde_json::from_slice(payload)
        .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn header_for(payload: &[u8], secret: &str, timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, sign(payload, secret, timestamp))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        let header = header_for(payload, SECRET, now);

        assert!(verify_signature(payload, &header, SECRET, now).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        let header = header_for(payload, "wrong_secret", now);

        assert!(!verify_signature(payload, &header, SECRET, now).unwrap());
    }

    #[test]
    fn test_modified_payload_rejected() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let tampered = br#"{"type":"payment_intent.succeeded","hacked":true}"#;
        let now = Utc::now().timestamp();
        let header = header_for(payload, SECRET, now);

        assert!(!verify_signature(tampered, &header, SECRET, now).unwrap());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        // 10 minutes old, beyond the 5-minute tolerance
        let stale = now - 600;
        let header = header_for(payload, SECRET, stale);

        assert!(!verify_signature(payload, &header, SECRET, now).unwrap());
    }

    #[test]
    fn test_second_v1_signature_is_checked() {
        let payload = br#"{"type":"charge.refunded"}"#;
        let now = Utc::now().timestamp();
        let good = sign(payload, SECRET, now);
        let header = format!("t={},v1=deadbeef,v1={}", now, good);

        assert!(verify_signature(payload, &header, SECRET, now).unwrap());
    }

    #[test]
    fn test_missing_timestamp_errors() {
        let payload = br#"{}"#;
        let now = Utc::now().timestamp();
        assert!(verify_signature(payload, "v1=abc123", SECRET, now).is_err());
    }

    #[test]
    fn test_missing_signature_errors() {
        let payload = br#"{}"#;
        let now = Utc::now().timestamp();
        let header = format!("t={}", now);
        assert!(verify_signature(payload, &header, SECRET, now).is_err());
    }

    #[test]
    fn test_garbage_header_errors() {
        let payload = br#"{}"#;
        let now = Utc::now().timestamp();
        assert!(verify_signature(payload, "garbage", SECRET, now).is_err());
        assert!(verify_signature(payload, "", SECRET, now).is_err());
    }

    #[test]
    fn test_event_envelope_parsing() {
        let payload = br#"{
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123", "metadata": { "transaction_id": "abc" } } }
        }"#;

        let event = parse_event(payload).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object["id"], "pi_123");
    }

    #[test]
    fn test_malformed_payload_errors() {
        assert!(parse_event(b"not json").is_err());
    }
}

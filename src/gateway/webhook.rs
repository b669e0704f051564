use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::gateway::GatewayEvent;

type HmacSha256 = Hmac<Sha256>;

/// Raw webhook envelope: `{"type": "payment.updated", "object": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    object: serde_json::Value,
}

/// Verify the HMAC-SHA256 signature a processor attaches to its webhook
/// deliveries. Accepts the bare hex digest or the `sha256=` prefixed form;
/// comparison is constant-time.
pub fn verify_signature(secret: &str, payload: &str, signature: &str) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("webhook secret cannot be empty".to_string()))?;
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let provided = signature.strip_prefix("sha256=").unwrap_or(signature);
    if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
        return Err(AppError::Validation("webhook signature mismatch".to_string()));
    }
    Ok(())
}

/// Parse a webhook payload into a [`GatewayEvent`]. Unrecognized event
/// types come back as [`GatewayEvent::Unknown`] rather than an error so the
/// reconciler can log and move on.
pub fn parse_event(payload: &str) -> Result<GatewayEvent> {
    let envelope: Envelope = serde_json::from_str(payload)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {}", e)))?;

    let event = match envelope.event_type.as_str() {
        "payment.created" => GatewayEvent::PaymentCreated(parse_object(envelope.object)?),
        "payment.updated" => GatewayEvent::PaymentUpdated(parse_object(envelope.object)?),
        "refund.created" => GatewayEvent::RefundCreated(parse_object(envelope.object)?),
        "refund.updated" => GatewayEvent::RefundUpdated(parse_object(envelope.object)?),
        _ => GatewayEvent::Unknown { event_type: envelope.event_type },
    };
    Ok(event)
}

/// Verify, then parse. The entry point for raw webhook deliveries.
pub fn verified_event(secret: &str, payload: &str, signature: &str) -> Result<GatewayEvent> {
    verify_signature(secret, payload, signature)?;
    parse_event(payload)
}

fn parse_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T> {
    serde_json::from_value(object)
        .map_err(|e| AppError::Validation(format!("malformed webhook object: {}", e)))
}

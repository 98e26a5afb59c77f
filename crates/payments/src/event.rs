//! Payment provider events.

use std::collections::HashMap;

use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReconcileError, Result};

/// Event type sent when a payment was captured.
pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Event type sent when a payment attempt was declined.
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";

const ORDER_ID_KEY: &str = "orderId";
const USER_ID_KEY: &str = "userId";

/// What a payment event means for the order engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    Succeeded,
    Failed,
    /// Any type the engine does not act on.
    Other,
}

/// A verified event from the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider-assigned event id.
    pub id: String,

    /// Provider event type, e.g. `payment_intent.succeeded`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// String metadata attached at checkout, carrying `orderId` and `userId`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

#[derive(Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl PaymentEvent {
    /// Creates a new event.
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            metadata,
        }
    }

    /// Creates a `payment_intent.succeeded` event for an order.
    pub fn succeeded(id: impl Into<String>, order_id: OrderId, user_id: UserId) -> Self {
        Self::new(id, PAYMENT_SUCCEEDED, order_metadata(order_id, user_id))
    }

    /// Creates a `payment_intent.payment_failed` event for an order.
    pub fn failed(id: impl Into<String>, order_id: OrderId, user_id: UserId) -> Self {
        Self::new(id, PAYMENT_FAILED, order_metadata(order_id, user_id))
    }

    /// Decodes a provider payload.
    ///
    /// Metadata is read from `data.object.metadata` when present, otherwise
    /// from a top-level `metadata` object. Numeric metadata values are
    /// accepted and kept in their decimal form.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| ReconcileError::MalformedEvent(e.to_string()))?;

        let metadata = raw
            .data
            .map(|data| data.object.metadata)
            .or(raw.metadata)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                Value::Number(n) => Some((key, n.to_string())),
                _ => None,
            })
            .collect();

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            metadata,
        })
    }

    /// Classifies the event type.
    pub fn kind(&self) -> PaymentEventKind {
        match self.event_type.as_str() {
            PAYMENT_SUCCEEDED => PaymentEventKind::Succeeded,
            PAYMENT_FAILED => PaymentEventKind::Failed,
            _ => PaymentEventKind::Other,
        }
    }

    /// Extracts the order and user the payment belongs to.
    pub fn order_ref(&self) -> Result<(OrderId, UserId)> {
        let order_id = self.metadata_id(ORDER_ID_KEY).and_then(|raw| {
            OrderId::from_raw(raw).ok_or_else(|| malformed(ORDER_ID_KEY, &raw.to_string()))
        })?;
        let user_id = self.metadata_id(USER_ID_KEY).and_then(|raw| {
            UserId::from_raw(raw).ok_or_else(|| malformed(USER_ID_KEY, &raw.to_string()))
        })?;
        Ok((order_id, user_id))
    }

    fn metadata_id(&self, key: &str) -> Result<i64> {
        let value = self.metadata.get(key).ok_or_else(|| {
            ReconcileError::MalformedEvent(format!("missing {key} metadata"))
        })?;
        value.trim().parse().map_err(|_| malformed(key, value))
    }
}

fn order_metadata(order_id: OrderId, user_id: UserId) -> HashMap<String, String> {
    HashMap::from([
        (ORDER_ID_KEY.to_string(), order_id.to_string()),
        (USER_ID_KEY.to_string(), user_id.to_string()),
    ])
}

fn malformed(key: &str, value: &str) -> ReconcileError {
    ReconcileError::MalformedEvent(format!("invalid {key} metadata: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nested_provider_payload() {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "metadata": { "orderId": "12", "userId": "7" } } }
        });

        let event = PaymentEvent::from_json(payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.kind(), PaymentEventKind::Succeeded);
        assert_eq!(
            event.order_ref().unwrap(),
            (OrderId::new(12), UserId::new(7))
        );
    }

    #[test]
    fn decodes_flat_metadata_with_numbers() {
        let payload = br#"{"id":"evt_2","type":"payment_intent.payment_failed","metadata":{"orderId":3,"userId":"4"}}"#;

        let event = PaymentEvent::from_json(payload).unwrap();

        assert_eq!(event.kind(), PaymentEventKind::Failed);
        assert_eq!(event.order_ref().unwrap(), (OrderId::new(3), UserId::new(4)));
    }

    #[test]
    fn undecodable_json_is_malformed() {
        assert!(matches!(
            PaymentEvent::from_json(b"not json"),
            Err(ReconcileError::MalformedEvent(_))
        ));
        assert!(matches!(
            PaymentEvent::from_json(br#"{"id":"evt_3"}"#),
            Err(ReconcileError::MalformedEvent(_))
        ));
    }

    #[test]
    fn bad_metadata_is_malformed() {
        let missing = PaymentEvent::new(
            "evt_4",
            PAYMENT_SUCCEEDED,
            HashMap::from([("userId".to_string(), "1".to_string())]),
        );
        assert!(matches!(
            missing.order_ref(),
            Err(ReconcileError::MalformedEvent(msg)) if msg.contains("orderId")
        ));

        let not_a_number = PaymentEvent::new(
            "evt_5",
            PAYMENT_SUCCEEDED,
            HashMap::from([
                ("orderId".to_string(), "abc".to_string()),
                ("userId".to_string(), "1".to_string()),
            ]),
        );
        assert!(not_a_number.order_ref().is_err());

        let zero = PaymentEvent::new(
            "evt_6",
            PAYMENT_SUCCEEDED,
            HashMap::from([
                ("orderId".to_string(), "0".to_string()),
                ("userId".to_string(), "1".to_string()),
            ]),
        );
        assert!(zero.order_ref().is_err());
    }

    #[test]
    fn unknown_types_are_other() {
        let event = PaymentEvent::new("evt_7", "charge.refunded", HashMap::new());
        assert_eq!(event.kind(), PaymentEventKind::Other);
    }
}

use super::EventData;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field of a [`WireMessage`] which carries the serialized [`EventData`]
pub const EVENT_WIRE_FIELD: &str = "event";

/// Envelope written to and read from a stream
///
/// Stream adapters normalize their backend specific representation (e.g. binary keys) into
/// this string keyed map before handing it to the dispatch core.
pub type WireMessage = BTreeMap<String, String>;

/// Conversion between [`EventData`] and the [`WireMessage`] envelope
pub trait EventSerializer {
    /// Wraps the event as `{"event": "<json>"}`. Total for any [`EventData`].
    fn serialize(&self, event: &EventData) -> WireMessage;

    /// Decodes the `event` field of the envelope
    ///
    /// Malformed or missing payloads degrade to an empty map instead of failing,
    /// so they can be rejected by field validation further down the line.
    fn deserialize(&self, message: &WireMessage) -> EventData;
}

/// [`EventSerializer`] implementation based on [`serde_json`]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEventSerializer;

impl EventSerializer for JsonEventSerializer {
    fn serialize(&self, event: &EventData) -> WireMessage {
        let payload = Value::Object(event.clone()).to_string();

        let mut message = WireMessage::new();
        message.insert(EVENT_WIRE_FIELD.to_owned(), payload);
        message
    }

    fn deserialize(&self, message: &WireMessage) -> EventData {
        let payload = match message.get(EVENT_WIRE_FIELD) {
            Some(payload) => payload,
            None => {
                debug!("Wire message has no {} field", EVENT_WIRE_FIELD);
                return EventData::new();
            }
        };

        match serde_json::from_str::<EventData>(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!("Failed to decode event payload: {}", e);
                EventData::new()
            }
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event(value: Value) -> EventData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn wrap_payload_in_event_field() {
        let message = JsonEventSerializer.serialize(&event(json!({ "id": "x:1" })));

        assert_eq!(message.len(), 1);
        assert_eq!(message[EVENT_WIRE_FIELD], r#"{"id":"x:1"}"#);
    }

    #[test]
    fn survive_a_round_trip() {
        let original = event(json!({
            "id": "catalog:7",
            "action": "create",
            "nested": { "list": [1, 2.5, null, "four"], "flag": true },
            "tracer": { "headers": { "traceparent": "00-abc-def-01" } }
        }));

        let serializer = JsonEventSerializer;
        let restored = serializer.deserialize(&serializer.serialize(&original));

        assert_eq!(restored, original);
    }

    #[test]
    fn restore_floats_bit_for_bit() {
        let serializer = JsonEventSerializer;
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;

        for _ in 0..20_000 {
            // splitmix64
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut bits = state;
            bits = (bits ^ (bits >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            bits = (bits ^ (bits >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            bits ^= bits >> 31;

            let value = f64::from_bits(bits);
            if !value.is_finite() {
                continue;
            }

            let original = event(json!({ "v": value }));
            let restored = serializer.deserialize(&serializer.serialize(&original));

            assert_eq!(restored["v"].as_f64().map(f64::to_bits), Some(bits));
        }
    }

    #[test]
    fn degrade_missing_field_to_empty_event() {
        let mut message = WireMessage::new();
        message.insert("payload".into(), "{}".into());

        assert!(JsonEventSerializer.deserialize(&message).is_empty());
    }

    #[test]
    fn degrade_malformed_payload_to_empty_event() {
        let mut message = WireMessage::new();
        message.insert(EVENT_WIRE_FIELD.into(), "{not json".into());

        assert!(JsonEventSerializer.deserialize(&message).is_empty());
    }

    #[test]
    fn degrade_non_object_payload_to_empty_event() {
        let mut message = WireMessage::new();
        message.insert(EVENT_WIRE_FIELD.into(), "[1, 2, 3]".into());

        assert!(JsonEventSerializer.deserialize(&message).is_empty());
    }
}

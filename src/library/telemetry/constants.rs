//! Span attribute keys

use opentelemetry::Key;

/// Identifier of the event being processed or published
pub const EVENT_ID: Key = Key::from_static_str("event.id");
/// Stream the event has been read from or is published to
pub const EVENT_TYPE: Key = Key::from_static_str("event.type");
/// Role of the span, e.g. `consumer`
pub const SPAN_KIND: Key = Key::from_static_str("span.kind");
/// Consumer sub-group the event has been dispatched in
pub const SUBGROUP: Key = Key::from_static_str("messaging.subgroup");
/// Undecoded wire message, only recorded when debug logging is enabled
pub const RAW_MESSAGE: Key = Key::from_static_str("messaging.raw_message");
/// Name of the service handling the event
pub const SERVICE_NAME: Key = Key::from_static_str("service.name");

/// Value of [`SPAN_KIND`] for spans processing received events
pub const SPAN_KIND_CONSUMER: &str = "consumer";

use serde_json::{Map, Value};

/// Application level payload of an event
///
/// Events are plain JSON objects. Every event carries a unique `id` and commands additionally name
/// the requested operation in their `action` field. A propagated trace context may be attached in
/// the `tracer` field.
pub type EventData = Map<String, Value>;

/// Field holding the unique identifier of an event
pub const EVENT_ID_FIELD: &str = "id";
/// Field holding the requested operation of a command event
pub const ACTION_FIELD: &str = "action";
/// Field holding the propagated trace context of an event
pub const TRACER_FIELD: &str = "tracer";
/// Field within the [`TRACER_FIELD`] object which holds the propagation headers
pub const TRACER_HEADERS_FIELD: &str = "headers";

/// Accessors for well-known fields of [`EventData`]
pub trait EventDataExt {
    /// Unique identifier of the event, if it is present and a string
    fn event_id(&self) -> Option<&str>;

    /// Operation requested by a command event, if it is present and a string
    fn action(&self) -> Option<&str>;

    /// Returns all fields from `required` which are not present in the event, in order
    fn missing_fields<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Vec<&'a str>;
}

impl EventDataExt for EventData {
    fn event_id(&self) -> Option<&str> {
        self.get(EVENT_ID_FIELD).and_then(Value::as_str)
    }

    fn action(&self) -> Option<&str> {
        self.get(ACTION_FIELD).and_then(Value::as_str)
    }

    fn missing_fields<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Vec<&'a str> {
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|field| !self.contains_key(*field))
            .collect()
    }
}

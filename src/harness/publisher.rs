use super::{ConfigurationError, DispatchMetrics};
use crate::library::communication::event::{
    EntryId, EventData, EventDataExt, EventSerializer, JsonEventSerializer, StreamFactory,
    StreamHandle, StreamType,
};
use crate::library::helpers::unique_event_id;
use crate::library::telemetry::TraceContext;
use crate::library::BoxedError;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Outbound side of a service
///
/// Holds one write-only handle per declared event type. The set of event types is fixed at
/// construction, publishing anything else is a [`ConfigurationError`].
pub struct EventPublisher {
    service: String,
    handles: HashMap<String, Box<dyn StreamHandle>>,
    serializer: JsonEventSerializer,
    trace: TraceContext,
    metrics: Arc<DispatchMetrics>,
}

impl EventPublisher {
    pub(super) async fn build(
        service: &str,
        event_types: &[String],
        factory: &dyn StreamFactory,
        trace: TraceContext,
        metrics: Arc<DispatchMetrics>,
    ) -> Result<Self, BoxedError> {
        let mut handles = HashMap::new();

        for event_type in event_types {
            if handles.contains_key(event_type) {
                continue;
            }

            let handle = factory
                .create(&[event_type.clone()], StreamType::StreamOnly, None)
                .await?;

            handles.insert(event_type.clone(), handle);
        }

        debug!("Publishing handles ready for {:?}", event_types);

        Ok(Self {
            service: service.to_owned(),
            handles,
            serializer: JsonEventSerializer,
            trace,
            metrics,
        })
    }

    /// Whether events of the given type may be published
    pub fn is_declared(&self, event_type: &str) -> bool {
        self.handles.contains_key(event_type)
    }

    /// Generates a new unique id for an event originating from this service
    pub fn new_event_id(&self) -> String {
        unique_event_id(&self.service)
    }

    /// Appends the event to the stream of its type
    ///
    /// Undeclared types fail before anything is written. The current trace context is injected
    /// right before the event is serialized.
    pub async fn publish(&self, event_type: &str, event: EventData) -> Result<EntryId, BoxedError> {
        let handle = self
            .handles
            .get(event_type)
            .ok_or_else(|| ConfigurationError::UndeclaredEventType(event_type.to_owned()))?;

        info!(
            "Publishing {} event {}",
            event_type,
            Value::Object(event.clone())
        );

        let event = self.trace.inject(event);
        let message = self.serializer.serialize(&event);
        let id = handle.write_events(&message).await?;

        debug!(
            "Published {} as {} to {}",
            event.event_id().unwrap_or_default(),
            id,
            handle.key()
        );
        self.metrics.record_published();

        Ok(id)
    }
}

use super::EventPublisher;
use crate::library::communication::discovery::{
    ServiceDetails, SERVICE_WORKER_ANNOUNCED, WORKER_FIELD,
};
use crate::library::communication::event::{EntryId, EventData, EVENT_ID_FIELD};
use crate::library::BoxedError;
use log::info;
use serde_json::Value;

/// Makes a service known to the rest of the system
///
/// Publishes a single [`SERVICE_WORKER_ANNOUNCED`] event carrying the [`ServiceDetails`] through
/// the regular publishing path, so the announcement is traced like any other outbound event.
pub struct ServiceAnnouncer<'a> {
    publisher: &'a EventPublisher,
    details: &'a ServiceDetails,
}

impl<'a> ServiceAnnouncer<'a> {
    /// Creates a new announcer publishing through the given publisher
    pub fn new(publisher: &'a EventPublisher, details: &'a ServiceDetails) -> Self {
        Self { publisher, details }
    }

    /// Builds the announcement event with a fresh id
    pub fn announcement(&self) -> Result<EventData, BoxedError> {
        let mut event = EventData::new();
        event.insert(
            EVENT_ID_FIELD.to_owned(),
            Value::String(self.publisher.new_event_id()),
        );
        event.insert(WORKER_FIELD.to_owned(), serde_json::to_value(self.details)?);

        Ok(event)
    }

    /// Publishes the announcement
    pub async fn announce(&self) -> Result<EntryId, BoxedError> {
        let event = self.announcement()?;
        let id = self.publisher.publish(SERVICE_WORKER_ANNOUNCED, event).await?;

        info!("Announced worker {}", self.details.name);

        Ok(id)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::harness::DispatchMetrics;
    use crate::library::communication::discovery::WorkerRegistry;
    use crate::library::communication::event::{EventSerializer, JsonEventSerializer};
    use crate::library::communication::implementation::memory::MemoryStreamFactory;
    use crate::library::telemetry::TraceContext;
    use std::sync::Arc;

    #[tokio::test]
    async fn announce_discoverable_workers() {
        let factory = MemoryStreamFactory::new();
        let publisher = EventPublisher::build(
            "catalog",
            &[SERVICE_WORKER_ANNOUNCED.to_string()],
            &factory,
            TraceContext::new(),
            Arc::new(DispatchMetrics::default()),
        )
        .await
        .unwrap();

        let details = ServiceDetails::new("catalog").with_address("10.0.0.7:3000");
        ServiceAnnouncer::new(&publisher, &details)
            .announce()
            .await
            .unwrap();

        let registry = WorkerRegistry::default();
        for (_, message) in factory.entries(SERVICE_WORKER_ANNOUNCED) {
            registry.record(&JsonEventSerializer.deserialize(&message));
        }

        assert_eq!(registry.get("catalog"), Some(details));
    }
}

use super::router::{consumer_group_id, DEFAULT_SUBGROUP};
use super::{
    CommandStreamDeclaration, ConfigurationError, ConsumerGroupRouter, DispatchMetrics,
    EventPublisher, MetricsSnapshot, ServiceAnnouncer,
};
use crate::library::communication::discovery::{ServiceDetails, SERVICE_WORKER_ANNOUNCED};
use crate::library::communication::event::{
    EventData, EventDataExt, EventSerializer, JsonEventSerializer, StreamFactory, StreamHandle,
    StreamType, WireMessage, ACTION_FIELD, EVENT_ID_FIELD,
};
use crate::library::helpers::format_error_chain;
use crate::library::telemetry::constants::{
    EVENT_ID, EVENT_TYPE, RAW_MESSAGE, SERVICE_NAME, SPAN_KIND, SPAN_KIND_CONSUMER, SUBGROUP,
};
use crate::library::telemetry::TraceContext;
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use log::{debug, error, info, log_enabled, warn, Level};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Business logic of a service
///
/// Errors returned by any of the processing methods are logged and never abort the dispatch loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles a command read from one of the command streams. `event_type` is the name of the stream.
    async fn process_event(
        &self,
        publisher: &EventPublisher,
        event_type: &str,
        event: &EventData,
        raw: &WireMessage,
    ) -> EmptyResult;

    /// Handles an event read from the data stream
    async fn process_data_event(
        &self,
        _publisher: &EventPublisher,
        event: &EventData,
        _raw: &WireMessage,
    ) -> EmptyResult {
        debug!("Discarding data event {:?}", event.event_id());
        Ok(())
    }

    /// Called after every successfully handled event, e.g. to dump internal state
    fn log_state(&self) {}

    /// Called once when the service is started, before it is announced
    async fn on_startup(&self, _publisher: &EventPublisher) -> EmptyResult {
        Ok(())
    }
}

/// Static configuration of an [`EventDispatchService`]
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Name of the service, used for consumer group ids and event ids
    pub name: String,
    /// Plain data stream consumed in addition to the command streams
    pub data_stream: Option<String>,
    /// Command streams and the sub-groups they are routed to
    pub command_streams: Vec<CommandStreamDeclaration>,
    /// Event types the service may publish
    pub pub_event_list: Vec<String>,
    /// Details announced to the rest of the system on startup
    pub service_details: Option<ServiceDetails>,
    /// Fields every command event has to carry
    pub cmd_validation_fields: Vec<String>,
    /// Fields every data event has to carry
    pub data_validation_fields: Vec<String>,
    /// Attaches the dispatch counters to every processing span
    pub metrics_on_traces: bool,
}

impl ServiceConfig {
    /// Creates a configuration which requires an `id` on every event
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_stream: None,
            command_streams: Vec::new(),
            pub_event_list: Vec::new(),
            service_details: None,
            cmd_validation_fields: vec![EVENT_ID_FIELD.to_owned()],
            data_validation_fields: vec![EVENT_ID_FIELD.to_owned()],
            metrics_on_traces: false,
        }
    }

    /// Creates a configuration for plain command services which additionally require an `action` on commands
    pub fn command_service(name: impl Into<String>) -> Self {
        let mut config = Self::new(name);
        config.cmd_validation_fields = vec![EVENT_ID_FIELD.to_owned(), ACTION_FIELD.to_owned()];
        config
    }

    /// Consumes the given plain data stream
    pub fn with_data_stream(mut self, stream: impl Into<String>) -> Self {
        self.data_stream = Some(stream.into());
        self
    }

    /// Consumes the given command stream
    pub fn with_command_stream(mut self, declaration: impl Into<CommandStreamDeclaration>) -> Self {
        self.command_streams.push(declaration.into());
        self
    }

    /// Declares an event type for publishing
    pub fn publishing(mut self, event_type: impl Into<String>) -> Self {
        self.pub_event_list.push(event_type.into());
        self
    }

    /// Announces the service with the given details on startup
    pub fn with_service_details(mut self, details: ServiceDetails) -> Self {
        self.service_details = Some(details);
        self
    }

    /// Overrides the fields required on command events
    pub fn with_cmd_validation_fields(mut self, fields: &[&str]) -> Self {
        self.cmd_validation_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Overrides the fields required on data events
    pub fn with_data_validation_fields(mut self, fields: &[&str]) -> Self {
        self.data_validation_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Enables or disables attaching dispatch counters to spans
    pub fn with_metrics_on_traces(mut self, enabled: bool) -> Self {
        self.metrics_on_traces = enabled;
        self
    }
}

/// Startup progress of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// [`run`](EventDispatchService::run) has not completed yet
    Unstarted,
    /// Announcement is being published
    Announcing,
    /// Startup has completed
    Running,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Announcing,
            2 => Self::Running,
            _ => Self::Unstarted,
        }
    }
}

/// Result of a single dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was pending
    Idle,
    /// Event was rejected by field validation and the handler has not been called
    Skipped,
    /// Handler completed successfully
    Processed,
    /// Handler returned an error
    Failed,
}

#[derive(Clone, Copy)]
enum Route<'a> {
    Command(&'a str),
    Data,
}

/// Reads events from the configured streams and dispatches them to an [`EventHandler`]
///
/// Every call to [`dispatch_next`](Self::dispatch_next) or [`process_next_data_event`](Self::process_next_data_event)
/// processes at most one event to completion. Calls for different sub-groups may run concurrently,
/// calls for the same sub-group must not.
pub struct EventDispatchService<H> {
    config: ServiceConfig,
    handler: H,
    router: ConsumerGroupRouter,
    publisher: EventPublisher,
    data_stream: Option<Box<dyn StreamHandle>>,
    serializer: JsonEventSerializer,
    trace: TraceContext,
    metrics: Arc<DispatchMetrics>,
    started: AtomicBool,
    state: AtomicU8,
}

impl<H: EventHandler> EventDispatchService<H> {
    /// Requests all stream handles from the factory
    ///
    /// Fails with [`ConfigurationError::MissingAnnouncementEventType`] before touching the factory if
    /// service details are set without declaring [`SERVICE_WORKER_ANNOUNCED`] for publishing.
    pub async fn new(
        config: ServiceConfig,
        factory: &dyn StreamFactory,
        handler: H,
    ) -> Result<Self, BoxedError> {
        if config.service_details.is_some()
            && !config
                .pub_event_list
                .iter()
                .any(|event_type| event_type == SERVICE_WORKER_ANNOUNCED)
        {
            return Err(
                ConfigurationError::MissingAnnouncementEventType(SERVICE_WORKER_ANNOUNCED).into(),
            );
        }

        let metrics = Arc::new(DispatchMetrics::default());
        let mut trace = TraceContext::new();

        if config.metrics_on_traces {
            trace = trace.with_metrics(metrics.clone());
        }

        let publisher = EventPublisher::build(
            &config.name,
            &config.pub_event_list,
            factory,
            trace.clone(),
            metrics.clone(),
        )
        .await?;

        let router =
            ConsumerGroupRouter::build(&config.name, &config.command_streams, factory).await?;

        let data_stream = match &config.data_stream {
            Some(stream) => {
                let group_id = consumer_group_id(&config.name, DEFAULT_SUBGROUP);
                let handle = factory
                    .create(
                        &[stream.clone()],
                        StreamType::SingleKeyConsumerOnly,
                        Some(group_id.as_str()),
                    )
                    .await?;
                Some(handle)
            }
            None => None,
        };

        Ok(Self {
            config,
            handler,
            router,
            publisher,
            data_stream,
            serializer: JsonEventSerializer,
            trace,
            metrics,
            started: AtomicBool::new(false),
            state: AtomicU8::new(ServiceState::Unstarted as u8),
        })
    }

    /// Runs the startup hook of the handler and announces the service if it has details attached.
    /// Subsequent calls do nothing.
    pub async fn run(&self) -> EmptyResult {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Service {} has already been started", self.config.name);
            return Ok(());
        }

        if let Err(e) = self.handler.on_startup(&self.publisher).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        if let Some(details) = &self.config.service_details {
            self.set_state(ServiceState::Announcing);

            let announcer = ServiceAnnouncer::new(&self.publisher, details);
            self.trace
                .wrap(
                    "announce",
                    vec![SERVICE_NAME.string(self.config.name.clone())],
                    None,
                    announcer.announce(),
                )
                .await?;
        }

        self.set_state(ServiceState::Running);
        info!("Service {} is running", self.config.name);

        Ok(())
    }

    /// Processes the next pending command of a sub-group, if there is one.
    /// Errors are only returned if reading fails or the sub-group does not exist.
    pub async fn dispatch_next(&self, subgroup: &str) -> Result<DispatchOutcome, BoxedError> {
        let entry = match self.router.read_one(subgroup).await? {
            Some(entry) => entry,
            None => return Ok(DispatchOutcome::Idle),
        };

        let outcome = self
            .process(
                Route::Command(subgroup),
                &entry.stream,
                &entry.event_id,
                &entry.message,
            )
            .await;

        Ok(outcome)
    }

    /// Processes the next pending event of the data stream, if there is one.
    /// The entry is acknowledged regardless of the outcome.
    pub async fn process_next_data_event(&self) -> Result<DispatchOutcome, BoxedError> {
        let handle = match &self.data_stream {
            Some(handle) => handle,
            None => return Ok(DispatchOutcome::Idle),
        };

        let (entry_id, message) = match handle.read_events(1).await?.into_iter().next() {
            Some(entry) => entry,
            None => return Ok(DispatchOutcome::Idle),
        };

        let outcome = self
            .process(Route::Data, handle.key(), &entry_id, &message)
            .await;

        // No selective redelivery, a consumed entry is done with
        handle.ack(&entry_id).await?;

        Ok(outcome)
    }

    /// Publishes an event of a declared type, see [`EventPublisher::publish`]
    pub async fn publish(&self, event_type: &str, event: EventData) -> EmptyResult {
        self.publisher.publish(event_type, event).await?;
        Ok(())
    }

    async fn process(
        &self,
        route: Route<'_>,
        stream: &str,
        entry_id: &str,
        message: &WireMessage,
    ) -> DispatchOutcome {
        self.metrics.record_received();

        let event = self.serializer.deserialize(message);
        let required = match route {
            Route::Command(_) => &self.config.cmd_validation_fields,
            Route::Data => &self.config.data_validation_fields,
        };

        let missing = event.missing_fields(required);
        if !missing.is_empty() {
            info!(
                "Ignoring bad event data {} from {}, missing {:?}",
                entry_id, stream, missing
            );
            self.metrics.record_skipped();
            return DispatchOutcome::Skipped;
        }

        let event_id = event.event_id().unwrap_or(entry_id).to_owned();
        let parent = self.trace.extract(&event);

        if parent.is_none() {
            info!("No tracer id found in {}, starting a new trace", event_id);
        }

        let mut tags = vec![
            SPAN_KIND.string(SPAN_KIND_CONSUMER),
            EVENT_ID.string(event_id.clone()),
            EVENT_TYPE.string(stream.to_owned()),
            SERVICE_NAME.string(self.config.name.clone()),
        ];

        if let Route::Command(subgroup) = route {
            tags.push(SUBGROUP.string(subgroup.to_owned()));
        }

        if log_enabled!(Level::Debug) {
            tags.push(RAW_MESSAGE.string(format!("{:?}", message)));
        }

        let result = match route {
            Route::Command(_) => {
                let method =
                    self.handler
                        .process_event(&self.publisher, stream, &event, message);
                self.trace.wrap("process_event", tags, parent, method).await
            }
            Route::Data => {
                let method = self
                    .handler
                    .process_data_event(&self.publisher, &event, message);
                self.trace
                    .wrap("process_data_event", tags, parent, method)
                    .await
            }
        };

        match result {
            Ok(()) => {
                self.handler.log_state();
                self.metrics.record_processed();
                DispatchOutcome::Processed
            }
            Err(e) => {
                error!(
                    "Failed to process {} from {}: {}",
                    event_id,
                    stream,
                    format_error_chain(&*e)
                );
                self.metrics.record_failed();
                DispatchOutcome::Failed
            }
        }
    }

    fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Current startup state
    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Configuration the service has been created with
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Router of the command streams
    pub fn router(&self) -> &ConsumerGroupRouter {
        &self.router
    }

    /// Outbound side of the service
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Business logic the events are dispatched to
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Whether a plain data stream is consumed
    pub fn has_data_stream(&self) -> bool {
        self.data_stream.is_some()
    }

    /// Current values of the dispatch counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::discovery::WORKER_FIELD;
    use crate::library::communication::implementation::memory::MemoryStreamFactory;
    use crate::library::telemetry::testing;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("handler refused {0}")]
    struct Refused(String);

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        calls: Mutex<Vec<(String, EventData)>>,
        state_dumps: Mutex<usize>,
        startup_saw_announcement: Mutex<Option<bool>>,
        startup_failures: Mutex<usize>,
        factory: MemoryStreamFactory,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn record(&self, event_type: &str, event: &EventData) -> EmptyResult {
            self.calls
                .lock()
                .unwrap()
                .push((event_type.to_owned(), event.clone()));

            if self.fail {
                Err(Refused(event.event_id().unwrap_or_default().to_owned()).into())
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<(String, EventData)> {
            self.calls.lock().unwrap().clone()
        }

        fn state_dumps(&self) -> usize {
            *self.state_dumps.lock().unwrap()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn process_event(
            &self,
            _publisher: &EventPublisher,
            event_type: &str,
            event: &EventData,
            _raw: &WireMessage,
        ) -> EmptyResult {
            self.record(event_type, event)
        }

        async fn process_data_event(
            &self,
            _publisher: &EventPublisher,
            event: &EventData,
            _raw: &WireMessage,
        ) -> EmptyResult {
            self.record("data", event)
        }

        fn log_state(&self) {
            *self.state_dumps.lock().unwrap() += 1;
        }

        async fn on_startup(&self, _publisher: &EventPublisher) -> EmptyResult {
            {
                let mut failures = self.startup_failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(Refused("startup".into()).into());
                }
            }

            let announced = !self.factory.entries(SERVICE_WORKER_ANNOUNCED).is_empty();
            *self.startup_saw_announcement.lock().unwrap() = Some(announced);
            Ok(())
        }
    }

    fn event(value: Value) -> EventData {
        value.as_object().cloned().unwrap()
    }

    fn push(factory: &MemoryStreamFactory, stream: &str, value: Value) -> String {
        factory.push(stream, JsonEventSerializer.serialize(&event(value)))
    }

    fn catalog() -> ServiceConfig {
        ServiceConfig::command_service("catalog")
            .with_command_stream("CreateItem")
            .with_command_stream(("DeleteItem", "admin"))
            .publishing("ItemCreated")
    }

    async fn service(
        config: ServiceConfig,
        factory: &MemoryStreamFactory,
        handler: Recorder,
    ) -> EventDispatchService<Recorder> {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::max())
            .is_test(true)
            .try_init()
            .ok();

        EventDispatchService::new(config, factory, handler)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn route_and_publish_for_the_catalog() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;
        let router = service.router();

        assert_eq!(router.subgroups(), vec!["admin", "default"]);
        assert_eq!(router.streams("default").unwrap(), &["CreateItem".to_string()]);
        assert_eq!(router.streams("admin").unwrap(), &["DeleteItem".to_string()]);
        assert_eq!(router.consumer_group_id("default"), Some("cg-catalog"));
        assert_eq!(router.consumer_group_id("admin"), Some("cg-catalog-admin"));

        let item = event(json!({ "id": "catalog:1", "name": "lamp" }));
        assert!(service.publish("ItemCreated", item.clone()).await.is_ok());
        assert!(service.publish("ItemDeleted", item).await.is_err());
        assert_eq!(factory.entries("ItemCreated").len(), 1);
        assert!(factory.entries("ItemDeleted").is_empty());
    }

    #[tokio::test]
    async fn skip_commands_missing_required_fields() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        push(&factory, "CreateItem", json!({ "id": "x:1" }));
        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Skipped
        );
        assert!(service.handler().calls().is_empty());

        push(&factory, "CreateItem", json!({ "id": "x:1", "action": "noop" }));
        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Processed
        );

        let calls = service.handler().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "CreateItem");
        assert_eq!(calls[0].1["action"], "noop");
    }

    #[tokio::test]
    async fn skip_undecodable_messages() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        let mut garbage = WireMessage::new();
        garbage.insert("event".into(), "{not json".into());
        factory.push("DeleteItem", garbage);

        assert_eq!(
            service.dispatch_next("admin").await.unwrap(),
            DispatchOutcome::Skipped
        );
        assert_eq!(service.metrics().skipped, 1);
    }

    #[tokio::test]
    async fn survive_handler_errors() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::failing()).await;

        push(&factory, "CreateItem", json!({ "id": "x:1", "action": "a" }));
        push(&factory, "CreateItem", json!({ "id": "x:2", "action": "b" }));

        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Failed
        );
        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Failed
        );
        assert_eq!(service.handler().calls().len(), 2);
        assert_eq!(service.handler().state_dumps(), 0);
        assert_eq!(service.metrics().failed, 2);
    }

    #[tokio::test]
    async fn dump_state_after_successful_events() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        push(&factory, "DeleteItem", json!({ "id": "x:1", "action": "drop" }));
        service.dispatch_next("admin").await.unwrap();

        assert_eq!(service.handler().state_dumps(), 1);
    }

    #[tokio::test]
    async fn consume_commands_without_leaving_them_pending() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        push(&factory, "CreateItem", json!({ "id": "x:1", "action": "a" }));
        service.dispatch_next("default").await.unwrap();

        assert!(factory.pending("CreateItem", "cg-catalog").is_empty());
        assert!(factory.acknowledged("CreateItem", "cg-catalog").is_empty());
        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Idle
        );
    }

    #[tokio::test]
    async fn report_idle_subgroups() {
        let factory = MemoryStreamFactory::new();
        let config = ServiceConfig::new("catalog").with_command_stream(("DeleteItem", "admin"));
        let service = service(config, &factory, Recorder::default()).await;

        assert_eq!(
            service.dispatch_next("admin").await.unwrap(),
            DispatchOutcome::Idle
        );
        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Idle
        );
        assert_eq!(
            service.process_next_data_event().await.unwrap(),
            DispatchOutcome::Idle
        );
        assert!(service.dispatch_next("billing").await.is_err());
    }

    #[tokio::test]
    async fn acknowledge_every_data_event_once() {
        for handler in vec![Recorder::default(), Recorder::failing()] {
            let factory = MemoryStreamFactory::new();
            let config = ServiceConfig::new("catalog").with_data_stream("Inventory");
            let service = service(config, &factory, handler).await;

            let valid = push(&factory, "Inventory", json!({ "id": "x:1" }));
            let invalid = push(&factory, "Inventory", json!({ "count": 3 }));

            assert_ne!(
                service.process_next_data_event().await.unwrap(),
                DispatchOutcome::Skipped
            );
            assert_eq!(
                service.process_next_data_event().await.unwrap(),
                DispatchOutcome::Skipped
            );
            assert_eq!(
                service.process_next_data_event().await.unwrap(),
                DispatchOutcome::Idle
            );

            assert_eq!(
                factory.acknowledged("Inventory", "cg-catalog"),
                vec![valid, invalid]
            );
            assert!(factory.pending("Inventory", "cg-catalog").is_empty());
            assert_eq!(service.handler().calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn process_events_without_trace_context() {
        testing::install();
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        push(&factory, "CreateItem", json!({ "id": "x:1", "action": "a" }));
        push(
            &factory,
            "CreateItem",
            json!({ "id": "x:2", "action": "a", "tracer": { "headers": {} } }),
        );

        for _ in 0..2 {
            assert_eq!(
                service.dispatch_next("default").await.unwrap(),
                DispatchOutcome::Processed
            );
        }
    }

    #[tokio::test]
    async fn process_events_with_trace_context() {
        testing::install();
        let factory = MemoryStreamFactory::new();
        let config = catalog().publishing("CreateItem").with_metrics_on_traces(true);
        let service = service(config, &factory, Recorder::default()).await;

        service
            .publish("CreateItem", event(json!({ "id": "x:1", "action": "a" })))
            .await
            .unwrap();

        assert_eq!(
            service.dispatch_next("default").await.unwrap(),
            DispatchOutcome::Processed
        );

        let calls = service.handler().calls();
        assert!(calls[0].1.contains_key("tracer"));
    }

    #[tokio::test]
    async fn refuse_details_without_announcement_type() {
        let factory = MemoryStreamFactory::new();
        let config = catalog().with_service_details(ServiceDetails::new("catalog"));

        let error = EventDispatchService::new(config, &factory, Recorder::default())
            .await
            .err()
            .unwrap();

        assert_eq!(
            error.downcast_ref::<ConfigurationError>(),
            Some(&ConfigurationError::MissingAnnouncementEventType(
                SERVICE_WORKER_ANNOUNCED
            ))
        );
        assert!(factory.groups("CreateItem").is_empty());
    }

    #[tokio::test]
    async fn announce_once_after_startup() {
        let factory = MemoryStreamFactory::new();
        let config = catalog()
            .publishing(SERVICE_WORKER_ANNOUNCED)
            .with_service_details(ServiceDetails::new("catalog").with_capability("items"));
        let handler = Recorder {
            factory: factory.clone(),
            ..Recorder::default()
        };
        let service = service(config, &factory, handler).await;

        assert_eq!(service.state(), ServiceState::Unstarted);

        service.run().await.unwrap();
        service.run().await.unwrap();

        assert_eq!(service.state(), ServiceState::Running);
        assert_eq!(
            *service.handler().startup_saw_announcement.lock().unwrap(),
            Some(false)
        );

        let announcements = factory.entries(SERVICE_WORKER_ANNOUNCED);
        assert_eq!(announcements.len(), 1);

        let announcement = JsonEventSerializer.deserialize(&announcements[0].1);
        assert_eq!(
            announcement[WORKER_FIELD],
            json!({ "name": "catalog", "capabilities": ["items"] })
        );
        assert!(announcement
            .event_id()
            .unwrap_or_default()
            .starts_with("catalog:"));
    }

    #[tokio::test]
    async fn run_without_announcing() {
        let factory = MemoryStreamFactory::new();
        let service = service(catalog(), &factory, Recorder::default()).await;

        service.run().await.unwrap();

        assert_eq!(service.state(), ServiceState::Running);
        assert!(factory.entries(SERVICE_WORKER_ANNOUNCED).is_empty());
    }

    #[tokio::test]
    async fn retry_a_failed_startup() {
        let factory = MemoryStreamFactory::new();
        let handler = Recorder {
            startup_failures: Mutex::new(1),
            ..Recorder::default()
        };
        let service = service(catalog(), &factory, handler).await;

        assert!(service.run().await.is_err());
        assert_eq!(service.state(), ServiceState::Unstarted);

        service.run().await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
    }
}

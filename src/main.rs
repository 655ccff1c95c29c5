use anyhow::{anyhow, Result};
use async_trait::async_trait;
use event_service::harness::{
    EventDispatchService, EventHandler, EventPublisher, Heart, ServiceDriver,
};
use event_service::library::communication::discovery::{WorkerRegistry, SERVICE_WORKER_ANNOUNCED};
use event_service::library::communication::event::{EventData, EventDataExt, WireMessage};
use event_service::library::communication::implementation::redis::RedisStreamFactory;
use event_service::library::telemetry;
use event_service::library::EmptyResult;
use event_service::options::{ServiceOptions, SharedOptions};
use log::{debug, info};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Consumes command and data streams and logs every event it receives.",
    version = env!("CARGO_PKG_VERSION")
)]
struct MainOptions {
    #[structopt(flatten)]
    shared_options: SharedOptions,

    #[structopt(flatten)]
    service_options: ServiceOptions,
}

/// Logs received events and keeps track of announced workers
struct LoggingHandler {
    registry: WorkerRegistry,
}

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn process_event(
        &self,
        _publisher: &EventPublisher,
        event_type: &str,
        event: &EventData,
        _raw: &WireMessage,
    ) -> EmptyResult {
        if event_type == SERVICE_WORKER_ANNOUNCED {
            self.registry.record(event);
        }

        info!(
            "Received {} {} ({})",
            event_type,
            event.event_id().unwrap_or_default(),
            event.action().unwrap_or("no action")
        );

        Ok(())
    }

    async fn process_data_event(
        &self,
        _publisher: &EventPublisher,
        event: &EventData,
        _raw: &WireMessage,
    ) -> EmptyResult {
        info!("Received data {}", event.event_id().unwrap_or_default());
        Ok(())
    }

    fn log_state(&self) {
        debug!("Known workers: {:?}", self.registry.names());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let main_options = MainOptions::from_args();
    let shared_options = main_options.shared_options;
    let service_options = main_options.service_options;

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&shared_options.log)
        .init();

    log::info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let instance_id = service_options.instance_id();

    telemetry::init(
        &shared_options.trace_endpoint,
        service_options.service_name.clone(),
        Some(instance_id.clone()),
    )?;

    let mut factory = RedisStreamFactory::new(&shared_options.redis, instance_id)?;
    if let Some(limit) = service_options.stream_limit {
        factory = factory.with_limit(limit);
    }

    let handler = LoggingHandler {
        registry: WorkerRegistry::default(),
    };

    let service = EventDispatchService::new(service_options.config(), &factory, handler)
        .await
        .map_err(|e| anyhow!(e))?;

    // The heart dies as soon as every stone is gone
    let (heart, _stone) = Heart::new();

    let reason = ServiceDriver::new(service)
        .with_backoff(service_options.backoff())
        .run_forever(heart)
        .await
        .map_err(|e| anyhow!(e))?;

    info!("Service stopped: {}", reason);

    telemetry::flush();

    Ok(())
}

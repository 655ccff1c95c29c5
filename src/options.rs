//! Command line and environment configuration of the service binary

use crate::harness::{CommandStreamDeclaration, ServiceConfig};
use crate::library::communication::discovery::{ServiceDetails, SERVICE_WORKER_ANNOUNCED};
use crate::library::helpers::IdleBackoff;
use std::time::Duration;
use structopt::StructOpt;
use uuid::Uuid;

/// Options shared by every service
#[derive(Debug, StructOpt)]
pub struct SharedOptions {
    /// Redis database server URL
    #[structopt(
        short,
        long,
        global = true,
        env,
        default_value = "redis://localhost/",
        value_name = "url"
    )]
    pub redis: String,

    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        global = true,
        default_value = "info",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,

    /// OpenTelemetry collector endpoint
    ///
    /// Omitting it disables trace export, trace context is still propagated
    #[structopt(long, global = true, env)]
    pub trace_endpoint: Option<String>,
}

/// Streams and behaviour of the service
#[derive(Debug, StructOpt)]
pub struct ServiceOptions {
    /// Name of the service, used for consumer group and event ids
    #[structopt(long, env, default_value = "event-service", value_name = "name")]
    pub service_name: String,

    /// Unique identifier of this instance within its consumer groups
    ///
    /// Defaults to a random identifier
    #[structopt(long, env = "ID", value_name = "id")]
    pub instance_id: Option<String>,

    /// Command stream to consume, optionally routed into a sub-group with `stream:label`
    #[structopt(long = "command-stream", value_name = "stream[:label]")]
    pub command_streams: Vec<CommandStreamDeclaration>,

    /// Plain data stream to consume
    #[structopt(long, env, value_name = "stream")]
    pub data_stream: Option<String>,

    /// Event type the service may publish
    #[structopt(long = "publish", value_name = "type")]
    pub pub_event_list: Vec<String>,

    /// Require an `action` field on commands in addition to the `id`
    #[structopt(long)]
    pub require_action: bool,

    /// Announce the service on startup
    #[structopt(long)]
    pub announce: bool,

    /// Address included in the announcement
    #[structopt(long, env, value_name = "address")]
    pub address: Option<String>,

    /// Capability included in the announcement
    #[structopt(long = "capability", value_name = "capability")]
    pub capabilities: Vec<String>,

    /// Attach dispatch counters to every processing span
    #[structopt(long)]
    pub metrics_on_traces: bool,

    /// Approximate maximum number of entries kept in published streams
    #[structopt(long, env, value_name = "entries")]
    pub stream_limit: Option<usize>,

    /// Upper bound of the wait between polls of an idle stream
    #[structopt(long, default_value = "500", value_name = "millis")]
    pub idle_limit: u64,
}

impl ServiceOptions {
    /// Configured or freshly generated instance identifier
    pub fn instance_id(&self) -> String {
        self.instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.service_name, Uuid::new_v4()))
    }

    /// Converts the options into the configuration of an [`EventDispatchService`](crate::harness::EventDispatchService).
    /// Announcing services implicitly declare the announcement event type.
    pub fn config(&self) -> ServiceConfig {
        let mut config = if self.require_action {
            ServiceConfig::command_service(&self.service_name)
        } else {
            ServiceConfig::new(&self.service_name)
        };

        config.command_streams = self.command_streams.clone();
        config.pub_event_list = self.pub_event_list.clone();
        config.data_stream = self.data_stream.clone();
        config.metrics_on_traces = self.metrics_on_traces;

        if self.announce {
            let mut details = ServiceDetails::new(&self.service_name);
            details.address = self.address.clone();
            details.capabilities = self.capabilities.clone();

            if !config.pub_event_list.iter().any(|t| t == SERVICE_WORKER_ANNOUNCED) {
                config = config.publishing(SERVICE_WORKER_ANNOUNCED);
            }

            config = config.with_service_details(details);
        }

        config
    }

    /// Idle backoff of the dispatch loops
    pub fn backoff(&self) -> IdleBackoff {
        IdleBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(self.idle_limit),
        )
    }
}

use super::{DeathReason, DispatchOutcome, EventDispatchService, EventHandler, Heart};
use crate::library::helpers::{format_error_chain, IdleBackoff};
use crate::library::BoxedError;
use log::{debug, error, info, trace};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone)]
enum Source {
    Subgroup(String),
    Data,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Subgroup(subgroup) => write!(f, "sub-group {}", subgroup),
            Source::Data => write!(f, "data stream"),
        }
    }
}

/// Keeps an [`EventDispatchService`] busy until it is asked to stop
///
/// Every non-empty sub-group and the data stream get their own task. A task which finds
/// nothing pending waits according to its [`IdleBackoff`] before polling again.
pub struct ServiceDriver<H> {
    service: Arc<EventDispatchService<H>>,
    backoff: IdleBackoff,
}

impl<H: EventHandler + 'static> ServiceDriver<H> {
    /// Creates a new driver using the default idle backoff
    pub fn new(service: EventDispatchService<H>) -> Self {
        Self {
            service: Arc::new(service),
            backoff: IdleBackoff::default(),
        }
    }

    /// Replaces the idle backoff used by every dispatch loop
    pub fn with_backoff(mut self, backoff: IdleBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Service driven by this instance
    pub fn service(&self) -> &Arc<EventDispatchService<H>> {
        &self.service
    }

    /// Starts the service and dispatches events until the heart dies
    pub async fn run_forever(&self, mut heart: Heart) -> Result<DeathReason, BoxedError> {
        self.service.run().await?;

        let mut sources: Vec<Source> = self
            .service
            .router()
            .subgroups()
            .into_iter()
            .filter(|subgroup| {
                self.service
                    .router()
                    .streams(subgroup)
                    .map_or(false, |streams| !streams.is_empty())
            })
            .map(|subgroup| Source::Subgroup(subgroup.to_owned()))
            .collect();

        if self.service.has_data_stream() {
            sources.push(Source::Data);
        }

        let loops: Vec<JoinHandle<()>> = sources
            .into_iter()
            .map(|source| {
                debug!("Starting dispatch loop for {}", source);
                tokio::spawn(dispatch_loop(
                    self.service.clone(),
                    source,
                    self.backoff.clone(),
                ))
            })
            .collect();

        let reason = heart.death().await;
        info!("Stopping dispatch loops: {}", reason);

        for handle in loops {
            handle.abort();
        }

        Ok(reason)
    }
}

async fn dispatch_loop<H: EventHandler>(
    service: Arc<EventDispatchService<H>>,
    source: Source,
    mut backoff: IdleBackoff,
) {
    loop {
        let result = match &source {
            Source::Subgroup(subgroup) => service.dispatch_next(subgroup).await,
            Source::Data => service.process_next_data_event().await,
        };

        let delay = match result {
            Ok(DispatchOutcome::Idle) => backoff.next(),
            Ok(outcome) => {
                trace!("Dispatched from {}: {:?}", source, outcome);
                backoff.reset();
                None
            }
            Err(e) => {
                error!(
                    "Unable to read from {}: {}",
                    source,
                    format_error_chain(&*e)
                );
                backoff.next()
            }
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }
    }
}

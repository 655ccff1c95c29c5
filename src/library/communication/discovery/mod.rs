//! Service announcement and discovery structures
//!
//! Services which want to be discoverable attach [`ServiceDetails`] to themselves and publish a
//! single [`SERVICE_WORKER_ANNOUNCED`] event once they are ready to serve. Interested parties
//! consume that stream and keep track of known workers, e.g. by feeding the events into a
//! [`WorkerRegistry`].

use super::event::{EventData, EventDataExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Event type under which services announce themselves
pub const SERVICE_WORKER_ANNOUNCED: &str = "ServiceWorkerAnnounced";

/// Field of an announcement event carrying the [`ServiceDetails`]
pub const WORKER_FIELD: &str = "worker";

/// Static description of a service instance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetails {
    /// Name under which the service is known
    pub name: String,
    /// Location where the service is reachable, if it exposes anything besides its streams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Operations or features offered by the service
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ServiceDetails {
    /// Creates a new instance with no address and capabilities
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            capabilities: Vec::new(),
        }
    }

    /// Sets the address where the service is reachable
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Adds a capability to the list of offered capabilities
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// Shared record of workers which announced themselves
///
/// Cloning the registry yields another handle to the same underlying state, so it can be passed
/// explicitly to every component that needs it.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<RwLock<HashMap<String, ServiceDetails>>>,
}

impl WorkerRegistry {
    /// Records the worker contained in a [`SERVICE_WORKER_ANNOUNCED`] event and returns it.
    /// Announcements without valid details are ignored. A repeated announcement replaces the previous one.
    pub fn record(&self, event: &EventData) -> Option<ServiceDetails> {
        let raw = event.get(WORKER_FIELD)?;

        let details = match serde_json::from_value::<ServiceDetails>(raw.clone()) {
            Ok(details) => details,
            Err(e) => {
                warn!(
                    "Ignoring announcement {:?} with malformed worker details: {}",
                    event.event_id(),
                    e
                );
                return None;
            }
        };

        debug!("Recorded worker {}", details.name);

        if let Ok(mut workers) = self.workers.write() {
            workers.insert(details.name.clone(), details.clone());
        }

        Some(details)
    }

    /// Looks up a worker by name
    pub fn get(&self, name: &str) -> Option<ServiceDetails> {
        self.workers.read().ok()?.get(name).cloned()
    }

    /// Names of all known workers in no particular order
    pub fn names(&self) -> Vec<String> {
        self.workers
            .read()
            .map(|workers| workers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of known workers
    pub fn len(&self) -> usize {
        self.workers.read().map(|w| w.len()).unwrap_or_default()
    }

    /// Whether no worker has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

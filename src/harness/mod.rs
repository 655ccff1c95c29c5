//! Runtime harness turning stream handles and an [`EventHandler`] into a running service
//!
//! The [`EventDispatchService`] owns all stream handles of a service. Command streams are read
//! through the [`ConsumerGroupRouter`], outbound events go through the [`EventPublisher`] and the
//! [`ServiceDriver`] keeps everything polling until the [`Heart`] dies.

mod announcer;
mod driver;
mod error;
mod heart;
mod metrics;
mod publisher;
mod router;
mod service;

pub use announcer::*;
pub use driver::*;
pub use error::*;
pub use heart::*;
pub use metrics::*;
pub use publisher::*;
pub use router::*;
pub use service::*;

//! Tracing module
//!
//! Spans are created through the global [`opentelemetry`] tracer and carried between services
//! inside the events themselves, see [`TraceContext`].

pub mod constants;
mod init;
mod propagation;

pub use init::{flush, init};
pub use propagation::{MetricsSource, TraceContext};

use opentelemetry::global::{self, BoxedTracer};

/// Tracer used for all spans created by this crate
pub fn global_tracer() -> BoxedTracer {
    global::tracer("event-service")
}

use super::constants::EVENT_ID;
use super::global_tracer;
use crate::library::communication::event::{
    EventData, EventDataExt, TRACER_FIELD, TRACER_HEADERS_FIELD,
};
use opentelemetry::{
    global,
    trace::{FutureExt, Span, StatusCode, TraceContextExt, Tracer},
    Context, KeyValue,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

const INJECTION_SPAN: &str = "tracer_injection";

/// Provider of live counters which are attached to spans as attributes
pub trait MetricsSource: Send + Sync {
    /// Current values, each as a span attribute
    fn snapshot(&self) -> Vec<KeyValue>;
}

/// Carries trace context through events
///
/// The propagation headers of the globally installed text map propagator are stored in the
/// `tracer.headers` field of an event. Consumers continue the trace of the producer from there.
#[derive(Clone, Default)]
pub struct TraceContext {
    metrics: Option<Arc<dyn MetricsSource>>,
}

impl TraceContext {
    /// Creates a new instance which does not attach metrics to spans
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a snapshot of the given metrics to every span opened by [`wrap`](Self::wrap)
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Rebuilds the remote parent context from the headers embedded in an event.
    /// Returns `None` if the event carries no usable headers.
    pub fn extract(&self, event: &EventData) -> Option<Context> {
        let headers: HashMap<String, String> = event
            .get(TRACER_FIELD)?
            .get(TRACER_HEADERS_FIELD)?
            .as_object()?
            .iter()
            .filter_map(|(key, value)| Some((key.to_owned(), value.as_str()?.to_owned())))
            .collect();

        let cx = global::get_text_map_propagator(|propagator| propagator.extract(&headers));

        if cx.span().span_context().is_valid() {
            Some(cx)
        } else {
            None
        }
    }

    /// Embeds the propagation headers of a short-lived child of the current context into the event,
    /// replacing any headers it carried before
    pub fn inject(&self, mut event: EventData) -> EventData {
        let mut span = global_tracer().start_with_context(INJECTION_SPAN, Context::current());

        if let Some(id) = event.event_id() {
            span.set_attribute(EVENT_ID.string(id.to_owned()));
        }

        let cx = Context::current_with_span(span);
        let mut headers: HashMap<String, String> = HashMap::new();
        global::get_text_map_propagator(|propagator| propagator.inject_context(&cx, &mut headers));
        cx.span().end();

        let headers: Map<String, Value> = headers
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        let mut tracer = Map::new();
        tracer.insert(TRACER_HEADERS_FIELD.to_owned(), Value::Object(headers));
        event.insert(TRACER_FIELD.to_owned(), Value::Object(tracer));

        event
    }

    /// Runs `method` within a new span named `name`
    ///
    /// The span is a child of `parent` or a new root if there is none, carries the given tags
    /// (plus a metrics snapshot if configured) and is marked as failed if the method returns an error.
    /// It is ended on every exit path, including the returned future being dropped.
    pub async fn wrap<F, T, E>(
        &self,
        name: &str,
        tags: Vec<KeyValue>,
        parent: Option<Context>,
        method: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut span =
            global_tracer().start_with_context(name.to_owned(), parent.unwrap_or_default());

        for tag in self.tags(tags) {
            span.set_attribute(tag);
        }

        let guard = SpanGuard(Context::current_with_span(span));
        let result = method.with_context(guard.0.clone()).await;

        if let Err(e) = &result {
            guard.0.span().set_status(StatusCode::Error, e.to_string());
        }

        result
    }

    fn tags(&self, mut tags: Vec<KeyValue>) -> Vec<KeyValue> {
        if let Some(metrics) = &self.metrics {
            tags.extend(metrics.snapshot());
        }

        tags
    }
}

/// Ends the span of the contained context when dropped
struct SpanGuard(Context);

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.0.span().end();
    }
}

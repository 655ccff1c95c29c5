//! Structures to realise an event-driven service architecture
//!
//! In an event driven world, services have no knowledge of each other. Whenever something
//! noteworthy happens, a service appends an event to a named stream. Every interested party
//! reads from that stream as part of a consumer group: each group keeps its own cursor and
//! all consumers sharing a group id compete for, rather than duplicate, delivery.
//!
//! On the wire an event is a flat field map carrying the JSON encoded payload in a single
//! `event` field (see [`EventSerializer`]). Providers of the underlying log implement the
//! [`StreamFactory`] and [`StreamHandle`] traits and are responsible for normalizing whatever
//! their backend returns into string keyed [`WireMessages`](WireMessage).

mod data;
mod serializer;
mod stream;

pub use data::*;
pub use serializer::*;
pub use stream::*;

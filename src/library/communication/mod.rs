//! Structures to communicate between services in a distributed system
//!
//! Services exchange [`EventData`](event::EventData) by appending it to named streams and
//! reading it back through consumer groups. The [`event`] module defines the wire format and
//! the contract every stream provider has to fulfill, [`implementation`] contains the
//! providers themselves and [`discovery`] carries the structures used to announce a service
//! to the rest of the system.

pub mod discovery;
pub mod event;
pub mod implementation;

//! This library crate contains everything required to run an event-driven service on top of a stream log.
//!
//! Submodules have been introduced to split responsibilities. The low-level [`library`] contains
//! project agnostic building blocks (wire format, stream contracts, tracing propagation, discovery)
//! while the [`harness`] assembles them into a runnable dispatch service with its consumer groups,
//! publishing streams and startup announcement.

#![deny(missing_docs)]
#![allow(clippy::nonstandard_macro_braces)]

pub mod harness;
pub mod library;
pub mod options;

//! Independent and project agnostic libraries
//!
//! Any of the library submodules in this module could be extracted into their own crate.
//! They know nothing about a specific service and only provide the contracts and primitives
//! which the [`harness`](super::harness) composes into a running service.

pub mod communication;
pub mod helpers;
pub mod telemetry;

/// Generic error type
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result with no value and a [`BoxedError`]
pub type EmptyResult = Result<(), BoxedError>;

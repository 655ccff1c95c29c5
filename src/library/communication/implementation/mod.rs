//! Implementations of the [`StreamFactory`](super::event::StreamFactory) contract

pub mod memory;
pub mod redis;

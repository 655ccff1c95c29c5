use thiserror::Error;

/// Programming mistakes detected while constructing or using a service
///
/// These are never recovered from by the harness itself and always surface to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An event has been published under a type which has not been declared up front
    #[error("event type {0} has not been declared for publishing")]
    UndeclaredEventType(String),
    /// Service details are set but the announcement event type is not declared for publishing
    #[error("service details require {0} to be declared for publishing")]
    MissingAnnouncementEventType(&'static str),
    /// A consumer sub-group has been requested which has not been declared
    #[error("consumer sub-group {0} does not exist")]
    UnknownSubgroup(String),
}

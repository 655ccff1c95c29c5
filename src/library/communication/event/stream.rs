use super::WireMessage;
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Identifier assigned to an entry by the stream provider
pub type EntryId = String;

/// Entry read from a single stream
pub type StreamEntry = (EntryId, WireMessage);

/// Entries read from a multiplexed handle, grouped by the stream they originate from
pub type StreamEntryBatch = Vec<(String, Vec<StreamEntry>)>;

/// Access mode requested from a [`StreamFactory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Write-only handle for a single stream
    StreamOnly,
    /// Consumer group read handle for a single stream
    SingleKeyConsumerOnly,
    /// Consumer group read handle multiplexing several streams.
    /// Delivered entries are not tracked as pending, reading them consumes them.
    ManyKeyConsumerOnly,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StreamOnly => "streamOnly",
            Self::SingleKeyConsumerOnly => "keyConsumerOnly",
            Self::ManyKeyConsumerOnly => "manyKeyConsumerOnly",
        };

        write!(f, "{}", name)
    }
}

/// Errors raised by stream providers when a handle is created or used incorrectly
#[derive(Debug, Error)]
pub enum StreamError {
    /// Operation can not be performed with the access mode of the handle
    #[error("{operation} is not supported by {stype} handle {key}")]
    UnsupportedOperation {
        /// Name of the attempted operation
        operation: &'static str,
        /// Access mode of the handle
        stype: StreamType,
        /// Key of the handle
        key: String,
    },
    /// Consumer handles can not be created without a consumer group id
    #[error("{0} handles require a consumer group id")]
    MissingConsumerGroup(StreamType),
    /// Handle has been requested with the wrong number of stream names
    #[error("{stype} handles require {expected} stream names, got {actual}")]
    InvalidStreamCount {
        /// Access mode of the handle
        stype: StreamType,
        /// Human readable expectation
        expected: &'static str,
        /// Number of names provided
        actual: usize,
    },
}

impl StreamError {
    /// Validates the arguments passed to [`StreamFactory::create`]
    pub fn check_arguments(
        streams: &[String],
        stype: StreamType,
        cg_id: Option<&str>,
    ) -> Result<(), StreamError> {
        let (valid, expected) = match stype {
            StreamType::StreamOnly | StreamType::SingleKeyConsumerOnly => {
                (streams.len() == 1, "exactly one")
            }
            StreamType::ManyKeyConsumerOnly => (!streams.is_empty(), "at least one"),
        };

        if !valid {
            return Err(StreamError::InvalidStreamCount {
                stype,
                expected,
                actual: streams.len(),
            });
        }

        if stype != StreamType::StreamOnly && cg_id.is_none() {
            return Err(StreamError::MissingConsumerGroup(stype));
        }

        Ok(())
    }
}

/// Handle to one or more named streams of an external stream provider
///
/// Which operations are meaningful depends on the [`StreamType`] the handle has been created with.
/// Implementations have to be safe to share between tasks as the publishing side may be used concurrently.
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Stable name of the handle, used in log messages and tracing tags
    fn key(&self) -> &str;

    /// Reads up to `count` pending entries from a single stream without blocking
    async fn read_events(&self, count: usize) -> Result<Vec<StreamEntry>, BoxedError>;

    /// Reads up to `count` pending entries from each stream of a multiplexed handle without blocking
    async fn read_stream_events_list(&self, count: usize) -> Result<StreamEntryBatch, BoxedError>;

    /// Appends a message and returns the identifier the provider assigned to it
    async fn write_events(&self, message: &WireMessage) -> Result<EntryId, BoxedError>;

    /// Acknowledges an entry as processed within the handle's consumer group
    async fn ack(&self, event_id: &str) -> EmptyResult;
}

/// Provider of [`StreamHandles`](StreamHandle), supplied by the host application
#[async_trait]
pub trait StreamFactory: Send + Sync {
    /// Creates a handle for the given stream names. Consumer handles require a consumer group id.
    async fn create(
        &self,
        streams: &[String],
        stype: StreamType,
        cg_id: Option<&str>,
    ) -> Result<Box<dyn StreamHandle>, BoxedError>;
}

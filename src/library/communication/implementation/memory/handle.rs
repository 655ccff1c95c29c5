use super::MemoryStreamFactory;
use crate::library::communication::event::{
    EntryId, StreamEntry, StreamEntryBatch, StreamError, StreamHandle, StreamType, WireMessage,
};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// [`StreamHandle`] into the streams of a [`MemoryStreamFactory`]
///
/// Multiplexed handles read up to `count` entries from every stream and rotate the order of the
/// returned batch on every call. Their entries are never pending.
pub struct MemoryStreamHandle {
    factory: MemoryStreamFactory,
    key: String,
    streams: Vec<String>,
    stype: StreamType,
    group: Option<String>,
    rotation: AtomicUsize,
}

impl MemoryStreamHandle {
    pub(super) fn new(
        factory: MemoryStreamFactory,
        streams: Vec<String>,
        stype: StreamType,
        group: Option<String>,
    ) -> Self {
        Self {
            factory,
            key: streams.join(","),
            streams,
            stype,
            group,
            rotation: AtomicUsize::new(0),
        }
    }

    fn unsupported(&self, operation: &'static str) -> BoxedError {
        StreamError::UnsupportedOperation {
            operation,
            stype: self.stype,
            key: self.key.clone(),
        }
        .into()
    }

    fn consumer_group(&self, operation: &'static str) -> Result<&str, BoxedError> {
        match (&self.group, self.stype) {
            (Some(group), StreamType::SingleKeyConsumerOnly)
            | (Some(group), StreamType::ManyKeyConsumerOnly) => Ok(group),
            _ => Err(self.unsupported(operation)),
        }
    }
}

#[async_trait]
impl StreamHandle for MemoryStreamHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn read_events(&self, count: usize) -> Result<Vec<StreamEntry>, BoxedError> {
        if self.stype != StreamType::SingleKeyConsumerOnly {
            return Err(self.unsupported("read_events"));
        }

        let group = self.consumer_group("read_events")?;
        Ok(self
            .factory
            .lock()
            .deliver(&self.streams[0], group, count, true))
    }

    async fn read_stream_events_list(&self, count: usize) -> Result<StreamEntryBatch, BoxedError> {
        if self.stype != StreamType::ManyKeyConsumerOnly {
            return Err(self.unsupported("read_stream_events_list"));
        }

        let group = self.consumer_group("read_stream_events_list")?;
        let offset = self.rotation.fetch_add(1, Ordering::Relaxed);
        let mut state = self.factory.lock();
        let mut batch = StreamEntryBatch::new();

        for index in 0..self.streams.len() {
            let stream = &self.streams[(offset + index) % self.streams.len()];
            let entries = state.deliver(stream, group, count, false);

            if !entries.is_empty() {
                batch.push((stream.clone(), entries));
            }
        }

        Ok(batch)
    }

    async fn write_events(&self, message: &WireMessage) -> Result<EntryId, BoxedError> {
        if self.stype != StreamType::StreamOnly {
            return Err(self.unsupported("write_events"));
        }

        Ok(self.factory.lock().append(&self.streams[0], message.clone()))
    }

    async fn ack(&self, event_id: &str) -> EmptyResult {
        let group = self.consumer_group("ack")?;
        let mut state = self.factory.lock();

        // Identifiers are unique across all streams of the factory, so at most one stream matches
        for stream in &self.streams {
            if state.acknowledge(stream, group, event_id) {
                break;
            }
        }

        Ok(())
    }
}

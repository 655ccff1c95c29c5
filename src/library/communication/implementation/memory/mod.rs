//! In-process stream provider
//!
//! Keeps every stream as an append-only vector inside the process. Consumer groups are modelled
//! with a cursor into the log and a list of delivered but unacknowledged entries, mirroring the
//! semantics of Redis consumer groups closely enough to exercise services without a network dependency.
//! Multiplexed reads apply their count to every stream and leave nothing pending, like `XREADGROUP ... NOACK`.
//! Every clone of a [`MemoryStreamFactory`] shares the same streams.

mod handle;

pub use handle::MemoryStreamHandle;

use super::super::event::{
    EntryId, StreamEntry, StreamError, StreamFactory, StreamHandle, StreamType, WireMessage,
};
use crate::library::BoxedError;
use async_trait::async_trait;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct GroupState {
    cursor: usize,
    pending: Vec<EntryId>,
    acknowledged: Vec<EntryId>,
}

#[derive(Debug, Default)]
struct StreamLog {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct Streams {
    sequence: u64,
    logs: HashMap<String, StreamLog>,
}

impl Streams {
    fn append(&mut self, stream: &str, message: WireMessage) -> EntryId {
        self.sequence += 1;
        let id = format!("{}-0", self.sequence);

        self.logs
            .entry(stream.to_owned())
            .or_default()
            .entries
            .push((id.clone(), message));

        id
    }

    fn join_group(&mut self, stream: &str, group: &str) {
        self.logs
            .entry(stream.to_owned())
            .or_default()
            .groups
            .entry(group.to_owned())
            .or_default();
    }

    fn deliver(
        &mut self,
        stream: &str,
        group: &str,
        count: usize,
        track_pending: bool,
    ) -> Vec<StreamEntry> {
        let log = self.logs.entry(stream.to_owned()).or_default();
        let state = log.groups.entry(group.to_owned()).or_default();

        let end = (state.cursor + count).min(log.entries.len());
        let delivered = log.entries[state.cursor..end].to_vec();

        state.cursor = end;

        if track_pending {
            state
                .pending
                .extend(delivered.iter().map(|(id, _)| id.clone()));
        }

        delivered
    }

    fn acknowledge(&mut self, stream: &str, group: &str, id: &str) -> bool {
        let state = match self
            .logs
            .get_mut(stream)
            .and_then(|log| log.groups.get_mut(group))
        {
            Some(state) => state,
            None => return false,
        };

        match state.pending.iter().position(|pending| pending == id) {
            Some(index) => {
                state.pending.remove(index);
                state.acknowledged.push(id.to_owned());
                true
            }
            None => false,
        }
    }

    fn group(&self, stream: &str, group: &str) -> Option<&GroupState> {
        self.logs.get(stream).and_then(|log| log.groups.get(group))
    }
}

/// [`StreamFactory`] implementation keeping all streams in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamFactory {
    streams: Arc<Mutex<Streams>>,
}

impl MemoryStreamFactory {
    /// Creates a new, empty set of streams
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Streams> {
        // The state stays consistent even if a holder panicked, every mutation is a single step
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a message to a stream directly, bypassing any handle
    pub fn push(&self, stream: &str, message: WireMessage) -> EntryId {
        self.lock().append(stream, message)
    }

    /// All entries ever written to a stream, in order
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        self.lock()
            .logs
            .get(stream)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    /// Entries delivered to a consumer group but not yet acknowledged
    pub fn pending(&self, stream: &str, group: &str) -> Vec<EntryId> {
        self.lock()
            .group(stream, group)
            .map(|state| state.pending.clone())
            .unwrap_or_default()
    }

    /// Entries acknowledged by a consumer group, in acknowledgment order
    pub fn acknowledged(&self, stream: &str, group: &str) -> Vec<EntryId> {
        self.lock()
            .group(stream, group)
            .map(|state| state.acknowledged.clone())
            .unwrap_or_default()
    }

    /// Names of all consumer groups registered on a stream
    pub fn groups(&self, stream: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .lock()
            .logs
            .get(stream)
            .map(|log| log.groups.keys().cloned().collect())
            .unwrap_or_default();

        groups.sort();
        groups
    }
}

#[async_trait]
impl StreamFactory for MemoryStreamFactory {
    async fn create(
        &self,
        streams: &[String],
        stype: StreamType,
        cg_id: Option<&str>,
    ) -> Result<Box<dyn StreamHandle>, BoxedError> {
        StreamError::check_arguments(streams, stype, cg_id)?;

        let group = cg_id.map(ToOwned::to_owned);

        if let Some(group) = &group {
            let mut state = self.lock();
            for stream in streams {
                state.join_group(stream, group);
            }
        }

        trace!("Created {} handle for {:?} ({:?})", stype, streams, group);

        Ok(Box::new(MemoryStreamHandle::new(
            self.clone(),
            streams.to_vec(),
            stype,
            group,
        )))
    }
}

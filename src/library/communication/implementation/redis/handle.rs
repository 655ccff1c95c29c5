use super::{STREAM_ID_ADDITIONS, STREAM_ID_NEW};
use crate::library::communication::event::{
    EntryId, StreamEntry, StreamEntryBatch, StreamError, StreamHandle, StreamType, WireMessage,
};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use log::warn;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

/// [`StreamHandle`] backed by Redis stream commands
///
/// - writes use [`XADD`](https://redis.io/commands/xadd)
/// - reads use [`XREADGROUP`](https://redis.io/commands/xreadgroup) without blocking, only requesting new entries
///   (with `NOACK` for multiplexed handles)
/// - acknowledgments use [`XACK`](https://redis.io/commands/xack)
pub struct RedisStreamHandle {
    con: MultiplexedConnection,
    key: String,
    streams: Vec<String>,
    stype: StreamType,
    membership: Option<(String, String)>,
    limit: Option<usize>,
}

impl RedisStreamHandle {
    pub(super) fn new(
        con: MultiplexedConnection,
        streams: Vec<String>,
        stype: StreamType,
        membership: Option<(String, String)>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            con,
            key: streams.join(","),
            streams,
            stype,
            membership,
            limit,
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

    async fn read_group(
        &self,
        operation: &'static str,
        count: usize,
    ) -> Result<StreamEntryBatch, BoxedError> {
        let (group, consumer) = match &self.membership {
            Some(membership) => membership,
            None => return Err(self.unsupported(operation)),
        };

        let ids = vec![STREAM_ID_ADDITIONS; self.streams.len()];
        let options = read_options(self.stype, group, consumer, count);

        let mut con = self.con.clone();
        let reply = con
            .xread_options::<_, _, Option<StreamReadReply>>(&self.streams, &ids, options)
            .await?;

        let batch = reply
            .map(|reply| reply.keys)
            .unwrap_or_default()
            .into_iter()
            .map(|stream| {
                let entries = stream.ids.into_iter().map(normalize).collect::<Vec<_>>();
                (stream.key, entries)
            })
            .filter(|(_, entries)| !entries.is_empty())
            .collect();

        Ok(batch)
    }
}

/// Options for a non-blocking group read. Multiplexed handles read with `NOACK` so consumed
/// entries never accumulate in the pending entries list of the group.
fn read_options(stype: StreamType, group: &str, consumer: &str, count: usize) -> StreamReadOptions {
    let options = StreamReadOptions::default()
        .group(group, consumer)
        .count(count);

    if stype == StreamType::ManyKeyConsumerOnly {
        options.noack()
    } else {
        options
    }
}

/// Converts the binary field values of a stream entry into strings
fn normalize(entry: StreamId) -> StreamEntry {
    let mut message = WireMessage::new();

    for (field, value) in entry.map.iter() {
        match redis::from_redis_value::<String>(value) {
            Ok(value) => {
                message.insert(field.to_owned(), value);
            }
            Err(e) => warn!(
                "Dropping field {} of entry {} with non-string value: {}",
                field, entry.id, e
            ),
        }
    }

    (entry.id, message)
}

#[async_trait]
impl StreamHandle for RedisStreamHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn read_events(&self, count: usize) -> Result<Vec<StreamEntry>, BoxedError> {
        if self.stype != StreamType::SingleKeyConsumerOnly {
            return Err(self.unsupported("read_events"));
        }

        let entries = self
            .read_group("read_events", count)
            .await?
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();

        Ok(entries)
    }

    async fn read_stream_events_list(&self, count: usize) -> Result<StreamEntryBatch, BoxedError> {
        if self.stype != StreamType::ManyKeyConsumerOnly {
            return Err(self.unsupported("read_stream_events_list"));
        }

        self.read_group("read_stream_events_list", count).await
    }

    async fn write_events(&self, message: &WireMessage) -> Result<EntryId, BoxedError> {
        if self.stype != StreamType::StreamOnly {
            return Err(self.unsupported("write_events"));
        }

        let items: Vec<(&String, &String)> = message.iter().collect();
        let mut con = self.con.clone();

        let id = match self.limit {
            Some(limit) => {
                con.xadd_maxlen::<_, _, _, _, String>(
                    &self.key,
                    StreamMaxlen::Approx(limit),
                    STREAM_ID_NEW,
                    &items,
                )
                .await?
            }
            None => {
                con.xadd::<_, _, _, _, String>(&self.key, STREAM_ID_NEW, &items)
                    .await?
            }
        };

        Ok(id)
    }

    async fn ack(&self, event_id: &str) -> EmptyResult {
        let group = match (&self.membership, self.stype) {
            (Some((group, _)), StreamType::SingleKeyConsumerOnly)
            | (Some((group, _)), StreamType::ManyKeyConsumerOnly) => group,
            _ => return Err(self.unsupported("ack")),
        };

        let mut con = self.con.clone();

        // The id alone does not name the stream, so it is acknowledged on every stream of the handle
        for stream in &self.streams {
            con.xack::<_, _, _, ()>(stream, group, &[event_id]).await?;
        }

        Ok(())
    }
}

use super::{RedisStreamHandle, STREAM_ID_HEAD};
use crate::library::communication::event::{
    StreamError, StreamFactory, StreamHandle, StreamType,
};
use crate::library::BoxedError;
use async_trait::async_trait;
use log::{debug, trace};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult};

/// [`StreamFactory`] implementation handing out handles to a Redis server
///
/// All handles share one multiplexed connection. Reads never block, so sharing it does not
/// stall writers or other consumers.
#[derive(Clone)]
pub struct RedisStreamFactory {
    client: Client,
    consumer: String,
    limit: Option<usize>,
}

impl RedisStreamFactory {
    /// Creates a new factory connecting to the given URL. Consumer handles identify themselves
    /// within their consumer group with the given consumer name.
    pub fn new(url: &str, consumer: impl Into<String>) -> RedisResult<Self> {
        Ok(Self {
            client: Client::open(url)?,
            consumer: consumer.into(),
            limit: None,
        })
    }

    /// Caps streams written through this factory at approximately `limit` entries
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    async fn connection(&self) -> RedisResult<MultiplexedConnection> {
        trace!("Opening multiplexed redis connection");
        self.client.get_multiplexed_tokio_connection().await
    }
}

#[async_trait]
impl StreamFactory for RedisStreamFactory {
    async fn create(
        &self,
        streams: &[String],
        stype: StreamType,
        cg_id: Option<&str>,
    ) -> Result<Box<dyn StreamHandle>, BoxedError> {
        StreamError::check_arguments(streams, stype, cg_id)?;

        let mut con = self.connection().await?;

        if let Some(group) = cg_id {
            for stream in streams {
                // Fails if the group already exists which is fine
                con.xgroup_create_mkstream::<_, _, _, ()>(stream, group, STREAM_ID_HEAD)
                    .await
                    .ok();
            }
        }

        debug!("Created {} handle for {:?} ({:?})", stype, streams, cg_id);

        Ok(Box::new(RedisStreamHandle::new(
            con,
            streams.to_vec(),
            stype,
            cg_id.map(|group| (group.to_owned(), self.consumer.clone())),
            self.limit,
        )))
    }
}

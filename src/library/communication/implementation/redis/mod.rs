//! Stream provider implementation using [Redis Streams](https://redis.io/topics/streams-intro)

const STREAM_ID_NEW: &str = "*";
const STREAM_ID_HEAD: &str = "0";
const STREAM_ID_ADDITIONS: &str = ">";

mod factory;
mod handle;

pub use factory::*;
pub use handle::*;

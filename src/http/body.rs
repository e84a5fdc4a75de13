//! Response body type
//!
//! Either a fully buffered body or a stream of frames fed through a bounded
//! channel by a blocking archive reader.

use http_body_util::{Either, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Sending half used by the archive reader to feed a streamed body
pub type ChunkSender = mpsc::Sender<io::Result<Frame<Bytes>>>;

/// Streamed half of [`ResponseBody`]
pub type ChunkStream = StreamBody<ReceiverStream<io::Result<Frame<Bytes>>>>;

/// Body of every response the server produces
pub type ResponseBody = Either<Full<Bytes>, ChunkStream>;

/// Chunks buffered between the blocking reader and the connection
pub const STREAM_CHANNEL_CAPACITY: usize = 4;

pub fn empty_body() -> ResponseBody {
    full_body(Bytes::new())
}

pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Either::Left(Full::new(data.into()))
}

/// Streamed body and the sender its producer writes frames into
///
/// An `Err` item aborts the body; dropping the sender ends it. The body carries
/// no length of its own, so callers set `Content-Length`.
pub fn channel_body() -> (ChunkSender, ResponseBody) {
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    (tx, Either::Right(StreamBody::new(ReceiverStream::new(rx))))
}

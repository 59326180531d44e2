//! Streaming backpressure via bounded channels.
//!
//! Wraps a backend's chunk stream in a bounded `tokio::sync::mpsc`
//! channel so producers block when consumers fall behind. Without this, a
//! fast backend can fill unbounded memory when the caller is slow (a
//! rate-limited client, a congested websocket).

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::ChunkStream;

/// Default number of chunks buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Wrap a chunk stream in a bounded channel for backpressure.
///
/// Spawns a producer task that forwards chunks through a bounded channel.
/// When the channel fills, the producer waits; when the consumer drops
/// the stream, the producer stops and the in-flight backend call is
/// abandoned.
///
/// Requires a tokio runtime context.
pub fn bounded_chunks(inner: ChunkStream, buffer_size: usize) -> ChunkStream {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut inner = inner;
        while let Some(chunk) = inner.next().await {
            if tx.send(chunk).await.is_err() {
                break; // receiver dropped
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn forwards_all_chunks_in_order() {
        let chunks = vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())];
        let inner: ChunkStream = Box::pin(stream::iter(chunks));
        let mut bounded = bounded_chunks(inner, 2);

        let mut collected = Vec::new();
        while let Some(chunk) = bounded.next().await {
            collected.push(chunk.unwrap());
        }
        assert_eq!(collected, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn terminates_when_inner_closes() {
        let inner: ChunkStream = Box::pin(stream::iter(Vec::new()));
        let mut bounded = bounded_chunks(inner, 4);
        assert!(bounded.next().await.is_none());
    }
}

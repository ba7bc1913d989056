//! SSE relay from the upstream chunk stream to the client.
//!
//! Every chunk becomes one `data: <json>\n\n` frame, written as soon as it
//! arrives. An upstream failure becomes a single `data: {"error": ...}`
//! frame. The stream always ends with `data: [DONE]\n\n`, whatever happened
//! before, because the status line is already committed once the first
//! frame is out.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use crate::storage::{metadata, LogBuffer};
use crate::upstream::{ChunkStream, StreamChunk};

/// Terminal frame of every relayed stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Serialize a value as one SSE `data:` frame.
pub fn sse_frame<T: Serialize>(payload: &T) -> Bytes {
    match serde_json::to_string(payload) {
        Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
        Err(e) => error_frame(&format!("failed to encode chunk: {}", e)),
    }
}

/// In-band error frame: `data: {"error": "<message>"}`.
pub fn error_frame(message: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json!({ "error": message })))
}

/// Logs a warning if the relay is dropped before it finished, which is how
/// a client disconnect shows up.
struct DisconnectGuard {
    logs: Arc<LogBuffer>,
    request_id: String,
    frames_sent: usize,
    completed: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::warn!(
            request_id = %self.request_id,
            frames_sent = self.frames_sent,
            "Client disconnected mid-stream, upstream request dropped"
        );
        self.logs.warning(
            "Client disconnected mid-stream",
            Some(metadata([
                ("request_id", json!(self.request_id)),
                ("frames_sent", json!(self.frames_sent)),
            ])),
        );
    }
}

/// Relay `chunks` as SSE frames.
///
/// Upstream chunks are pulled one at a time, only when the client is ready
/// for the next frame. Dropping the returned stream drops `chunks`, which
/// cancels the upstream request.
pub fn relay(
    chunks: ChunkStream,
    logs: Arc<LogBuffer>,
    request_id: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        let mut chunks = chunks;
        let mut guard = DisconnectGuard {
            logs: logs.clone(),
            request_id: request_id.clone(),
            frames_sent: 0,
            completed: false,
        };
        let mut finish_reason: Option<String> = None;
        let mut failed = false;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if let StreamChunk::Finish { finish_reason: reason } = &chunk {
                        finish_reason = Some(reason.clone());
                    }
                    guard.frames_sent += 1;
                    yield Ok(sse_frame(&chunk));
                }
                Err(e) => {
                    failed = true;
                    tracing::error!(request_id = %request_id, error = %e, "Error in streaming");
                    logs.error(
                        format!("Error in streaming: {}", e),
                        Some(metadata([
                            ("request_id", json!(request_id)),
                            ("frames_sent", json!(guard.frames_sent)),
                        ])),
                    );
                    guard.frames_sent += 1;
                    yield Ok(error_frame(&e.to_string()));
                    break;
                }
            }
        }

        // Release the upstream connection before the final frame.
        drop(chunks);

        if !failed {
            tracing::info!(
                request_id = %request_id,
                finish_reason = ?finish_reason,
                frames = guard.frames_sent,
                "Streaming response completed"
            );
            logs.info(
                "Streaming response completed",
                Some(metadata([
                    ("request_id", json!(request_id)),
                    ("finish_reason", json!(finish_reason)),
                    ("chunks", json!(guard.frames_sent)),
                ])),
            );
        }

        guard.completed = true;
        yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamError;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn collect_frames(chunks: ChunkStream, logs: Arc<LogBuffer>) -> Vec<String> {
        relay(chunks, logs, "req-1".to_string())
            .map(|frame| String::from_utf8(frame.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    fn chunk_stream(items: Vec<Result<StreamChunk, UpstreamError>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_two_fragments_then_finish() {
        let logs = Arc::new(LogBuffer::new(10));
        let frames = collect_frames(
            chunk_stream(vec![
                Ok(StreamChunk::content("Hel")),
                Ok(StreamChunk::content("lo")),
                Ok(StreamChunk::finish("stop")),
            ]),
            logs.clone(),
        )
        .await;

        assert_eq!(
            frames,
            vec![
                "data: {\"content\":\"Hel\"}\n\n",
                "data: {\"content\":\"lo\"}\n\n",
                "data: {\"finishReason\":\"stop\"}\n\n",
                "data: [DONE]\n\n",
            ]
        );

        let entries = logs.query(10, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Streaming response completed");
        assert_eq!(entries[0].metadata.as_ref().unwrap()["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_error_mid_stream_emits_error_frame_then_done() {
        let logs = Arc::new(LogBuffer::new(10));
        let frames = collect_frames(
            chunk_stream(vec![
                Ok(StreamChunk::content("partial")),
                Err(UpstreamError::Provider("overloaded".to_string())),
                Ok(StreamChunk::content("never relayed")),
            ]),
            logs.clone(),
        )
        .await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], "data: {\"content\":\"partial\"}\n\n");
        assert_eq!(frames[1], "data: {\"error\":\"Provider error: overloaded\"}\n\n");
        assert_eq!(frames[2], DONE_FRAME);

        let errors = logs.query(10, Some("ERROR"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_empty_upstream_still_terminates() {
        let logs = Arc::new(LogBuffer::new(10));
        let frames = collect_frames(chunk_stream(vec![]), logs).await;
        assert_eq!(frames, vec![DONE_FRAME.to_string()]);
    }

    #[tokio::test]
    async fn test_done_is_last_and_unique() {
        let logs = Arc::new(LogBuffer::new(10));
        let frames = collect_frames(
            chunk_stream(vec![
                Ok(StreamChunk::content("[DONE]")),
                Err(UpstreamError::Truncated),
            ]),
            logs,
        )
        .await;

        let done_count = frames.iter().filter(|f| f.as_str() == DONE_FRAME).count();
        assert_eq!(done_count, 1);
        assert_eq!(frames.last().unwrap(), DONE_FRAME);
    }

    #[tokio::test]
    async fn test_dropping_relay_early_logs_disconnect() {
        let logs = Arc::new(LogBuffer::new(10));
        let mut relay = Box::pin(relay(
            chunk_stream(vec![
                Ok(StreamChunk::content("a")),
                Ok(StreamChunk::content("b")),
            ]),
            logs.clone(),
            "req-2".to_string(),
        ));

        let first = relay.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"content\":\"a\"}\n\n");
        drop(relay);

        let warnings = logs.query(10, Some("WARNING"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Client disconnected mid-stream");
        assert_eq!(warnings[0].metadata.as_ref().unwrap()["frames_sent"], 1);
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_relay_drops_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let upstream: ChunkStream = Box::pin(async_stream::stream! {
            let _flag = flag;
            yield Ok::<_, UpstreamError>(StreamChunk::content("a"));
            futures::future::pending::<()>().await;
        });

        let logs = Arc::new(LogBuffer::new(10));
        let mut relay = Box::pin(relay(upstream, logs.clone(), "req-3".to_string()));

        let first = relay.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"content\":\"a\"}\n\n");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(relay);

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(logs.query(10, Some("WARNING")).len(), 1);
    }

    #[test]
    fn test_error_frame_escapes_message() {
        let frame = error_frame("bad \"quote\"\nnewline");
        assert_eq!(
            &frame[..],
            b"data: {\"error\":\"bad \\\"quote\\\"\\nnewline\"}\n\n"
        );
    }
}

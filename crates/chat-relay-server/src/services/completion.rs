//! Producer/consumer handoff between an upstream completion call and its reader.
//!
//! Every call gets its own bounded channel. The producer sends fragments and then
//! exactly one terminal item (`Done` or `Failed`); the consumer suspends on `recv`
//! until the next item arrives. A producer that goes away without a terminal item
//! is observed as `UpstreamError::Closed`, so a reader can never wait forever.

use thiserror::Error;

use crate::models::chat::ChatMessage;

/// Buffered fragments per call before the producer waits for the reader.
pub const HANDOFF_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream API key is not configured")]
    MissingCredential,

    #[error("failed to call completion API: {0}")]
    Transport(String),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no data from completion API for {0}s")]
    IdleTimeout(u64),

    #[error("too many concurrent completion calls: {0}")]
    Busy(String),

    #[error("completion stream closed before completion signal")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Fragment(String),
    Done,
    Failed(UpstreamError),
}

/// Consumer half of a completion call.
pub struct CompletionStream {
    rx: flume::Receiver<StreamItem>,
    finished: bool,
}

/// Producer half of a completion call.
pub struct CompletionSender {
    tx: flume::Sender<StreamItem>,
}

impl CompletionStream {
    pub fn channel() -> (CompletionSender, CompletionStream) {
        let (tx, rx) = flume::bounded(HANDOFF_CAPACITY);
        (
            CompletionSender { tx },
            CompletionStream {
                rx,
                finished: false,
            },
        )
    }

    /// A stream that fails immediately, for errors detected before any request is made.
    pub fn failed(err: UpstreamError) -> Self {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.send(StreamItem::Failed(err));
        Self { rx, finished: false }
    }

    /// Pre-loaded stream; used to script upstream replies in tests.
    #[cfg(test)]
    pub(crate) fn from_items(items: Vec<StreamItem>) -> Self {
        let (tx, rx) = flume::unbounded();
        for item in items {
            let _ = tx.send(item);
        }
        Self { rx, finished: false }
    }

    /// Next item of the call. After a terminal item, keeps returning `Done`.
    pub async fn recv(&mut self) -> StreamItem {
        if self.finished {
            return StreamItem::Done;
        }

        let item = match self.rx.recv_async().await {
            Ok(item) => item,
            Err(_) => StreamItem::Failed(UpstreamError::Closed),
        };

        if !matches!(item, StreamItem::Fragment(_)) {
            self.finished = true;
        }
        item
    }

    /// Drain the call into one string (side queries: title, summary).
    pub async fn collect_text(mut self) -> Result<String, UpstreamError> {
        let mut text = String::new();
        loop {
            match self.recv().await {
                StreamItem::Fragment(fragment) => text.push_str(&fragment),
                StreamItem::Done => return Ok(text),
                StreamItem::Failed(err) => return Err(err),
            }
        }
    }
}

impl CompletionSender {
    /// Returns false once the reader is gone; the producer should stop then.
    pub async fn fragment(&self, text: String) -> bool {
        self.tx.send_async(StreamItem::Fragment(text)).await.is_ok()
    }

    pub async fn finish(self) {
        let _ = self.tx.send_async(StreamItem::Done).await;
    }

    pub async fn fail(self, err: UpstreamError) {
        let _ = self.tx.send_async(StreamItem::Failed(err)).await;
    }

    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }
}

/// Upstream chat-completion service.
///
/// Calls are independent: the main reply, title generation and summarization
/// each get their own stream and share no state.
#[cfg_attr(test, mockall::automock)]
pub trait CompletionClient: Send + Sync {
    fn stream(&self, messages: Vec<ChatMessage>, max_tokens: usize) -> CompletionStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fragments_then_done() {
        let (tx, mut rx) = CompletionStream::channel();
        tokio::spawn(async move {
            assert!(tx.fragment("Hel".to_string()).await);
            assert!(tx.fragment("lo".to_string()).await);
            tx.finish().await;
        });

        assert_eq!(rx.recv().await, StreamItem::Fragment("Hel".to_string()));
        assert_eq!(rx.recv().await, StreamItem::Fragment("lo".to_string()));
        assert_eq!(rx.recv().await, StreamItem::Done);
        assert_eq!(rx.recv().await, StreamItem::Done);
    }

    #[tokio::test]
    async fn test_dropped_producer_is_observed_as_closed() {
        let (tx, mut rx) = CompletionStream::channel();
        tokio::spawn(async move {
            tx.fragment("partial".to_string()).await;
            drop(tx);
        });

        assert_eq!(rx.recv().await, StreamItem::Fragment("partial".to_string()));
        assert_eq!(rx.recv().await, StreamItem::Failed(UpstreamError::Closed));
    }

    #[tokio::test]
    async fn test_zero_fragments_still_terminates() {
        let text = CompletionStream::from_items(vec![StreamItem::Done])
            .collect_text()
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_failure() {
        let result = CompletionStream::from_items(vec![
            StreamItem::Fragment("a".to_string()),
            StreamItem::Failed(UpstreamError::Transport("reset".to_string())),
        ])
        .collect_text()
        .await;
        assert_eq!(result, Err(UpstreamError::Transport("reset".to_string())));
    }

    #[tokio::test]
    async fn test_sender_sees_dropped_reader() {
        let (tx, rx) = CompletionStream::channel();
        drop(rx);
        assert!(tx.is_disconnected());
        assert!(!tx.fragment("lost".to_string()).await);
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let mut stream = CompletionStream::failed(UpstreamError::MissingCredential);
        assert_eq!(
            stream.recv().await,
            StreamItem::Failed(UpstreamError::MissingCredential)
        );
    }
}

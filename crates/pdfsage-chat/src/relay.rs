//! Cancellable streaming relay.
//!
//! `StreamRelay::run` pulls chunks from an upstream chat stream and hands
//! each non-empty `message.content` to a `FragmentSink` as soon as it
//! arrives. It ends in exactly one terminal state:
//!
//! - `Exhausted`: upstream has no more chunks.
//! - `Disconnected`: the sink reported it can no longer be written to.
//! - `Errored`: upstream failed mid-stream. Already emitted text stays sent.
//! - `Cancelled`: the relay's cancellation token fired.
//!
//! The upstream stream is moved into `run` and dropped before it returns, so
//! the backend connection is released on every path. A sink that goes away
//! while upstream is silent ends the relay without waiting for the next chunk.
//! Reasoning text (`message.thinking`) is traced, never relayed.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use futures::{Stream, StreamExt};
use pdfsage_core::{Error, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::types::ChatChunk;

/// Downstream consumer of relayed fragments.
pub trait FragmentSink: Send {
    /// Whether the consumer can still be written to.
    fn is_connected(&self) -> bool;

    /// Deliver one fragment. Returns `false` if the consumer went away.
    fn emit(&mut self, fragment: String) -> impl Future<Output = bool> + Send;

    /// Resolves once the consumer has gone away. Never resolves while it is
    /// still connected.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Sink backed by a bounded channel whose receiver feeds an HTTP body.
///
/// The transport drops the receiver when the client goes away, which closes
/// the channel.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl FragmentSink for ChannelSink {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn emit(&mut self, fragment: String) -> bool {
        self.tx.send(fragment).await.is_ok()
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Sink writing fragments to a blocking writer (terminal output), flushing each one.
pub struct WriteSink<W> {
    writer: W,
    failed: bool,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FragmentSink for WriteSink<W> {
    fn is_connected(&self) -> bool {
        !self.failed
    }

    async fn emit(&mut self, fragment: String) -> bool {
        let written = self
            .writer
            .write_all(fragment.as_bytes())
            .and_then(|_| self.writer.flush());
        if written.is_err() {
            self.failed = true;
        }
        !self.failed
    }

    fn closed(&self) -> impl Future<Output = ()> + Send {
        // A writer only fails inside `emit`, so the state cannot change while waiting.
        let failed = self.failed;
        async move {
            if !failed {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Terminal state of one relay session.
#[derive(Debug)]
pub enum RelayOutcome {
    Exhausted,
    Disconnected,
    Errored(Error),
    Cancelled,
}

impl RelayOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Errored(_))
    }
}

/// What a finished relay did.
#[derive(Debug)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    /// Fragments delivered to the sink.
    pub fragments: usize,
}

/// Forwards fragments from an upstream chat stream to a sink.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    cancel: CancellationToken,
    pause: Duration,
}

impl StreamRelay {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            pause: Duration::ZERO,
        }
    }

    /// Sleep for `pause` after each fragment instead of a bare yield.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Relay `upstream` into `sink` until a terminal state is reached.
    pub async fn run<S, K>(&self, upstream: S, sink: &mut K) -> RelayReport
    where
        S: Stream<Item = Result<ChatChunk>> + Send,
        K: FragmentSink,
    {
        let mut upstream = Box::pin(upstream);
        let mut fragments = 0usize;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break RelayOutcome::Cancelled,
                _ = sink.closed() => break RelayOutcome::Disconnected,
                next = upstream.next() => next,
            };

            let chunk = match next {
                None => break RelayOutcome::Exhausted,
                Some(Err(e)) => break RelayOutcome::Errored(e),
                Some(Ok(chunk)) => chunk,
            };

            // Checked for every chunk, including ones that carry no content.
            if !sink.is_connected() {
                break RelayOutcome::Disconnected;
            }

            if !chunk.message.thinking.is_empty() {
                trace!("thinking: {}", chunk.message.thinking);
            }

            // Only the content is relayed; role and timing metadata are dropped.
            let fragment = chunk.message.content;
            if fragment.is_empty() {
                continue;
            }

            let delivered = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break RelayOutcome::Cancelled,
                ok = sink.emit(fragment) => ok,
            };
            if !delivered {
                break RelayOutcome::Disconnected;
            }
            fragments += 1;

            if self.pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.pause).await;
            }
        };

        drop(upstream);

        match &outcome {
            RelayOutcome::Exhausted => debug!("Stream finished after {} fragments", fragments),
            RelayOutcome::Disconnected => {
                info!("Client disconnected. Aborting stream after {} fragments", fragments)
            }
            RelayOutcome::Cancelled => {
                info!("Streaming cancelled by server after {} fragments", fragments)
            }
            RelayOutcome::Errored(e) => {
                error!("Error during streaming after {} fragments: {}", fragments, e)
            }
        }

        RelayReport { outcome, fragments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

    /// Upstream wrapper that records when it is dropped.
    struct TrackedStream<S> {
        inner: S,
        released: Arc<AtomicBool>,
    }

    impl<S: Stream + Unpin> Stream for TrackedStream<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for TrackedStream<S> {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn tracked<S>(inner: S) -> (TrackedStream<S>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let stream = TrackedStream {
            inner,
            released: released.clone(),
        };
        (stream, released)
    }

    fn chunks(parts: &[&str]) -> Vec<Result<ChatChunk>> {
        parts.iter().map(|p| Ok(ChatChunk::fragment(*p))).collect()
    }

    /// Records every write; optionally reports disconnected after `limit` writes
    /// or cancels a token after `cancel_after` writes.
    #[derive(Default)]
    struct RecordingSink {
        writes: Vec<String>,
        limit: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl FragmentSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.limit.map_or(true, |l| self.writes.len() < l)
        }

        async fn emit(&mut self, fragment: String) -> bool {
            self.writes.push(fragment);
            if let Some((n, token)) = &self.cancel_after {
                if self.writes.len() == *n {
                    token.cancel();
                }
            }
            true
        }

        fn closed(&self) -> impl Future<Output = ()> + Send {
            let connected = self.is_connected();
            async move {
                if connected {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    /// Appends `<fragment>` to a log shared between sinks.
    struct SharedLogSink {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FragmentSink for SharedLogSink {
        fn is_connected(&self) -> bool {
            true
        }

        async fn emit(&mut self, fragment: String) -> bool {
            self.log.lock().unwrap().push(fragment);
            true
        }

        async fn closed(&self) {
            std::future::pending::<()>().await
        }
    }

    /// Counts `ERROR` level events.
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_relays_all_fragments_in_order() {
        let (upstream, released) = tracked(futures::stream::iter(chunks(&[
            "Paris",
            " is",
            " the capital",
            " of France.",
        ])));
        let mut sink = RecordingSink::default();

        let report = StreamRelay::new(CancellationToken::new())
            .run(upstream, &mut sink)
            .await;

        assert!(matches!(report.outcome, RelayOutcome::Exhausted));
        assert_eq!(report.fragments, 4);
        assert_eq!(sink.writes.len(), 4);
        assert_eq!(sink.writes.concat(), "Paris is the capital of France.");
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_content_and_metadata_skipped() {
        let mut items = chunks(&["", "a", "", "b"]);
        items.push(Ok(ChatChunk {
            done: true,
            done_reason: Some("stop".into()),
            ..ChatChunk::default()
        }));
        let mut sink = RecordingSink::default();

        let report = StreamRelay::new(CancellationToken::new())
            .run(futures::stream::iter(items), &mut sink)
            .await;

        assert_eq!(report.fragments, 2);
        assert_eq!(sink.writes, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_disconnect_before_fifth_fragment() {
        let parts: Vec<String> = (1..=10).map(|i| format!("f{} ", i)).collect();
        let items: Vec<Result<ChatChunk>> =
            parts.iter().map(|p| Ok(ChatChunk::fragment(p.as_str()))).collect();
        let (upstream, released) = tracked(futures::stream::iter(items));
        let mut sink = RecordingSink {
            limit: Some(4),
            ..RecordingSink::default()
        };

        let report = StreamRelay::new(CancellationToken::new())
            .run(upstream, &mut sink)
            .await;

        assert!(matches!(report.outcome, RelayOutcome::Disconnected));
        assert_eq!(report.fragments, 4);
        assert_eq!(sink.writes, vec!["f1 ", "f2 ", "f3 ", "f4 "]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_emitted_fragments() {
        let mut items = chunks(&["one", "two", "three"]);
        items.push(Err(Error::StreamInterrupted("connection reset".into())));
        items.extend(chunks(&["never"]));
        let (upstream, released) = tracked(futures::stream::iter(items));
        let mut sink = RecordingSink::default();

        let report = StreamRelay::new(CancellationToken::new())
            .run(upstream, &mut sink)
            .await;

        assert!(report.outcome.is_error());
        assert_eq!(report.fragments, 3);
        assert_eq!(sink.writes, vec!["one", "two", "three"]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_server_cancel_after_two_fragments() {
        let token = CancellationToken::new();
        let parts: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let items: Vec<Result<ChatChunk>> =
            parts.iter().map(|p| Ok(ChatChunk::fragment(p.as_str()))).collect();
        let (upstream, released) = tracked(futures::stream::iter(items));
        let mut sink = RecordingSink {
            cancel_after: Some((2, token.clone())),
            ..RecordingSink::default()
        };

        let report = StreamRelay::new(token).run(upstream, &mut sink).await;

        assert!(matches!(report.outcome, RelayOutcome::Cancelled));
        assert_eq!(report.fragments, 2);
        assert_eq!(sink.writes, vec!["0", "1"]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_on_upstream() {
        let token = CancellationToken::new();
        let (upstream, released) = tracked(futures::stream::pending::<Result<ChatChunk>>());
        let relay = StreamRelay::new(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let mut sink = RecordingSink::default();
        let report = tokio::time::timeout(Duration::from_secs(5), relay.run(upstream, &mut sink))
            .await
            .expect("relay should stop on cancellation");
        canceller.await.unwrap();

        assert!(matches!(report.outcome, RelayOutcome::Cancelled));
        assert_eq!(report.fragments, 0);
        assert!(sink.writes.is_empty());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_channel_sink_detects_dropped_receiver() {
        let (tx, mut rx) = mpsc::channel::<String>(1);
        let (upstream_tx, upstream_rx) = mpsc::channel::<Result<ChatChunk>>(8);
        let upstream = futures::stream::unfold(upstream_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let (upstream, released) = tracked(Box::pin(upstream));

        let relay = StreamRelay::new(CancellationToken::new());
        let handle = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            relay.run(upstream, &mut sink).await
        });

        upstream_tx.send(Ok(ChatChunk::fragment("first"))).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("first"));

        // Client goes away, then the backend produces more text.
        drop(rx);
        upstream_tx.send(Ok(ChatChunk::fragment("second"))).await.unwrap();

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, RelayOutcome::Disconnected));
        assert_eq!(report.fragments, 1);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_write_sink_collects_output() {
        let mut sink = WriteSink::new(Vec::new());
        let report = StreamRelay::new(CancellationToken::new())
            .with_pause(Duration::from_millis(1))
            .run(futures::stream::iter(chunks(&["4", "2"])), &mut sink)
            .await;

        assert_eq!(report.fragments, 2);
        assert_eq!(sink.into_inner(), b"42");
    }

    #[tokio::test]
    async fn test_disconnect_seen_through_empty_chunks() {
        let mut items = chunks(&["a"]);
        items.extend((0..1000).map(|_| Ok(ChatChunk::fragment(""))));
        let upstream = futures::stream::iter(items).chain(futures::stream::pending());
        let (upstream, released) = tracked(Box::pin(upstream));
        let mut sink = RecordingSink {
            limit: Some(1),
            ..RecordingSink::default()
        };

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            StreamRelay::new(CancellationToken::new()).run(upstream, &mut sink),
        )
        .await
        .expect("relay should stop once the sink is gone");

        assert!(matches!(report.outcome, RelayOutcome::Disconnected));
        assert_eq!(report.fragments, 1);
        assert_eq!(sink.writes, vec!["a"]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_while_upstream_is_silent() {
        let (tx, mut rx) = mpsc::channel::<String>(1);
        let upstream = futures::stream::iter(chunks(&["first"])).chain(futures::stream::pending());
        let (upstream, released) = tracked(Box::pin(upstream));

        let relay = StreamRelay::new(CancellationToken::new());
        let handle = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            relay.run(upstream, &mut sink).await
        });

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        drop(rx);

        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("relay should notice the closed channel")
            .unwrap();
        assert!(matches!(report.outcome, RelayOutcome::Disconnected));
        assert_eq!(report.fragments, 1);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_thinking_is_not_relayed() {
        let thinking = ChatChunk {
            message: crate::types::ChatMessage {
                role: "assistant".into(),
                thinking: "The user wants the capital.".into(),
                ..Default::default()
            },
            ..ChatChunk::default()
        };
        let mut items = vec![Ok(thinking)];
        items.extend(chunks(&["Paris"]));
        let mut sink = RecordingSink::default();

        let report = StreamRelay::new(CancellationToken::new())
            .run(futures::stream::iter(items), &mut sink)
            .await;

        assert_eq!(report.fragments, 1);
        assert_eq!(sink.writes, vec!["Paris"]);
    }

    #[tokio::test]
    async fn test_upstream_error_logged_once() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut items = chunks(&["one"]);
        items.push(Err(Error::StreamInterrupted("connection reset".into())));
        items.push(Err(Error::StreamInterrupted("again".into())));
        let mut sink = RecordingSink::default();

        let report = StreamRelay::new(CancellationToken::new())
            .run(futures::stream::iter(items), &mut sink)
            .await;

        assert!(report.outcome.is_error());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_relays_interleave() {
        // Single-threaded runtime: the other relay only runs when one yields.
        let log = Arc::new(Mutex::new(Vec::new()));
        let relay = StreamRelay::new(CancellationToken::new());

        let spawn_relay = |parts: &'static [&'static str]| {
            let relay = relay.clone();
            let mut sink = SharedLogSink { log: log.clone() };
            tokio::spawn(async move {
                relay
                    .run(futures::stream::iter(chunks(parts)), &mut sink)
                    .await
            })
        };
        let a = spawn_relay(&["a1", "a2", "a3"]);
        let b = spawn_relay(&["b1", "b2", "b3"]);

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(ra.fragments, 3);
        assert_eq!(rb.fragments, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a1", "b1", "a2", "b2", "a3", "b3"]
        );
    }
}

//! Stream dispatcher: runs one chat turn and delivers it as events.
//!
//! A turn moves through cache check, then either cached replay or
//! generation, then delivery. The first event is always `Init`; the last is
//! exactly one of `Done` or `Error`. Each turn runs on its own task and
//! stops writing as soon as the consuming side of its stream is dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kai_core::config::ChatConfig;
use kai_core::types::{ChatRequest, Role, StreamEvent, STREAM_FAILED_MESSAGE};
use kai_storage::{IpLog, KvStore, ResponseCache, SessionMemory};

use crate::error::ChatError;
use crate::gateway::GenerationGateway;
use crate::prompt::{build_prompt, chunk_text};

/// Buffered events per turn before the producer waits on the consumer.
const EVENT_BUFFER: usize = 32;

/// Coordinates cache, memory, IP log, and gateway for each turn.
#[derive(Clone)]
pub struct StreamDispatcher {
    memory: SessionMemory,
    cache: ResponseCache,
    ip_log: IpLog,
    gateway: Arc<dyn GenerationGateway>,
    system_prompt: String,
    chunk_size: usize,
    chunk_interval: Duration,
}

impl StreamDispatcher {
    pub fn new(
        kv: Arc<dyn KvStore>,
        gateway: Arc<dyn GenerationGateway>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            memory: SessionMemory::new(Arc::clone(&kv), config.memory_limit),
            cache: ResponseCache::new(Arc::clone(&kv), Duration::from_secs(config.cache_ttl_secs)),
            ip_log: IpLog::new(kv),
            gateway,
            system_prompt: config.system_prompt.clone(),
            chunk_size: config.chunk_size,
            chunk_interval: Duration::from_millis(config.chunk_interval_ms),
        }
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn ip_log(&self) -> &IpLog {
        &self.ip_log
    }

    /// Validate a request and start its turn.
    ///
    /// Fails with `ChatError::EmptyMessage` before anything is spawned when
    /// the message is missing or empty. Otherwise resolves the session,
    /// records the caller's address, and returns the turn's event stream.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, request: ChatRequest, client_ip: &str) -> Result<TurnStream, ChatError> {
        let message = request
            .message
            .filter(|m| !m.is_empty())
            .ok_or(ChatError::EmptyMessage)?;
        let session_id = request
            .session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Err(e) = self.ip_log.record(client_ip, &session_id) {
            warn!(error = %e, session_id = %session_id, "Failed to record client address");
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let sink = EventSink {
            tx,
            cancel: cancel.clone(),
        };

        let turn = Turn {
            dispatcher: self.clone(),
            message,
            session_id: session_id.clone(),
            client_ip: client_ip.to_string(),
        };
        tokio::spawn(turn.run(sink));

        Ok(TurnStream {
            session_id,
            inner: ReceiverStream::new(rx),
            _guard: cancel.drop_guard(),
        })
    }
}

/// Event stream of one turn.
///
/// Dropping it cancels the turn: pending pacing waits end and no further
/// events are produced.
pub struct TurnStream {
    session_id: String,
    inner: ReceiverStream<StreamEvent>,
    _guard: DropGuard,
}

impl TurnStream {
    /// Session the turn was resolved to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Stream for TurnStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Producer half of a turn's stream, tied to its cancellation token.
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    async fn send(&self, event: StreamEvent) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::StreamClosed);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| ChatError::StreamClosed)
    }

    /// Wait for the next pacing tick, or fail once the stream is cancelled.
    async fn tick(&self, ticker: &mut Interval) -> Result<(), ChatError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ChatError::StreamClosed),
            _ = ticker.tick() => Ok(()),
        }
    }
}

struct Turn {
    dispatcher: StreamDispatcher,
    message: String,
    session_id: String,
    client_ip: String,
}

impl Turn {
    async fn run(self, sink: EventSink) {
        let init = StreamEvent::Init {
            ip: self.client_ip.clone(),
            session_id: self.session_id.clone(),
        };
        if sink.send(init).await.is_err() {
            debug!(session_id = %self.session_id, "Client left before init");
            return;
        }

        let outcome = match self.deliver(&sink).await {
            Ok(()) => sink.send(StreamEvent::Done).await,
            Err(ChatError::StreamClosed) => Err(ChatError::StreamClosed),
            Err(e) => {
                error!(error = %e, session_id = %self.session_id, "Streaming error");
                sink.send(StreamEvent::Error {
                    message: STREAM_FAILED_MESSAGE.to_string(),
                })
                .await
            }
        };

        if outcome.is_err() {
            debug!(session_id = %self.session_id, "Client disconnected mid-stream");
        }
    }

    async fn deliver(&self, sink: &EventSink) -> Result<(), ChatError> {
        let d = &self.dispatcher;

        // An empty cached reply counts as a miss.
        let cached = d.cache.lookup(&self.message)?.filter(|c| !c.is_empty());
        if let Some(cached) = cached {
            info!(session_id = %self.session_id, "Cache hit, replaying reply");
            for chunk in chunk_text(&cached, d.chunk_size) {
                sink.send(self.text_event(chunk)).await?;
            }
            return Ok(());
        }

        let history = d.memory.get_memory(&self.session_id)?;
        let prompt = build_prompt(&d.system_prompt, &history, &self.message);
        let reply = d.gateway.generate(&prompt).await?;
        info!(
            session_id = %self.session_id,
            history_len = history.len(),
            reply_len = reply.len(),
            "Reply generated"
        );

        d.cache.store(&self.message, &reply)?;
        d.memory
            .save_memory(&self.session_id, Role::User, &self.message)?;
        d.memory
            .save_memory(&self.session_id, Role::Assistant, &reply)?;

        let mut ticker = pacing_interval(d.chunk_interval);
        for chunk in chunk_text(&reply, d.chunk_size) {
            if let Some(ticker) = ticker.as_mut() {
                sink.tick(ticker).await?;
            }
            sink.send(self.text_event(chunk)).await?;
        }
        Ok(())
    }

    fn text_event(&self, chunk: String) -> StreamEvent {
        StreamEvent::Text {
            chunk,
            session_id: self.session_id.clone(),
        }
    }
}

/// Interval whose first tick fires one period from now. `None` disables
/// pacing.
fn pacing_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

//! Sensor server connection using tokio-tungstenite.
//!
//! One reader task decodes frames in arrival order and publishes them on the
//! [`EventBus`]; one writer task drains an mpsc channel into the socket.
//! Reconnection runs as an owned task that `connect()`/`disconnect()` abort.
//!
//! Every connect attempt and every `disconnect()` bumps a generation counter.
//! Tasks remember the generation they were started for and stand down once it
//! moves on, which is how a close caused by `disconnect()` is told apart from
//! an unexpected one.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use rehaflow_shared::{FrameError, InboundFrame};

use super::reconnect::ReconnectPolicy;
use crate::infrastructure::frame_translator;
use crate::infrastructure::messaging::{
    ClientEvent, ConnectionError, ConnectionState, ConnectionStatus, EventBus,
};

const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// `connect()` called by the owner; failures are not retried
    Explicit,
    /// Scheduled after an unexpected close; failures schedule the next attempt
    Automatic,
}

#[derive(Default)]
struct Tasks {
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    url: Url,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    events: EventBus,
    state: AtomicU8,
    attempts: AtomicU32,
    generation: AtomicU64,
    tx: Mutex<Option<mpsc::Sender<Message>>>,
    /// Serializes explicit `connect()` calls
    connect_lock: Mutex<()>,
    tasks: StdMutex<Tasks>,
}

/// Owns the WebSocket to the sensor server.
///
/// Cheap to clone; clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        url: Url,
        events: EventBus,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        if url.scheme() != "ws" {
            return Err(ConnectionError::InvalidUrl(format!(
                "expected a ws:// URL, got {url}"
            )));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                policy,
                connect_timeout,
                events,
                state: AtomicU8::new(ConnectionState::Disconnected.to_u8()),
                attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                tx: Mutex::new(None),
                connect_lock: Mutex::new(()),
                tasks: StdMutex::new(Tasks::default()),
            }),
        })
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state(),
            reconnect_attempts: self.inner.attempts.load(Ordering::SeqCst),
            max_reconnect_attempts: self.inner.policy.max_attempts,
        }
    }

    /// Open the connection.
    ///
    /// Resolves once the socket is open. A failure is published as an `error`
    /// event and returned; it is not retried. Cancels any scheduled
    /// reconnect and resets the attempt counter.
    ///
    /// Concurrent calls share one attempt: a second caller waits for the
    /// first and then sees the open connection.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            tracing::debug!(url = %self.inner.url, "Already connected");
            return Ok(());
        }

        self.inner.cancel_reconnect();
        self.inner.attempts.store(0, Ordering::SeqCst);
        Arc::clone(&self.inner).establish(Trigger::Explicit).await
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Idempotent. Does not publish `disconnected`.
    pub async fn disconnect(&self) {
        self.inner.cancel_reconnect();

        let tx = {
            let mut slot = self.inner.tx.lock().await;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            self.inner.set_state(ConnectionState::Disconnected);
            slot.take()
        };

        if let Some(tx) = tx {
            if tx.try_send(Message::Close(None)).is_err() {
                tracing::debug!("Close frame could not be queued");
            }
            tracing::info!(url = %self.inner.url, "Disconnected from sensor server");
        }

        if let Some(reader) = self.inner.lock_tasks().reader.take() {
            reader.abort();
        }
    }

    /// Stop the connection without waiting.
    ///
    /// Used when the owner goes away without calling `disconnect()`. The
    /// socket closes once the writer sees its channel close.
    pub fn shutdown(&self) {
        self.inner.cancel_reconnect();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Disconnected);
        if let Ok(mut slot) = self.inner.tx.try_lock() {
            slot.take();
        }
        if let Some(reader) = self.inner.lock_tasks().reader.take() {
            reader.abort();
        }
    }

    /// Queue a text frame for the writer task.
    pub async fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        // Clone the sender to avoid holding the lock across await
        let tx = {
            let slot = self.inner.tx.lock().await;
            slot.clone()
        };
        let Some(tx) = tx else {
            return Err(ConnectionError::NotConnected);
        };

        tx.send(Message::Text(text))
            .await
            .map_err(|_| ConnectionError::ChannelClosed)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.url.as_str())
            .field("status", &self.status())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old = ConnectionState::from_u8(self.state.swap(new_state.to_u8(), Ordering::SeqCst));
        if old != new_state {
            tracing::debug!(from = %old, to = %new_state, "Connection state changed");
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_reconnect(&self) {
        if let Some(handle) = self.lock_tasks().reconnect.take() {
            handle.abort();
        }
    }

    /// One connect attempt. Boxed because a failed automatic attempt
    /// schedules another one.
    fn establish(self: Arc<Self>, trigger: Trigger) -> BoxFuture<'static, Result<(), ConnectionError>> {
        async move {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_state(ConnectionState::Connecting);
            tracing::info!(url = %self.url, ?trigger, "Connecting to sensor server");

            let opened =
                tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await;
            let stream = match opened {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => {
                    return self.fail(generation, trigger, ConnectionError::Transport(e.to_string()))
                }
                Err(_) => {
                    let error = ConnectionError::ConnectTimeout(self.connect_timeout);
                    return self.fail(generation, trigger, error);
                }
            };

            let (mut write, mut read) = stream.split();
            let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

            {
                let mut slot = self.tx.lock().await;
                if self.current_generation() != generation {
                    tracing::debug!("Connection superseded before it was used");
                    return Err(ConnectionError::Cancelled);
                }
                *slot = Some(tx);
                self.attempts.store(0, Ordering::SeqCst);
                self.set_state(ConnectionState::Connected);
            }

            // Subscribers see `connected` before any frame from this socket,
            // so the reader is only started after the publish.
            tracing::info!(url = %self.url, "Connected to sensor server");
            self.events.publish(ClientEvent::Connected);
            if self.current_generation() != generation {
                tracing::debug!("Connection superseded while announcing it");
                return Err(ConnectionError::Cancelled);
            }

            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    let closing = matches!(message, Message::Close(_));
                    if let Err(e) = write.send(message).await {
                        tracing::warn!(error = %e, "Failed to write to sensor server");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                let _ = write.close().await;
            });

            let inner = Arc::clone(&self);
            let reader = tokio::spawn(async move {
                let mut reason = None;
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => inner.handle_text(generation, &text),
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                            Ok(text) => inner.handle_text(generation, &text),
                            Err(_) => tracing::warn!("Dropping binary frame that is not UTF-8"),
                        },
                        Ok(Message::Close(frame)) => {
                            tracing::info!(?frame, "Sensor server closed connection");
                            reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "WebSocket read error");
                            reason = Some(e.to_string());
                            break;
                        }
                    }
                }
                inner.handle_close(generation, reason).await;
            });

            if let Some(previous) = self.lock_tasks().reader.replace(reader) {
                previous.abort();
            }
            Ok(())
        }
        .boxed()
    }

    fn fail(
        self: &Arc<Self>,
        generation: u64,
        trigger: Trigger,
        error: ConnectionError,
    ) -> Result<(), ConnectionError> {
        if self.current_generation() != generation {
            return Err(ConnectionError::Cancelled);
        }

        tracing::warn!(url = %self.url, error = %error, "Failed to connect to sensor server");
        self.events.publish(ClientEvent::Error {
            message: error.to_string(),
        });

        match trigger {
            Trigger::Explicit => self.set_state(ConnectionState::Disconnected),
            Trigger::Automatic => self.schedule_reconnect(),
        }
        Err(error)
    }

    fn handle_text(&self, generation: u64, text: &str) {
        if self.current_generation() != generation {
            tracing::debug!("Dropping frame from a superseded connection");
            return;
        }
        match InboundFrame::parse(text) {
            Ok(frame) => {
                if let Some(event) = frame_translator::translate(frame) {
                    self.events.publish(event);
                }
            }
            Err(FrameError::MissingType) => {
                tracing::debug!("Ignoring frame without a type");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
            }
        }
    }

    async fn handle_close(self: &Arc<Self>, generation: u64, reason: Option<String>) {
        {
            let mut slot = self.tx.lock().await;
            if self.current_generation() != generation {
                // disconnect() or a newer connection owns the state now
                return;
            }
            slot.take();
        }

        tracing::warn!(url = %self.url, reason = ?reason, "Connection to sensor server lost");
        self.schedule_reconnect();
        self.events.publish(ClientEvent::Disconnected { reason });
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let attempts = self.attempts.load(Ordering::SeqCst);
        if !self.policy.allows(attempts) {
            tracing::error!(
                attempts,
                max_attempts = self.policy.max_attempts,
                "Max reconnection attempts reached, giving up"
            );
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.set_state(ConnectionState::Reconnecting);
        let generation = self.current_generation();
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.policy.interval).await;
            if inner.current_generation() != generation {
                tracing::debug!("Reconnection cancelled");
                return;
            }

            let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                attempt,
                max_attempts = inner.policy.max_attempts,
                "Reconnection attempt"
            );
            if let Err(e) = Arc::clone(&inner).establish(Trigger::Automatic).await {
                tracing::debug!(attempt, error = %e, "Reconnection attempt failed");
            }
        });

        self.lock_tasks().reconnect = Some(handle);
    }
}

//! Command Channel for request/response exchanges with the sensor server.
//!
//! Every outbound command carries a fresh `request_id`. A response that
//! echoes it settles exactly that command. Servers that do not echo the id
//! are still supported: such a response settles the oldest pending command
//! with the same name.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use rehaflow_shared::{CommandError, CommandName, CommandResponse, OutboundCommand};

use super::connection::ConnectionError;
use super::event_bus::{ClientEvent, EventKind, SubscriptionHandle};
use crate::infrastructure::websocket::ConnectionManager;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Entries requested by `weight_history` when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

type CommandResult = Result<CommandResponse, CommandError>;

// =============================================================================
// Pending Commands
// =============================================================================

struct PendingCommand {
    request_id: String,
    command: String,
    issued_at: DateTime<Utc>,
    seq: u64,
    tx: oneshot::Sender<CommandResult>,
}

/// Commands awaiting a response, oldest first.
#[derive(Default)]
pub struct PendingCommands {
    entries: VecDeque<PendingCommand>,
    next_seq: u64,
}

impl PendingCommands {
    /// Register a command; returns its sequence number.
    pub fn insert(
        &mut self,
        request_id: String,
        command: String,
        tx: oneshot::Sender<CommandResult>,
    ) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.entries.push_back(PendingCommand {
            request_id,
            command,
            issued_at: Utc::now(),
            seq,
            tx,
        });
        seq
    }

    /// Settle the command a response belongs to.
    ///
    /// Returns false if nothing matched (e.g., the command already timed out).
    pub fn settle(&mut self, response: CommandResponse) -> bool {
        let position = match response.request_id.as_deref() {
            Some(request_id) => self
                .entries
                .iter()
                .position(|entry| entry.request_id == request_id),
            None => self
                .entries
                .iter()
                .position(|entry| entry.command == response.command),
        };

        let Some(entry) = position.and_then(|index| self.entries.remove(index)) else {
            tracing::debug!(
                command = %response.command,
                request_id = ?response.request_id,
                "Response received for unknown command - it may have timed out"
            );
            return false;
        };

        let elapsed_ms = (Utc::now() - entry.issued_at).num_milliseconds();
        tracing::debug!(
            command = %entry.command,
            request_id = %entry.request_id,
            seq = entry.seq,
            elapsed_ms,
            status = %response.status,
            "Command settled"
        );

        let result = if response.is_success() {
            Ok(response)
        } else {
            Err(CommandError::rejected(
                entry.command.clone(),
                response.message.clone(),
            ))
        };
        let _ = entry.tx.send(result);
        true
    }

    pub fn remove(&mut self, request_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.request_id != request_id);
        self.entries.len() != before
    }

    /// Fail every pending command with [`CommandError::Cancelled`].
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            let _ = entry.tx.send(Err(CommandError::Cancelled));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lock(pending: &Mutex<PendingCommands>) -> MutexGuard<'_, PendingCommands> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry when the awaiting future finishes or is dropped.
struct PendingCleanup {
    pending: Arc<Mutex<PendingCommands>>,
    request_id: String,
}

impl Drop for PendingCleanup {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.request_id);
    }
}

// =============================================================================
// Command Channel
// =============================================================================

struct ChannelInner {
    connection: ConnectionManager,
    pending: Arc<Mutex<PendingCommands>>,
    timeout: Duration,
    subscriptions: Vec<SubscriptionHandle>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        for handle in &self.subscriptions {
            self.connection.events().unsubscribe(handle);
        }
    }
}

/// Sends commands over a [`ConnectionManager`] and awaits their responses.
///
/// Cheap to clone; the event subscriptions are released with the last clone.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<ChannelInner>,
}

impl CommandChannel {
    /// Create a channel.
    ///
    /// With `cancel_on_disconnect`, an unexpected close fails every in-flight
    /// command with `Cancelled`; otherwise they run into their timeout.
    pub fn new(connection: ConnectionManager, timeout: Duration, cancel_on_disconnect: bool) -> Self {
        let pending = Arc::new(Mutex::new(PendingCommands::default()));
        let events = connection.events().clone();

        let responses = Arc::clone(&pending);
        let mut subscriptions = vec![events.subscribe(EventKind::CommandResponse, move |event| {
            if let ClientEvent::CommandResponse(response) = event {
                lock(&responses).settle(response.clone());
            }
        })];

        if cancel_on_disconnect {
            let on_disconnect = Arc::clone(&pending);
            subscriptions.push(events.subscribe(EventKind::Disconnected, move |_| {
                let cancelled = lock(&on_disconnect).cancel_all();
                if cancelled > 0 {
                    tracing::debug!(cancelled, "Cancelled pending commands on disconnect");
                }
            }));
        }

        Self {
            inner: Arc::new(ChannelInner {
                connection,
                pending,
                timeout,
                subscriptions,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Fail all in-flight commands with [`CommandError::Cancelled`].
    pub fn cancel_all(&self) -> usize {
        let cancelled = lock(&self.inner.pending).cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending commands");
        }
        cancelled
    }

    /// Send a command and wait for its response.
    ///
    /// Fails immediately with `NotConnected` when the connection is not open;
    /// nothing is sent in that case.
    pub async fn send_command(
        &self,
        name: &str,
        extra: Map<String, Value>,
    ) -> Result<CommandResponse, CommandError> {
        if !self.inner.connection.is_connected() {
            return Err(CommandError::NotConnected);
        }

        let request_id = Uuid::new_v4().to_string();
        let frame = OutboundCommand::new(
            name,
            request_id.clone(),
            Utc::now().timestamp_millis(),
            extra,
        );
        let json = frame.to_json()?;

        // Register before sending so a fast response cannot be missed
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(request_id.clone(), frame.command.clone(), tx);
        let _cleanup = PendingCleanup {
            pending: Arc::clone(&self.inner.pending),
            request_id: request_id.clone(),
        };

        tracing::debug!(command = %name, request_id = %request_id, "Sending command");
        self.inner
            .connection
            .send_text(json)
            .await
            .map_err(|e| match e {
                ConnectionError::NotConnected => CommandError::NotConnected,
                other => CommandError::SendFailed(other.to_string()),
            })?;

        match tokio::time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CommandError::Cancelled),
            Err(_) => {
                tracing::warn!(
                    command = %name,
                    request_id = %request_id,
                    timeout_ms = self.inner.timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(CommandError::Timeout {
                    command: name.to_string(),
                    after: self.inner.timeout,
                })
            }
        }
    }

    pub async fn send(
        &self,
        name: CommandName,
        extra: Map<String, Value>,
    ) -> Result<CommandResponse, CommandError> {
        self.send_command(name.as_str(), extra).await
    }

    pub async fn start_measuring(&self) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::StartMeasuring, Map::new()).await
    }

    pub async fn stop_measuring(&self) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::StopMeasuring, Map::new()).await
    }

    pub async fn tare_scale(&self) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::TareScale, Map::new()).await
    }

    /// Initialize the scale with a known reference weight.
    pub async fn init_scale(&self, known_weight: f64) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::Init, fields([("known_weight", known_weight.into())]))
            .await
    }

    pub async fn calibrate_scale(
        &self,
        known_weight: f64,
    ) -> Result<CommandResponse, CommandError> {
        self.send(
            CommandName::CalibrateScale,
            fields([("known_weight", known_weight.into())]),
        )
        .await
    }

    /// Measure the zero reference (`start_zero_measurement`).
    pub async fn trigger_zero(&self) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::StartZeroMeasurement, Map::new())
            .await
    }

    pub async fn get_current_weight(&self) -> Result<CommandResponse, CommandError> {
        self.send(CommandName::GetCurrentWeight, Map::new()).await
    }

    /// Recent readings kept by the server.
    pub async fn weight_history(
        &self,
        limit: Option<u32>,
    ) -> Result<CommandResponse, CommandError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        self.send(CommandName::GetHistory, fields([("limit", limit.into())]))
            .await
    }
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("timeout", &self.inner.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

//! Sensor client facade.

use rehaflow_domain::{ExerciseSession, SensorClassifier};
use rehaflow_shared::CommandError;

use crate::application::{ExerciseRun, ExerciseRunner, FeedbackPresenter};
use crate::config::{ClientConfig, ConfigError};
use crate::infrastructure::messaging::{CommandChannel, ConnectionError, EventBus};
use crate::infrastructure::websocket::ConnectionManager;

/// One connection to one sensor server, with its event bus and command channel.
///
/// Nothing is shared between instances, so tests can run several side by side.
/// Dropping the client stops its connection, including a pending reconnect.
#[derive(Debug)]
pub struct SensorClient {
    config: ClientConfig,
    events: EventBus,
    connection: ConnectionManager,
    commands: CommandChannel,
    classifier: SensorClassifier,
}

impl SensorClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.classifier.validate()?;
        let url = config.server_url()?;

        let events = EventBus::new();
        let connection = ConnectionManager::new(
            url,
            events.clone(),
            config.reconnect,
            config.connect_timeout,
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "REHAFLOW_SENSOR_HOST".to_string(),
            value: e.to_string(),
        })?;
        let commands = CommandChannel::new(
            connection.clone(),
            config.command_timeout,
            config.cancel_pending_on_disconnect,
        );

        Ok(Self {
            classifier: SensorClassifier::new(config.classifier),
            config,
            events,
            connection,
            commands,
        })
    }

    /// Connect to the server.
    pub async fn open(&self) -> Result<(), ConnectionError> {
        self.connection.connect().await
    }

    /// Disconnect and stop reconnecting.
    ///
    /// In-flight commands are cancelled only when
    /// `cancel_pending_on_disconnect` is set; otherwise they time out.
    pub async fn close(&self) {
        self.connection.disconnect().await;
        if self.config.cancel_pending_on_disconnect {
            self.commands.cancel_all();
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn classifier(&self) -> &SensorClassifier {
        &self.classifier
    }

    /// An exercise runner using this client's classifier settings.
    pub fn exercise_runner(&self, presenter: FeedbackPresenter) -> ExerciseRunner {
        ExerciseRunner::new(self.classifier, presenter)
    }

    /// Initialize the scale with `known_weight`, start measuring, and run an
    /// exercise judged against that same weight.
    pub async fn start_exercise(
        &self,
        presenter: FeedbackPresenter,
        known_weight: f64,
    ) -> Result<ExerciseRun, CommandError> {
        self.commands.init_scale(known_weight).await?;
        self.commands.start_measuring().await?;
        Ok(self
            .exercise_runner(presenter)
            .start(&self.events, Some(known_weight)))
    }

    /// Stop the exercise loop, then stop measuring.
    pub async fn stop_exercise(
        &self,
        run: ExerciseRun,
    ) -> Result<Option<ExerciseSession>, CommandError> {
        let session = run.stop().await;
        self.commands.stop_measuring().await?;
        Ok(session)
    }
}

impl Drop for SensorClient {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

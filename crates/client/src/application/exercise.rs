//! Live exercise loop.
//!
//! Readings arrive on the event bus and are forwarded through a `watch`
//! channel, so a slow loop only ever sees the newest one. A one-second tick
//! advances the session clock and emits feedback when it is due.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use rehaflow_domain::{ExerciseSession, PressureLevel, SensorClassifier, SensorReading};

use super::feedback::{Feedback, FeedbackPresenter};
use crate::infrastructure::messaging::{ClientEvent, EventBus, EventKind, SubscriptionHandle};

const FEEDBACK_BUFFER: usize = 16;

/// Drives an [`ExerciseSession`] from live readings.
#[derive(Debug)]
pub struct ExerciseRunner {
    classifier: SensorClassifier,
    presenter: FeedbackPresenter,
    session: ExerciseSession,
    tick: Duration,
}

impl ExerciseRunner {
    pub fn new(classifier: SensorClassifier, presenter: FeedbackPresenter) -> Self {
        Self {
            classifier,
            presenter,
            session: ExerciseSession::default(),
            tick: Duration::from_secs(1),
        }
    }

    pub fn with_session(mut self, session: ExerciseSession) -> Self {
        self.session = session;
        self
    }

    /// Length of one session second.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Subscribe to readings and start the session loop.
    pub fn start(self, events: &EventBus, reference_weight: Option<f64>) -> ExerciseRun {
        let (reading_tx, mut reading_rx) = watch::channel::<Option<SensorReading>>(None);
        let subscription = events.subscribe(EventKind::WeightData, move |event| {
            if let ClientEvent::WeightData(reading) = event {
                reading_tx.send_replace(Some(*reading));
            }
        });

        let (feedback_tx, feedback_rx) = mpsc::channel(FEEDBACK_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let Self {
            classifier,
            presenter,
            mut session,
            tick,
        } = self;

        let task = tokio::spawn(async move {
            session.start(reference_weight);
            tracing::info!(reference_weight = ?reference_weight, "Exercise started");

            let mut ticker = tokio::time::interval(tick);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    changed = reading_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let latest = *reading_rx.borrow_and_update();
                        if let Some(reading) = latest {
                            session.record(reading);
                        }
                    }
                    _ = ticker.tick() => {
                        if !session.tick() {
                            continue;
                        }
                        let Some(result) = session.classify(&classifier) else {
                            continue;
                        };
                        let feedback = Feedback {
                            category: result.category,
                            message: presenter.render(&result),
                            seconds_remaining: result.seconds_remaining,
                            elapsed_secs: session.elapsed_secs(),
                            status: session
                                .latest()
                                .map(|reading| classifier.overall_status(reading))
                                .unwrap_or(PressureLevel::Low),
                        };
                        tracing::debug!(
                            category = %feedback.category,
                            elapsed_secs = feedback.elapsed_secs,
                            "Feedback due"
                        );
                        if feedback_tx.send(feedback).await.is_err() {
                            break;
                        }
                    }
                }
            }

            session.stop();
            tracing::info!(
                elapsed_secs = session.elapsed_secs(),
                readings = session.history_len(),
                "Exercise stopped"
            );
            session
        });

        ExerciseRun {
            feedback: feedback_rx,
            stop: Some(stop_tx),
            task: Some(task),
            events: events.clone(),
            subscription,
        }
    }
}

/// A running exercise. Dropping it stops the loop.
#[derive(Debug)]
pub struct ExerciseRun {
    feedback: mpsc::Receiver<Feedback>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ExerciseSession>>,
    events: EventBus,
    subscription: SubscriptionHandle,
}

impl ExerciseRun {
    /// Next feedback update; `None` once the loop has ended.
    pub async fn next_feedback(&mut self) -> Option<Feedback> {
        self.feedback.recv().await
    }

    /// Stop the loop and return the final session state.
    pub async fn stop(mut self) -> Option<ExerciseSession> {
        self.events.unsubscribe(&self.subscription);
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for ExerciseRun {
    fn drop(&mut self) {
        self.events.unsubscribe(&self.subscription);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

//! Single-owner engine task and the foreground poller.
//!
//! The [`SessionMachine`] lives inside one tokio task. Everything else talks
//! to it through an [`EngineHandle`], which queues [`Command`]s; queries get
//! their answer back over a oneshot channel. Commands are applied strictly in
//! arrival order, so an observation queued before a status query is always
//! reflected in the answer.
//!
//! ```text
//! poller ──Observe──┐
//! control ──Start/Stop/Status/Stats/Shutdown──► Engine::run ──► SessionMachine
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{FocusError, Result};
use crate::session::{SessionMachine, SessionStatus, StatsSnapshot};
use crate::source::ObservationSource;
use crate::summary::SessionSummary;
use crate::types::{TimedObservation, WindowObservation};

/// Capacity of the command queue.
const COMMAND_BUFFER: usize = 64;

/// A request for the engine task.
#[derive(Debug)]
pub enum Command {
    Start {
        goal: String,
        description: String,
        reply: oneshot::Sender<Uuid>,
    },
    Stop {
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
    Observe(Option<WindowObservation>),
    Status {
        reply: oneshot::Sender<Option<SessionStatus>>,
    },
    Stats {
        reply: oneshot::Sender<Option<StatsSnapshot>>,
    },
    /// End any active session and stop the task.
    Shutdown {
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
}

/// The task owning the session machine.
pub struct Engine {
    machine: SessionMachine,
    commands: mpsc::Receiver<Command>,
}

impl Engine {
    /// Spawns the engine task on the current runtime.
    pub fn spawn(machine: SessionMachine) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let engine = Self {
            machine,
            commands: rx,
        };
        let task = tokio::spawn(engine.run());
        (EngineHandle { commands: tx }, task)
    }

    /// Applies commands until shutdown or until every handle is dropped.
    ///
    /// Either way an active session is ended, so the open activity is
    /// finalized and persisted.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Start {
                    goal,
                    description,
                    reply,
                } => {
                    let session_id = self.machine.start_session(&goal, &description);
                    let _ = reply.send(session_id);
                }
                Command::Stop { reply } => {
                    let _ = reply.send(self.machine.end_session());
                }
                Command::Observe(observation) => {
                    self.machine.process_observation(observation).await;
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.machine.status());
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.machine.stats());
                }
                Command::Shutdown { reply } => {
                    let summary = self.machine.end_session();
                    let _ = reply.send(summary);
                    info!("Engine shut down");
                    return;
                }
            }
        }

        if self.machine.end_session().is_some() {
            info!("All engine handles dropped, active session ended");
        }
    }
}

/// Cloneable handle for queuing commands to the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Starts a session, ending any active one first.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is gone.
    pub async fn start(&self, goal: &str, description: &str) -> Result<Uuid> {
        self.request(|reply| Command::Start {
            goal: goal.to_string(),
            description: description.to_string(),
            reply,
        })
        .await
    }

    /// Ends the active session. `Ok(None)` means there was nothing to end.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is gone.
    pub async fn stop(&self) -> Result<Option<SessionSummary>> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Queues an observation without waiting for it to be processed.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is gone.
    pub async fn observe(&self, observation: Option<WindowObservation>) -> Result<()> {
        self.commands
            .send(Command::Observe(observation))
            .await
            .map_err(|_| FocusError::EngineStopped)
    }

    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is gone.
    pub async fn status(&self) -> Result<Option<SessionStatus>> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is gone.
    pub async fn stats(&self) -> Result<Option<StatsSnapshot>> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Ends any active session and stops the engine task.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::EngineStopped` if the engine task is already gone.
    pub async fn shutdown(&self) -> Result<Option<SessionSummary>> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| FocusError::EngineStopped)?;
        rx.await.map_err(|_| FocusError::EngineStopped)
    }
}

/// Polls `source` every `interval` and forwards what it sees to the engine.
///
/// Empty polls and acquisition failures are skipped. Returns when `shutdown`
/// flips to `true` or its sender is dropped, or when the engine is gone.
pub async fn run_poller<S>(
    mut source: S,
    engine: EngineHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: ObservationSource,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Poller received shutdown");
                    return;
                }
            }
            _ = ticker.tick() => {
                match source.observe().await {
                    Ok(Some(observation)) => {
                        if engine.observe(Some(observation)).await.is_err() {
                            debug!("Engine gone, stopping poller");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Foreground observation failed, skipping"),
                }
            }
        }
    }
}

/// Runs a whole session from recorded polls, using their timestamps.
///
/// The session starts at the first poll and ends at the last one; a poll
/// without a window is an empty poll. Returns `None` for an empty recording.
pub async fn replay(
    machine: &mut SessionMachine,
    goal: &str,
    description: &str,
    polls: &[TimedObservation],
) -> Option<SessionSummary> {
    let (first, last) = (polls.first()?, polls.last()?);

    machine.start_session_at(goal, description, first.at);
    for poll in polls {
        machine.process_observation_at(poll.observation(), poll.at).await;
    }
    machine.end_session_at(last.at)
}

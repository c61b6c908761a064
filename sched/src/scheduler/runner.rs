//! SchedulerRunner - actor that drives the scheduler loop on a timer
//!
//! The runner task exclusively owns the `SchedulerLoop`. It waits on either
//! a control command or the next tick deadline. A tick runs to completion
//! inside its select arm, so commands are only handled between ticks and
//! only one tick chain ever exists.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::core::{LoopState, SchedulerError, SchedulerLoop, SchedulerSnapshot, StartOutcome, TickOutcome};

/// Commands sent to the runner
#[derive(Debug)]
pub enum SchedulerCommand {
    Start {
        reply: oneshot::Sender<Result<StartOutcome, SchedulerError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    /// Start when stopped, stop when running
    Toggle {
        reply: oneshot::Sender<Result<LoopState, SchedulerError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot>,
    },
    /// Stop, then exit once no jobs remain
    Shutdown,
}

/// Handle to control a spawned scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    status: watch::Receiver<SchedulerSnapshot>,
}

impl SchedulerHandle {
    pub async fn start(&self) -> Result<StartOutcome, SchedulerError> {
        debug!("SchedulerHandle::start: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Start { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SchedulerError::ChannelClosed)?
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        debug!("SchedulerHandle::stop: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Stop { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }

    pub async fn toggle(&self) -> Result<LoopState, SchedulerError> {
        debug!("SchedulerHandle::toggle: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Toggle { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SchedulerError::ChannelClosed)?
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Snapshot { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }

    /// Request a drain-then-exit; await the runner's `JoinHandle` to wait for it
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        debug!("SchedulerHandle::shutdown: called");
        self.send(SchedulerCommand::Shutdown).await
    }

    /// Latest published snapshot without a round trip to the runner
    pub fn current(&self) -> SchedulerSnapshot {
        self.status.borrow().clone()
    }

    /// Subscribe to snapshot updates (published after every tick and command)
    pub fn subscribe(&self) -> watch::Receiver<SchedulerSnapshot> {
        self.status.clone()
    }

    async fn send(&self, command: SchedulerCommand) -> Result<(), SchedulerError> {
        self.tx.send(command).await.map_err(|_| SchedulerError::ChannelClosed)
    }
}

/// Owns the scheduler loop and its timer
pub struct SchedulerRunner {
    scheduler: SchedulerLoop,
    rx: mpsc::Receiver<SchedulerCommand>,
    status_tx: watch::Sender<SchedulerSnapshot>,
    next_tick: Option<Instant>,
    shutting_down: bool,
    handles_dropped: bool,
}

impl SchedulerRunner {
    /// Spawn the runner task
    ///
    /// The task hands the loop back when it exits, after a shutdown request
    /// (or once every handle is dropped) and the last job has finished.
    pub fn spawn(scheduler: SchedulerLoop) -> (SchedulerHandle, JoinHandle<SchedulerLoop>) {
        debug!("SchedulerRunner::spawn: called");
        let (tx, rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(scheduler.snapshot());

        let runner = Self {
            scheduler,
            rx,
            status_tx,
            next_tick: None,
            shutting_down: false,
            handles_dropped: false,
        };
        let join = tokio::spawn(runner.run());

        (SchedulerHandle { tx, status: status_rx }, join)
    }

    async fn run(mut self) -> SchedulerLoop {
        info!("Scheduler runner started");

        loop {
            let deadline = self.next_tick;
            tokio::select! {
                command = self.rx.recv(), if !self.handles_dropped => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("SchedulerRunner::run: all handles dropped");
                            self.handles_dropped = true;
                            self.begin_shutdown();
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.next_tick = match self.scheduler.tick().await {
                        TickOutcome::Reschedule(delay) => Some(Instant::now() + delay),
                        TickOutcome::Idle => None,
                    };
                    self.publish();
                }
            }

            if self.shutting_down && self.next_tick.is_none() {
                break;
            }
            if self.handles_dropped && self.next_tick.is_none() {
                break;
            }
        }

        info!("Scheduler runner exiting");
        self.scheduler
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        debug!(?command, "SchedulerRunner::handle_command: called");
        match command {
            SchedulerCommand::Start { reply } => {
                let _ = reply.send(self.start());
            }
            SchedulerCommand::Stop { reply } => {
                self.scheduler.stop();
                let _ = reply.send(());
            }
            SchedulerCommand::Toggle { reply } => {
                let result = match self.scheduler.state() {
                    LoopState::Running => {
                        self.scheduler.stop();
                        Ok(LoopState::Stopped)
                    }
                    LoopState::Stopped => self.start().map(|_| LoopState::Running),
                };
                let _ = reply.send(result);
            }
            SchedulerCommand::Snapshot { reply } => {
                let _ = reply.send(self.scheduler.snapshot());
            }
            SchedulerCommand::Shutdown => self.begin_shutdown(),
        }
        self.publish();
    }

    fn start(&mut self) -> Result<StartOutcome, SchedulerError> {
        if self.shutting_down {
            return Err(SchedulerError::ShuttingDown);
        }
        let outcome = self.scheduler.start()?;
        if outcome == StartOutcome::Started {
            // Replaces any pending deadline so there is still one tick chain
            self.next_tick = Some(Instant::now());
        }
        Ok(outcome)
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!(running_jobs = self.scheduler.jobs().len(), "Scheduler shutdown requested");
        self.shutting_down = true;
        self.scheduler.stop();

        // With nothing to drain, run one last tick right away for cleanup
        if self.scheduler.jobs().is_empty() && self.next_tick.is_some() {
            self.next_tick = Some(Instant::now());
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.scheduler.snapshot());
    }
}

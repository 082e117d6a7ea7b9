//! The polling loop and the single command consumer.
//!
//! A background task samples the feed on a fixed interval and queues new
//! commands; the consumer runs them one at a time against the one `Session`.
//! Commands that arrive while the queue is full are dropped with a warning.

use crate::command::Command;
use crate::machine::{Flow, SessionMachine};
use crate::poller::CommandPoller;
use crate::session::Session;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct AgentRuntime {
    poller: CommandPoller,
    machine: SessionMachine,
    interval: Duration,
    queue_capacity: usize,
}

impl AgentRuntime {
    pub fn new(poller: CommandPoller, machine: SessionMachine) -> Self {
        Self {
            poller,
            machine,
            interval: Duration::from_secs(2),
            queue_capacity: 16,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Capture the feed baseline, then execute commands until `shutdown` fires
    /// or a command ends the browser session. Returns the final session.
    pub async fn run_loop(self, mut shutdown: broadcast::Receiver<()>) -> Session {
        let AgentRuntime {
            mut poller,
            machine,
            interval,
            queue_capacity,
        } = self;

        poller.capture_baseline().await;

        let (tx, mut rx) = mpsc::channel(queue_capacity);
        let poll_task = tokio::spawn(poll_loop(poller, interval, tx));

        info!(
            interval_ms = interval.as_millis() as u64,
            queue_capacity, "Watching chat for commands"
        );

        let mut session = Session::new();
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(command) => {
                        info!(command = command.name(), "Executing command");
                        if machine.apply(&mut session, command).await == Flow::Shutdown {
                            info!("Browser session ended by command");
                            break;
                        }
                    }
                    None => {
                        warn!("Command poller stopped");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Runtime shutting down");
                    break;
                }
            }
        }

        poll_task.abort();
        session
    }
}

async fn poll_loop(mut poller: CommandPoller, period: Duration, tx: mpsc::Sender<Command>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(command) = poller.poll().await else {
            continue;
        };
        match tx.try_send(command) {
            Ok(()) => debug!("Command queued"),
            Err(TrySendError::Full(command)) => {
                warn!(command = command.name(), "Busy with earlier commands, dropping this one");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
}

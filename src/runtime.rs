//! Event loop hosting an [`Engine`].
//!
//! Host signals, commands and debounced rescans are all serialized through
//! one `select!` loop, so engine state is never touched concurrently. The
//! content tree is shared with the host behind an async mutex.

use std::future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::commands::{Command, CommandResponse, dispatch};
use crate::discovery::{HostSignal, RescanScheduler};
use crate::download::NoopObserver;
use crate::engine::Engine;
use crate::tree::ContentTree;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("engine runtime has stopped")]
    Stopped,
}

type CommandEnvelope = (Command, oneshot::Sender<CommandResponse>);

/// Cloneable handle used by the host and the controlling UI.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    signals: mpsc::Sender<HostSignal>,
    commands: mpsc::Sender<CommandEnvelope>,
}

impl RuntimeHandle {
    /// Delivers a host signal.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] once the loop has exited.
    pub async fn signal(&self, signal: HostSignal) -> Result<(), RuntimeError> {
        self.signals
            .send(signal)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Runs a command and waits for its response. A stopped runtime yields a
    /// failure response.
    pub async fn execute(&self, command: Command) -> CommandResponse {
        let (reply, response) = oneshot::channel();
        if self.commands.send((command, reply)).await.is_err() {
            return CommandResponse::failure(RuntimeError::Stopped.to_string());
        }
        response
            .await
            .unwrap_or_else(|_| CommandResponse::failure(RuntimeError::Stopped.to_string()))
    }
}

/// Owns the engine and drives it from host signals and commands.
pub struct EngineRuntime {
    engine: Engine,
    tree: Arc<Mutex<ContentTree>>,
    scheduler: RescanScheduler,
    signals: mpsc::Receiver<HostSignal>,
    commands: mpsc::Receiver<CommandEnvelope>,
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl EngineRuntime {
    /// Builds a runtime and its handle. `engine` should already be
    /// initialized.
    #[must_use]
    pub fn new(engine: Engine, tree: Arc<Mutex<ContentTree>>) -> (Self, RuntimeHandle) {
        let (signal_tx, signals) = mpsc::channel(CHANNEL_CAPACITY);
        let (command_tx, commands) = mpsc::channel(CHANNEL_CAPACITY);
        let scheduler = RescanScheduler::new(engine.config().debounce);
        let runtime = Self {
            engine,
            tree,
            scheduler,
            signals,
            commands,
        };
        let handle = RuntimeHandle {
            signals: signal_tx,
            commands: command_tx,
        };
        (runtime, handle)
    }

    /// Runs until every handle is dropped, then disposes the engine and
    /// hands it back.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> Engine {
        let mut signals_open = true;
        loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                signal = self.signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        debug!(?signal, "host signal");
                        self.scheduler.notify(&signal, Instant::now());
                    }
                    None => signals_open = false,
                },
                command = self.commands.recv() => match command {
                    Some((command, reply)) => {
                        let response = dispatch(&mut self.engine, &self.tree, command).await;
                        if reply.send(response).is_err() {
                            debug!("command caller went away");
                        }
                    }
                    None => break,
                },
                () = wait_until(deadline) => {
                    if self.scheduler.poll_due(Instant::now()) {
                        self.rescan().await;
                    }
                }
            }
        }
        self.engine.dispose();
        info!("engine runtime stopped");
        self.engine
    }

    async fn rescan(&mut self) {
        let rendered = {
            let mut tree = self.tree.lock().await;
            match self.engine.discover_and_render(&mut tree) {
                Ok(report) => report.rendered,
                Err(error) => {
                    warn!(%error, "rescan failed");
                    return;
                }
            }
        };
        if rendered.is_empty() || !self.engine.preferences().auto_download {
            return;
        }
        let jobs = {
            let tree = self.tree.lock().await;
            self.engine.plan_downloads_for(&tree, &rendered)
        };
        match jobs {
            Ok(jobs) => {
                if let Ok(report) = self.engine.execute_downloads(jobs, &mut NoopObserver).await {
                    info!(summary = %report.summary(), "auto download finished");
                }
            }
            Err(error) => warn!(%error, "auto download skipped"),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

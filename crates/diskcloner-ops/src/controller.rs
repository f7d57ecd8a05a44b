//! The operation controller.
//!
//! Accepts at most one clone request at a time, runs it on a blocking worker
//! and exposes its state, log and events to the caller.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use diskcloner_core::{
    CloneConfig, ControllerError, LogEntry, LogSink, OperationOutcome, OperationRequest, OperationState,
    Phase,
};

use crate::engine::TransferEngine;
use crate::event::OperationEvent;
use crate::shared::ControllerShared;
use crate::worker::{self, Worker};

/// Handle to the controller. Clones share the same state.
#[derive(Clone)]
pub struct OperationController {
    shared: Arc<ControllerShared>,
}

impl std::fmt::Debug for OperationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationController")
            .field("engine", &self.shared.engine.name())
            .field("state", &self.current_state())
            .finish()
    }
}

impl OperationController {
    /// Create a controller driving `engine`.
    pub fn new(engine: Arc<dyn TransferEngine>, config: CloneConfig) -> Self {
        Self {
            shared: Arc::new(ControllerShared::new(engine, config)),
        }
    }

    /// Create a controller with the default configuration.
    pub fn with_engine(engine: impl TransferEngine + 'static) -> Self {
        Self::new(Arc::new(engine), CloneConfig::default())
    }

    /// Also hand every log entry to `sink`, e.g. an [`ApplicationLog`].
    ///
    /// [`ApplicationLog`]: diskcloner_core::ApplicationLog
    pub fn with_log_sink(self, sink: Arc<dyn LogSink>) -> Self {
        self.shared.lock().shared_mut().sink = Some(sink);
        self
    }

    pub fn config(&self) -> &CloneConfig {
        &self.shared.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.shared.engine.name()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.shared.subscribe()
    }

    /// Start `request` on a blocking worker.
    ///
    /// Must be called from within a Tokio runtime. Rejected requests leave
    /// the state untouched. While an operation is in progress every request
    /// is refused with `AlreadyRunning`, valid or not.
    pub fn submit(&self, request: OperationRequest) -> Result<Accepted, ControllerError> {
        let mut guard = self.shared.lock();
        let phase = guard.state().phase;
        if phase != Phase::Idle {
            return Err(ControllerError::AlreadyRunning { phase });
        }

        if let Err(err) = request.validate() {
            tracing::warn!(%request, error = %err, "rejected clone request");
            return Err(err);
        }
        let handle = Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let shared = guard.shared_mut();
        let operation_id = shared.next_id;
        shared.next_id += 1;
        shared.cancel = Some(cancel.clone());
        shared.state = OperationState {
            operation_id: Some(operation_id),
            request: Some(request.clone()),
            ..OperationState::idle()
        };

        guard.log(LogEntry::info(format!("Starting clone operation: {request}")));
        guard.set_phase(Phase::Running);

        let worker = Worker::new(Arc::clone(&self.shared), operation_id, request, cancel);
        let task = handle.spawn_blocking(move || worker.run());
        drop(guard);

        tracing::debug!(operation_id, engine = self.engine_name(), "clone worker started");

        Ok(Accepted {
            operation_id,
            task,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Ask the running operation to stop at the next chunk boundary.
    ///
    /// Returns `true` when this call moved the operation to `Cancelling`.
    /// Repeated calls and calls outside `Running`/`Verifying` do nothing.
    pub fn request_cancel(&self) -> bool {
        let mut guard = self.shared.lock();
        if !matches!(guard.state().phase, Phase::Running | Phase::Verifying) {
            return false;
        }

        guard.state_mut().cancel_requested = true;
        if let Some(token) = &guard.shared_mut().cancel {
            token.cancel();
        }
        guard.log(LogEntry::warning("Stop requested by user"));
        guard.set_phase(Phase::Cancelling);
        true
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> OperationState {
        self.shared.lock().state().clone()
    }

    /// Acknowledge a finished operation and return to `Idle`.
    pub fn reset(&self) -> Result<(), ControllerError> {
        let mut guard = self.shared.lock();
        let phase = guard.state().phase;
        if phase == Phase::Idle {
            return Ok(());
        }
        if phase.is_active() {
            return Err(ControllerError::StillRunning { phase });
        }

        let shared = guard.shared_mut();
        shared.state = OperationState::idle();
        shared.cancel = None;
        guard.log(LogEntry::info("Ready for a new operation"));
        guard.set_phase(Phase::Idle);
        Ok(())
    }

    /// The session log so far. It is kept across `reset`.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.shared.lock().entries().to_vec()
    }

    /// Add a caller-side entry to the session log.
    pub fn append_log(&self, entry: LogEntry) {
        self.shared.lock().log(entry);
    }
}

/// An accepted operation.
#[derive(Debug)]
pub struct Accepted {
    operation_id: u64,
    task: JoinHandle<OperationOutcome>,
    shared: Arc<ControllerShared>,
}

impl Accepted {
    pub fn operation_id(&self) -> u64 {
        self.operation_id
    }

    /// Whether the worker has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker and return how the operation ended.
    pub async fn wait(self) -> OperationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(operation_id = self.operation_id, error = %err, "clone worker did not finish");
                worker::abandon(&self.shared, self.operation_id, format!("worker task ended: {err}"))
            }
        }
    }
}

//! State shared between the caller and the worker.
//!
//! Everything the two sides exchange lives behind a single mutex. Events are
//! published while the lock is held; a broadcast send never blocks, so the
//! order subscribers see is the order state changes were applied.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use diskcloner_core::{CloneConfig, LogEntry, LogSink, OperationState, Phase};

use crate::engine::TransferEngine;
use crate::event::OperationEvent;

/// Mutable data guarded by the controller lock.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub state: OperationState,
    pub log: Vec<LogEntry>,
    pub cancel: Option<CancellationToken>,
    pub next_id: u64,
    /// Durable copy of every log entry.
    pub sink: Option<Arc<dyn LogSink>>,
}

/// Everything a controller and its worker hold in common.
pub(crate) struct ControllerShared {
    pub engine: Arc<dyn TransferEngine>,
    pub config: CloneConfig,
    shared: Mutex<Shared>,
    events: broadcast::Sender<OperationEvent>,
}

impl ControllerShared {
    pub fn new(engine: Arc<dyn TransferEngine>, config: CloneConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            engine,
            config,
            shared: Mutex::new(Shared {
                next_id: 1,
                ..Default::default()
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }

    /// Take the lock. A panicked holder leaves the data usable.
    pub fn lock(&self) -> StateGuard<'_> {
        StateGuard {
            shared: self.shared.lock().unwrap_or_else(|e| e.into_inner()),
            events: &self.events,
        }
    }
}

impl std::fmt::Debug for ControllerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerShared")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the shared state plus the event sender.
pub(crate) struct StateGuard<'a> {
    shared: MutexGuard<'a, Shared>,
    events: &'a broadcast::Sender<OperationEvent>,
}

impl StateGuard<'_> {
    pub fn state(&self) -> &OperationState {
        &self.shared.state
    }

    pub fn state_mut(&mut self) -> &mut OperationState {
        &mut self.shared.state
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.shared.log
    }

    pub fn shared_mut(&mut self) -> &mut Shared {
        &mut self.shared
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: OperationEvent) {
        let _ = self.events.send(event);
    }

    /// Append to the session log, mirror to tracing and the sink, and publish.
    ///
    /// A failing sink never affects the operation.
    pub fn log(&mut self, entry: LogEntry) {
        entry.trace();
        if let Some(sink) = &self.shared.sink {
            if let Err(err) = sink.record(&entry) {
                tracing::warn!(error = %err, "failed to record log entry");
            }
        }
        self.shared.log.push(entry.clone());
        self.emit(OperationEvent::Log(entry));
    }

    /// Move to `phase` and publish the change.
    pub fn set_phase(&mut self, phase: Phase) {
        self.shared.state.phase = phase;
        let operation_id = self.shared.state.operation_id;
        self.emit(OperationEvent::PhaseChanged {
            operation_id,
            phase,
        });
    }
}

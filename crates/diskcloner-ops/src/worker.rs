//! The blocking worker that executes one accepted operation.
//!
//! The worker owns the transfer session and drives the copy pass, then the
//! optional verify pass. It takes the controller lock only to publish
//! progress, log entries and phase changes, never across engine calls.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use diskcloner_core::{
    ContentHash, DeviceError, DeviceErrorKind, LogEntry, OperationError, OperationOutcome,
    OperationRequest, Phase,
};

use crate::engine::{Endpoint, TransferSession};
use crate::event::OperationEvent;
use crate::progress::{PassProgress, ProgressStep};
use crate::shared::{ControllerShared, StateGuard};

/// How a pass ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Done,
    Cancelled,
}

pub(crate) struct Worker {
    shared: Arc<ControllerShared>,
    operation_id: u64,
    request: OperationRequest,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        shared: Arc<ControllerShared>,
        operation_id: u64,
        request: OperationRequest,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            operation_id,
            request,
            cancel,
        }
    }

    /// Run to completion. A panic inside the engine ends the operation as
    /// `Failed` instead of leaving the controller stuck in an active phase.
    ///
    /// This needs `panic = "unwind"`, which every profile of the workspace
    /// keeps. Under `abort` a panicking engine ends the process.
    pub fn run(self) -> OperationOutcome {
        let span = tracing::debug_span!("clone", id = self.operation_id);
        let _enter = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(%message, "transfer worker panicked");
                let err = DeviceError::new(DeviceErrorKind::Internal, self.shared.engine.name(), message);
                self.fail(err.into())
            }
        }
    }

    fn execute(&self) -> OperationOutcome {
        let mut session = match self
            .shared
            .engine
            .open(&self.request.source_id, &self.request.dest_id)
        {
            Ok(session) => session,
            Err(err) => return self.fail(err.into()),
        };

        let total = session.total_size();
        {
            let mut guard = self.shared.lock();
            guard.state_mut().total_bytes = total;
            guard.log(LogEntry::info(format!(
                "Copying {total} bytes from {} to {}",
                self.request.source_id, self.request.dest_id
            )));
        }

        match self.copy_pass(session.as_mut(), total) {
            Ok(PassEnd::Done) => {}
            Ok(PassEnd::Cancelled) => return self.finish_cancelled(Phase::Running),
            Err(err) => return self.fail(err),
        }

        if let Err(err) = session.flush() {
            return self.fail(err.into());
        }

        let digest = if self.request.verify {
            if !self.enter_verify(total) {
                return self.finish_cancelled(Phase::Running);
            }
            match self.verify_pass(session.as_mut(), total) {
                Ok(Some(digest)) => Some(digest),
                Ok(None) => return self.finish_cancelled(Phase::Verifying),
                Err(err) => return self.fail(err),
            }
        } else {
            None
        };

        self.complete(total, digest)
    }

    fn copy_pass(&self, session: &mut dyn TransferSession, total: u64) -> Result<PassEnd, OperationError> {
        self.run_pass(Phase::Running, total, |offset, len| {
            let data = session.read_chunk(Endpoint::Source, offset, len)?;
            if data.len() != len {
                return Err(DeviceError::new(
                    DeviceErrorKind::ShortRead,
                    self.request.source_id.as_str(),
                    format!("expected {len} bytes, got {}", data.len()),
                )
                .at(offset)
                .into());
            }
            session.write_chunk(offset, &data)?;
            Ok(())
        })
    }

    /// Returns the device digest, or `None` when the pass was cancelled.
    fn verify_pass(
        &self,
        session: &mut dyn TransferSession,
        total: u64,
    ) -> Result<Option<ContentHash>, OperationError> {
        let mut device = blake3::Hasher::new();

        let end = self.run_pass(Phase::Verifying, total, |offset, len| {
            let expected = session.read_chunk(Endpoint::Source, offset, len)?;
            let actual = session.read_chunk(Endpoint::Destination, offset, len)?;

            if blake3::hash(&expected) != blake3::hash(&actual) {
                let at = expected
                    .iter()
                    .zip(&actual)
                    .position(|(a, b)| a != b)
                    .unwrap_or(expected.len().min(actual.len()));
                return Err(OperationError::VerificationFailed {
                    offset,
                    length: len as u64,
                    detail: format!(
                        "{} differs from {} at byte {}",
                        self.request.dest_id,
                        self.request.source_id,
                        offset + at as u64
                    ),
                });
            }

            device.update(&actual);
            Ok(())
        })?;

        Ok(match end {
            PassEnd::Done => Some(ContentHash::new(*device.finalize().as_bytes())),
            PassEnd::Cancelled => None,
        })
    }

    /// Walk `total` bytes in chunks, calling `step` for each one.
    ///
    /// Cancellation is checked before every chunk and once after the last.
    fn run_pass<F>(&self, stage: Phase, total: u64, mut step: F) -> Result<PassEnd, OperationError>
    where
        F: FnMut(u64, usize) -> Result<(), OperationError>,
    {
        let chunk_size = self.shared.config.chunk_size.max(1);
        let delay = self.shared.config.chunk_delay();
        let slow = self.shared.config.slow_chunk_threshold();
        let mut progress = PassProgress::new(total);

        if total == 0 {
            let change = progress.finish();
            self.record(stage, &progress, change);
        }

        let mut offset = 0u64;
        while offset < total {
            if offset > 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }
            if self.cancel.is_cancelled() {
                return Ok(PassEnd::Cancelled);
            }

            let len = chunk_size.min(total - offset) as usize;
            let started = Instant::now();
            step(offset, len)?;
            let elapsed = started.elapsed();

            let change = progress.advance(len as u64);
            self.record(stage, &progress, change);

            if let Some(threshold) = slow.filter(|t| elapsed > *t) {
                self.slow_chunk(offset, elapsed, threshold);
            }
            offset += len as u64;
        }

        if self.cancel.is_cancelled() {
            return Ok(PassEnd::Cancelled);
        }
        Ok(PassEnd::Done)
    }

    fn record(&self, stage: Phase, progress: &PassProgress, change: ProgressStep) {
        let mut guard = self.shared.lock();
        guard.state_mut().bytes_done = progress.bytes_done;

        let Some(percent) = change.changed_to else {
            return;
        };
        guard.state_mut().progress = percent;
        guard.emit(OperationEvent::Progress {
            operation_id: self.operation_id,
            stage,
            percent,
            bytes_done: progress.bytes_done,
            total_bytes: progress.bytes_total,
        });

        let label = pass_label(stage);
        for milestone in change.milestones {
            guard.log(LogEntry::info(format!("{label} progress: {milestone}% completed")));
        }
    }

    fn slow_chunk(&self, offset: u64, elapsed: Duration, threshold: Duration) {
        let mut guard = self.shared.lock();
        guard.log(LogEntry::warning(format!(
            "Chunk at offset {offset} took {} ms (threshold {} ms)",
            elapsed.as_millis(),
            threshold.as_millis()
        )));
    }

    /// Switch to the verify pass unless a cancellation is already pending.
    fn enter_verify(&self, total: u64) -> bool {
        let mut guard = self.shared.lock();
        if guard.state().cancel_requested {
            return false;
        }

        let state = guard.state_mut();
        state.progress = 0;
        state.bytes_done = 0;
        state.total_bytes = total;
        guard.log(LogEntry::info("Starting verification process..."));
        guard.set_phase(Phase::Verifying);
        true
    }

    fn complete(&self, total: u64, digest: Option<ContentHash>) -> OperationOutcome {
        let mut guard = self.shared.lock();
        if guard.state().cancel_requested {
            let during = if digest.is_some() {
                Phase::Verifying
            } else {
                Phase::Running
            };
            return self.cancelled_locked(&mut guard, during);
        }

        if let Some(digest) = &digest {
            guard.log(LogEntry::success(format!(
                "Verification completed successfully (blake3 {digest})"
            )));
        }
        guard.log(LogEntry::success("Clone operation completed successfully"));

        let outcome = OperationOutcome::Completed {
            bytes: total,
            digest,
        };
        self.finish_locked(&mut guard, Phase::Completed, outcome)
    }

    fn finish_cancelled(&self, during: Phase) -> OperationOutcome {
        let mut guard = self.shared.lock();
        self.cancelled_locked(&mut guard, during)
    }

    fn cancelled_locked(&self, guard: &mut StateGuard<'_>, during: Phase) -> OperationOutcome {
        let (bytes_done, progress) = (guard.state().bytes_done, guard.state().progress);
        let outcome = OperationOutcome::Cancelled {
            during,
            bytes_done,
            progress,
        };

        guard.log(LogEntry::warning(format!(
            "{} operation cancelled at {progress}%",
            pass_label(during)
        )));
        guard.log(LogEntry::warning(format!(
            "Destination {} is partially written and not guaranteed consistent",
            self.request.dest_id
        )));
        self.finish_locked(guard, Phase::Cancelled, outcome)
    }

    fn fail(&self, err: OperationError) -> OperationOutcome {
        let mut guard = self.shared.lock();
        guard.state_mut().error = Some(err.clone());
        guard.log(LogEntry::error(format!("Clone operation failed: {}", err.detail())));
        self.finish_locked(&mut guard, Phase::Failed, OperationOutcome::Failed(err))
    }

    fn finish_locked(&self, guard: &mut StateGuard<'_>, phase: Phase, outcome: OperationOutcome) -> OperationOutcome {
        guard.shared_mut().cancel = None;
        guard.set_phase(phase);
        guard.emit(OperationEvent::Finished {
            operation_id: self.operation_id,
            outcome: outcome.clone(),
        });
        outcome
    }
}

/// Mark operation `operation_id` failed if its worker vanished without
/// reaching a terminal phase.
pub(crate) fn abandon(shared: &ControllerShared, operation_id: u64, reason: String) -> OperationOutcome {
    let err = OperationError::from(DeviceError::new(DeviceErrorKind::Internal, shared.engine.name(), reason));

    let mut guard = shared.lock();
    let state = guard.state();
    if state.operation_id != Some(operation_id) || !state.phase.is_active() {
        return OperationOutcome::Failed(err);
    }

    guard.state_mut().error = Some(err.clone());
    guard.log(LogEntry::error(format!("Clone operation failed: {}", err.detail())));
    guard.shared_mut().cancel = None;
    guard.set_phase(Phase::Failed);
    let outcome = OperationOutcome::Failed(err);
    guard.emit(OperationEvent::Finished {
        operation_id,
        outcome: outcome.clone(),
    });
    outcome
}

fn pass_label(stage: Phase) -> &'static str {
    match stage {
        Phase::Verifying => "Verify",
        _ => "Clone",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

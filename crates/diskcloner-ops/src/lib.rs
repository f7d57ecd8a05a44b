//! Operation controller and transfer engines for diskcloner.
//!
//! The [`OperationController`] runs one clone (and optional verify) at a
//! time on a blocking worker, reporting progress and log entries through a
//! broadcast channel and honoring cancellation at chunk boundaries. Engines
//! implement [`TransferEngine`]; [`FileEngine`] works on block devices and
//! image files, [`MemoryEngine`] on in-memory buffers for dry runs and tests.

mod controller;
mod engine;
mod event;
mod file;
mod memory;
mod progress;
mod shared;
mod worker;

pub use controller::{Accepted, OperationController};
pub use engine::{Endpoint, TransferEngine, TransferSession};
pub use event::OperationEvent;
pub use file::FileEngine;
pub use memory::{FaultPlan, IoStats, MemoryEngine, WriteHook};
pub use progress::{PassProgress, ProgressStep, MILESTONES};

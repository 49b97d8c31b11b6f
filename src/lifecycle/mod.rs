//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Background work (tasks.rs):
//!     spawn → registered until natural completion (self-removal)
//!     cancel_all → cancellation signal to every registered task, registry cleared
//!     await_all → wait for the snapshot of registered tasks, optional deadline
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast: every long-running task subscribes
//! - Cancellation is cooperative; tasks observe it at suspension points
//! - Drain has a timeout: the process exits even if work is stuck

pub mod shutdown;
pub mod tasks;

pub use shutdown::Shutdown;
pub use tasks::{BackgroundTaskHandle, TaskSupervisor};

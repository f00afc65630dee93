//! Sharpline Backend Library
//!
//! Exposes the decision-engine core for binaries and tests: the event bus,
//! the signal lifecycle, the sport-agnostic edge evaluator, the parlay
//! portfolio engine, the risk agent, the three-wave scheduler, and the
//! document-store adapter.

pub mod adapters;
pub mod bus;
pub mod grading;
pub mod ops;
pub mod orchestrator;
pub mod parlay;
pub mod risk;
pub mod scheduler;
pub mod signals;
pub mod sim;
pub mod sport;
pub mod store;

// Re-export the request-side surface for convenience.
pub use orchestrator::{get_orchestrator, shutdown_orchestrator, Orchestrator};
pub use scheduler::{SchedulerConfig, ThreeWaveScheduler};
pub use signals::SignalManager;

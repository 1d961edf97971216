//! Scenario orchestration primitives shared by integration tests and runners.

mod ack;
mod cleanup;
mod scope;
mod sequencer;
pub mod wait;

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use ack::{AckError, AckWaiter, AckWindow};
pub use cleanup::TopologyCleanup;
pub use scope::{ScopeError, run_scoped};
pub use sequencer::{BuildError, BuildOptions, BuildStage, Environment, build};
pub use wait::WaitError;

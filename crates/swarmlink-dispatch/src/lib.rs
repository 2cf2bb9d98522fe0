//! Swarmlink Dispatch - capability-matched queueing and correlated dispatch
//!
//! [`JobQueue`] owns retry accounting and the dead-letter list. [`Dispatcher`]
//! owns the per-run rendezvous: a map of `RunId -> oneshot` completions with
//! atomic single-consumer removal, so every dispatched run publishes exactly
//! one outcome (result or timeout) to its waiter. [`JobRunner`] ties the two
//! together for the HTTP run path.

pub mod dispatcher;
pub mod queue;
pub mod runner;

pub use dispatcher::{AgentJobOutcome, DispatchResult, Dispatcher, JobOutcome};
pub use queue::{CompletedJob, DeadJob, JobQueue, QueueDepths, TimeoutDisposition};
pub use runner::JobRunner;

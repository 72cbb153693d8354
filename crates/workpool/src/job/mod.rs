//! Job abstractions
//!
//! Jobs are units of work executed by pool workers. They:
//! - Carry a payload that is cloned into every attempt
//! - May fail and be retried according to their retry policy
//! - Support cancellation and deadlines via [`CancelSignal`]
//! - Run their cleanup callback exactly once, whatever the outcome

mod cancel;
mod definition;
mod outcome;

pub use cancel::CancelSignal;
pub use definition::{Job, JobHandler, JobResult};
pub use outcome::{JobHandle, JobOutcome, JobReport, OutcomeKind};

pub(crate) use definition::QueuedJob;
pub(crate) use outcome::{panic_message, Completion};

/// Identifier assigned to every job at construction (UUID v7)
pub type JobId = uuid::Uuid;

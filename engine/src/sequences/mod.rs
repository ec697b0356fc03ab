// Drip Sequence Service
//
// Persisted multi-step email campaigns, advanced by a periodic tick.

pub mod scheduler;
pub mod state;
pub mod store;
pub mod templates;

pub use scheduler::{SequenceError, SequenceScheduler, StartOutcome, TickReport};
pub use state::{SequenceState, SequenceStatus, SequenceStepState};
pub use store::{SequenceStore, StoreError};
pub use templates::{SequenceStepTemplate, SequenceTemplate};

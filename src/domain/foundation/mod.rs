//! Foundation value objects shared by every domain module.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{CheckpointId, InteractionId, ProviderId, ThreadId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;

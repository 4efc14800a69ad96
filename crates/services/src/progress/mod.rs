mod gateway;
mod store;
mod view;

// Public API of the progress subsystem.
pub use crate::error::ProgressError;
pub use gateway::SyncGateway;
pub use store::ProgressStore;
pub use view::{ProgressAction, ProgressView, StorePhase};

//! Checkpoint identifiers and the single-slot resume marker.

pub mod id;
pub mod store;

pub use id::CheckpointId;
pub use store::{Query, ResumeKind, ResumeStore};

pub mod artifact;
pub mod budget;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod finalize;
pub mod remote;
pub mod report;
pub mod sections;
pub mod traversal;
pub mod vcs;
pub mod workspace;

pub use error::{Error, Result};

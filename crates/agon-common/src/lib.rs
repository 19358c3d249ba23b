//! Common types and errors shared by the agon crates.

pub mod error;
pub mod types;

pub use error::{AgonError, AgonResult};
pub use types::*;

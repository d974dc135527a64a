//! Types shared between the sandlite runtime library and its front ends.

pub mod errors;

pub use errors::{SandError, SandResult};

//! Pure data types for abcpool — job descriptions, output schemas, exec
//! reports, and the error taxonomy.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that consumers can speak abcpool's types without pulling the
//! kernel's runtime deps.

pub mod error;
pub mod job;
pub mod report;
pub mod schema;

// Flat re-exports for convenience
pub use error::*;
pub use job::*;
pub use report::*;
pub use schema::*;

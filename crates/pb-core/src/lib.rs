//! pb-core: shared types, errors, configuration, and the format registry.
//!
//! This crate is the foundational dependency for the other pb-* crates. It
//! owns the conversion data model that flows between the gateway and the
//! executor, the unified error type, and the static table of formats Pandoc
//! is allowed to read and write.

pub mod config;
pub mod conversion;
pub mod error;
pub mod formats;

// Re-export the most commonly used items at the crate root.
pub use conversion::*;
pub use error::{Error, FormatDirection, Result};

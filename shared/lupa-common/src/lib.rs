//! Lupa Common Library
//!
//! Shared attachment types and the content-disposition header codec used by
//! the server and by maintenance tooling.

pub mod disposition;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

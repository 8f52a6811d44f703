//! Shared Types

mod attachment;
mod container;
mod repair;

pub use attachment::*;
pub use container::*;
pub use repair::*;

//! Types and helpers shared by every ccm crate.

pub mod error;
pub mod paths;
pub mod timestamp;

pub use error::{Error, Result};
pub use timestamp::Timestamp;

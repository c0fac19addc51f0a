//! Common utilities and types shared across the runtime configuration crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};

//! Common utilities and types shared across sentinel pool components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};

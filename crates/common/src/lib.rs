//! Common types shared by the calendar gateway crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, resolve_secret};

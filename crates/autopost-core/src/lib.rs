//! `autopost-core`: configuration, identifiers and the shared error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::AutopostConfig;
pub use error::{CoreError, Result};
pub use types::{JobId, RunId};

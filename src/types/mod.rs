//! Shared types for Agora

mod error;

pub use error::{EngineError, Result};

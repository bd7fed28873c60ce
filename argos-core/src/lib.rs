//! Argos Core Library
//!
//! This crate provides the fundamental types, configuration and error
//! handling shared by the Argos capture orchestration crates.

pub mod config;
pub mod error;
pub mod extractor;
pub mod packet;
pub mod types;

// Re-export commonly used types
pub use config::{ArgosConfig, CaptureDefaults, ExecutorType, OutputFormat, StreamSettings};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use packet::Packet;
pub use types::*;

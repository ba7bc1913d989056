//! prompt-relay - HTTP orchestration layer for OpenAI-compatible APIs
//!
//! This library provides the core functionality for the relay service,
//! including configuration, the upstream provider adapter, the SSE relay,
//! and the in-memory log buffer.

pub mod config;
pub mod error;
pub mod proxy;
pub mod storage;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};

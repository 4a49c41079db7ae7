//! Error types for keyvibe-audio
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Containment per kind:
//! - `Config`: fatal at startup, aborts a reload otherwise
//! - `ResourceExhausted`: the event is dropped and counted
//! - `Sink` / `Decode`: only the render that hit it ends

use thiserror::Error;

/// Main error type for keyvibe-audio
#[derive(Error, Debug)]
pub enum Error {
    /// Sound pack descriptor missing, unreadable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// No free execution slot
    #[error("No free execution slot (capacity {0})")]
    ResourceExhausted(usize),

    /// Audio output device or stream errors
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Sample file unreadable or corrupt
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Event feed line could not be parsed
    #[error("Invalid input event: {0}")]
    InvalidEvent(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] keyvibe_common::Error),
}

/// Convenience Result type using keyvibe-audio Error
pub type Result<T> = std::result::Result<T, Error>;

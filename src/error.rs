//! Driver error types
//!
//! `Map`, `Allocation` and `Lookup` are fatal: the hardware was set up wrong
//! or the page map is inconsistent, and retrying will not help. `Validation`
//! is returned at the API boundary and leaves all state untouched.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the WS2812 driver
#[derive(Debug, Error)]
pub enum Error {
    /// The raw memory device could not be opened or a register block could not be mapped
    #[error("failed to map {what} at 0x{base:08x}: {source}{hint}")]
    Map {
        what: &'static str,
        base: u32,
        #[source]
        source: io::Error,
        hint: &'static str,
    },

    /// The locked DMA buffer could not be allocated or its page map resolved
    #[error("DMA buffer allocation failed: {0}")]
    Allocation(String),

    /// An address did not fall inside the locked buffer
    #[error("no page of the locked buffer matches address 0x{address:x}")]
    Lookup { address: usize },

    /// A caller-supplied value was rejected
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The hardware has not been set up, or has already been released
    #[error("driver is not initialized")]
    NotInitialized,

    /// The configuration file could not be read or parsed
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl Error {
    /// Whether this error leaves the hardware in a state that must be torn down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Map { .. } | Error::Allocation(_) | Error::Lookup { .. }
        )
    }

    pub(crate) fn allocation(message: impl Into<String>) -> Self {
        Error::Allocation(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Lookup { address: 0x1000 }.is_fatal());
        assert!(Error::allocation("page 0 not present").is_fatal());
        assert!(!Error::validation("brightness 1.1").is_fatal());
        assert!(!Error::NotInitialized.is_fatal());
    }

    #[test]
    fn test_map_error_carries_hint() {
        let err = Error::Map {
            what: "/dev/mem",
            base: 0x2020_C000,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
            hint: " (try running as root)",
        };
        let text = err.to_string();
        assert!(text.contains("0x2020c000"));
        assert!(text.ends_with("(try running as root)"));
    }
}

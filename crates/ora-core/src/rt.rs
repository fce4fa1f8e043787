//! # Control Threads
//!
//! Named thread spawning for the sampling loop and the remote-management
//! listener. Names show up in panics and, with `thread_names` logging, in
//! every log line the thread emits.
//!
//! ## Example
//!
//! ```rust
//! use ora_core::rt::{spawn_named, ThreadConfig};
//!
//! let config = ThreadConfig::builder()
//!     .name("ora-sampler")
//!     .stack_size(256 * 1024)
//!     .build();
//!
//! let handle = spawn_named(config, || 7).unwrap();
//! assert_eq!(handle.join().unwrap(), 7);
//! ```

use crate::error::{OraError, Result};
use std::thread::{self, JoinHandle};

/// Thread name of the trigger policy sampling loop.
pub const SAMPLER_THREAD: &str = "ora-sampler";
/// Thread name of the remote-management listener.
pub const REMOTE_THREAD: &str = "ora-remote";

/// Configuration for spawning a control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadConfig {
    pub name: String,
    /// Stack size in bytes (0 = platform default)
    pub stack_size: usize,
}

impl ThreadConfig {
    pub fn builder() -> ThreadConfigBuilder {
        ThreadConfigBuilder::default()
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stack_size: 0,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self::new("ora-thread")
    }
}

/// Builder for [`ThreadConfig`].
#[derive(Debug, Default)]
pub struct ThreadConfigBuilder {
    config: ThreadConfig,
}

impl ThreadConfigBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    pub fn build(self) -> ThreadConfig {
        self.config
    }
}

/// Spawn a named thread.
///
/// # Errors
///
/// Returns [`OraError::Runtime`] if the OS refuses to create the thread.
pub fn spawn_named<F, T>(config: ThreadConfig, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let mut builder = thread::Builder::new().name(config.name.clone());
    if config.stack_size > 0 {
        builder = builder.stack_size(config.stack_size);
    }

    let handle = builder
        .spawn(f)
        .map_err(|e| OraError::Runtime(format!("failed to spawn {}: {}", config.name, e)))?;
    tracing::debug!(thread = %config.name, "Spawned control thread");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ThreadConfig::builder()
            .name(SAMPLER_THREAD)
            .stack_size(64 * 1024)
            .build();
        assert_eq!(config.name, "ora-sampler");
        assert_eq!(config.stack_size, 64 * 1024);
        assert_eq!(ThreadConfig::default().stack_size, 0);
    }

    #[test]
    fn test_spawned_thread_is_named() {
        let handle = spawn_named(ThreadConfig::new(REMOTE_THREAD), || {
            thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("ora-remote"));
    }
}

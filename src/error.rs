//! Runtime-level errors.
//!
//! Fiber outcomes are described by [`Cause`](crate::types::Cause); this
//! module covers failures of the machinery itself: building a runtime,
//! spawning worker threads, loading configuration and submitting work to a
//! context that has shut down.

use core::fmt;
use std::sync::Arc;

/// The kind of runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A configuration value or file could not be used.
    InvalidConfig,
    /// A worker or timer thread could not be spawned.
    ThreadSpawn,
    /// The target execution context has been shut down.
    ContextShutdown,
    /// The runtime has been shut down.
    RuntimeShutdown,
    /// Runtime bug or invalid internal state.
    Internal,
}

impl ErrorKind {
    /// Returns true if retrying the same operation cannot succeed.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::InvalidConfig | Self::ContextShutdown | Self::RuntimeShutdown
        )
    }
}

/// The main error type for runtime operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if the error was caused by a shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ContextShutdown | ErrorKind::RuntimeShutdown
        )
    }

    /// Adds a message to the error.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized result type for runtime operations.
pub type Result<T> = core::result::Result<T, Error>;

//! Error types shared by resolvers, drivers and the registry.
//!
//! Failures coming from collaborators (the DSN resolver, the inner driver's
//! connector factory, the physical connect) are wrapped transparently: their
//! `Display` and `source()` are forwarded unchanged and the original error is
//! recovered with [`Error::into_inner`].

use std::time::Duration;

use thiserror::Error;

/// Type-erased error produced by a collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving a DSN or opening a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The resolver failed to produce a DSN.
    #[error(transparent)]
    Resolve(BoxError),

    /// The resolver did not answer within the configured timeout.
    #[error("DSN resolution timed out after {0:?}")]
    ResolveTimeout(Duration),

    /// The inner driver could not build a connector for the resolved DSN.
    #[error(transparent)]
    Build(BoxError),

    /// The inner driver or connector failed to open a physical connection.
    #[error(transparent)]
    Connect(BoxError),

    /// The caller's cancellation token fired before the connector was settled.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// An alias can only be registered once.
    #[error("driver alias {0:?} is already registered")]
    DuplicateAlias(String),

    /// Nothing is registered under the alias.
    #[error("no driver registered under alias {0:?}")]
    UnknownAlias(String),

    /// The alias exists but its driver yields a different connection type.
    #[error("driver registered under alias {0:?} produces a different connection type")]
    ConnectionTypeMismatch(String),
}

impl Error {
    /// Returns `true` if the attempt was abandoned because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` for resolver failures, including timeouts.
    pub fn is_resolve_error(&self) -> bool {
        matches!(self, Error::Resolve(_) | Error::ResolveTimeout(_))
    }

    /// Recovers a crate error that crossed a type-erased [`Driver`] boundary,
    /// wrapping anything else with `wrap`.
    ///
    /// [`Driver`]: crate::driver::Driver
    pub(crate) fn lift(err: BoxError, wrap: fn(BoxError) -> Error) -> Error {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => wrap(err),
        }
    }

    /// Unwraps the collaborator error, if this error carries one.
    pub fn into_inner(self) -> Option<BoxError> {
        match self {
            Error::Resolve(e) | Error::Build(e) | Error::Connect(e) => Some(e),
            _ => None,
        }
    }
}

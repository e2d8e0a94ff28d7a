//! # lazydsn
//!
//! A database-agnostic driver adapter that resolves the DSN at the moment each
//! physical connection is opened, instead of once when the database handle is
//! created. Pair it with a pool that expires connections and rotating
//! credentials (e.g. passwords issued by a secret store) are picked up without
//! the application ever noticing an authentication failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lazydsn::driver::{Driver, LazyDriver};
//! use lazydsn::resolver::context_provider_fn;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn connect<D: Driver>(inner: D) -> lazydsn::Result<D::Connection> {
//!     let driver = LazyDriver::new(
//!         inner,
//!         context_provider_fn(|_cancel: CancellationToken, master: String| async move {
//!             // Look the current credentials up, e.g. in a secret store.
//!             Ok::<_, std::io::Error>(format!("postgres://app:hunter2@db/{master}"))
//!         }),
//!     );
//!
//!     // One connector per database handle; hand it to your pool.
//!     let connector = driver.open_connector("orders").await?;
//!     connector.connect(&CancellationToken::new()).await
//! }
//! ```
//!
//! The inner driver's connector is rebuilt only when the resolved DSN changes.

// ── Core ──────────────────────────────────────────────────────────────────────
pub mod driver;
pub mod error;
pub mod resolver;

// ── Alias registration ────────────────────────────────────────────────────────
pub mod registry;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::pin::Pin;

/// Boxed, `Send` future returned by the driver and resolver traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use driver::{Connector, ConnectorFactory, Driver, LazyConnector, LazyDriver};
pub use error::{BoxError, Error, Result};
pub use resolver::{ContextDsnProvider, DsnProvider, Resolver, context_provider_fn, provider_fn};

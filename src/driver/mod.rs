//! Driver contract and the DSN-deferring [`LazyDriver`].
//!
//! A [`Driver`] opens physical connections from a DSN. Drivers that can parse
//! and validate a DSN once, up front, additionally expose a
//! [`ConnectorFactory`] through [`Driver::connector_factory`]; the resulting
//! [`Connector`] then produces connections without touching the DSN again.
//!
//! [`LazyDriver`] wraps any inner driver and a [`Resolver`]. The DSN it is
//! opened with is a *master identifier*: it is never passed to the inner
//! driver, only the DSN the resolver returns for it is.
//!
//! ```text
//! open_connector(master)
//!   → inner driver has a ConnectorFactory?
//!     → yes: resolve once, build inner connector → LazyConnector::Caching
//!     → no:  LazyConnector::Direct (resolve + open on every connect)
//! ```

pub mod connector;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::BoxFuture;
use crate::error::{BoxError, Error, Result};
use crate::resolver::{ContextDsnProvider, Resolver};

pub use connector::{CachingConnector, DirectConnector, LazyConnector};

/// Shared, type-erased connector handle.
pub type SharedConnector<C> = Arc<dyn Connector<Connection = C>>;

/// Opens physical connections given a DSN.
pub trait Driver: Send + Sync + 'static {
    /// The physical connection type this driver produces.
    type Connection: Send + 'static;

    /// Open a new connection to `dsn`.
    fn open<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Self::Connection, BoxError>>;

    /// Returns the connector-building capability, if this driver has one.
    fn connector_factory(&self) -> Option<&dyn ConnectorFactory<Connection = Self::Connection>> {
        None
    }
}

/// Builds reusable connectors from a DSN.
pub trait ConnectorFactory: Send + Sync {
    type Connection: Send + 'static;

    /// Parse `dsn` and return a connector bound to it.
    fn open_connector<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, std::result::Result<SharedConnector<Self::Connection>, BoxError>>;
}

/// Produces physical connections for a fixed configuration.
pub trait Connector: Send + Sync {
    type Connection: Send + 'static;

    /// Open a new connection, giving up when `cancel` fires.
    fn connect<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, std::result::Result<Self::Connection, BoxError>>;
}

/// Driver adapter that resolves the DSN every time a connection is opened.
///
/// Cloning is cheap; clones share the inner driver and resolver.
///
/// # Examples
///
/// ```rust,no_run
/// # use lazydsn::driver::{Driver, LazyDriver};
/// # use lazydsn::resolver::provider_fn;
/// # async fn demo<D: Driver>(inner: D) -> lazydsn::Result<()> {
/// let driver = LazyDriver::new(
///     inner,
///     provider_fn(|master: String| async move {
///         Ok::<_, std::io::Error>(format!("postgres://app:{}@db/{master}", "secret"))
///     }),
/// );
/// let connector = driver.open_connector("orders").await?;
/// let conn = connector.connect(&Default::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct LazyDriver<D> {
    inner: Arc<D>,
    resolver: Arc<dyn ContextDsnProvider>,
    resolve_timeout: Option<Duration>,
}

impl<D> Clone for LazyDriver<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            resolver: Arc::clone(&self.resolver),
            resolve_timeout: self.resolve_timeout,
        }
    }
}

impl<D> std::fmt::Debug for LazyDriver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDriver")
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LazyDriver`] with optional settings.
pub struct LazyDriverBuilder<D> {
    inner: D,
    resolver: Resolver,
    resolve_timeout: Option<Duration>,
}

impl<D: Driver> LazyDriverBuilder<D> {
    /// Bounds every DSN resolution by `timeout` (default: unbounded).
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> LazyDriver<D> {
        LazyDriver {
            inner: Arc::new(self.inner),
            resolver: self.resolver.into_context_aware(),
            resolve_timeout: self.resolve_timeout,
        }
    }
}

impl<D: Driver> LazyDriver<D> {
    /// Wraps `inner` so that DSNs are resolved through `resolver`.
    ///
    /// A basic resolver is adapted to the cancellation-aware form here, once.
    /// This does not register the driver anywhere; see
    /// [`registry::register`](crate::registry::register).
    pub fn new(inner: D, resolver: impl Into<Resolver>) -> Self {
        Self::builder(inner, resolver).build()
    }

    pub fn builder(inner: D, resolver: impl Into<Resolver>) -> LazyDriverBuilder<D> {
        LazyDriverBuilder {
            inner,
            resolver: resolver.into(),
            resolve_timeout: None,
        }
    }

    /// The wrapped driver.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Resolves `master` and opens a connection on the inner driver directly.
    ///
    /// No cancellation token is available on this path, so the basic
    /// resolver entry point is used.
    pub async fn open(&self, master: &str) -> Result<D::Connection> {
        let dsn = self.bounded(self.resolver.fetch_dsn(master)).await?;
        trace!("DSN resolved, opening connection directly");
        self.inner
            .open(&dsn)
            .await
            .map_err(|e| Error::lift(e, Error::Connect))
    }

    /// Builds the long-lived connector for one database handle.
    ///
    /// With a connector-capable inner driver, `master` is resolved now and the
    /// inner connector is built from the result; the returned connector
    /// rebuilds it whenever a later resolution yields a different DSN.
    /// Otherwise the returned connector calls [`open`](Self::open) on every
    /// connect.
    pub async fn open_connector(&self, master: &str) -> Result<LazyConnector<D>> {
        let Some(factory) = self.inner.connector_factory() else {
            return Ok(LazyConnector::Direct(DirectConnector::new(self.clone(), master)));
        };

        let dsn = self.bounded(self.resolver.fetch_dsn(master)).await?;
        let inner = factory
            .open_connector(&dsn)
            .await
            .map_err(|e| Error::lift(e, Error::Build))?;
        Ok(LazyConnector::Caching(CachingConnector::seeded(
            self.clone(),
            master,
            dsn,
            inner,
        )))
    }

    /// Like [`open_connector`](Self::open_connector), but defers the first
    /// resolution and build to the first connect.
    pub fn deferred_connector(&self, master: &str) -> LazyConnector<D> {
        if self.inner.connector_factory().is_some() {
            LazyConnector::Caching(CachingConnector::deferred(self.clone(), master))
        } else {
            LazyConnector::Direct(DirectConnector::new(self.clone(), master))
        }
    }

    /// Cancellation-aware resolution used by connectors.
    pub(crate) async fn resolve(&self, cancel: &CancellationToken, master: &str) -> Result<String> {
        self.bounded(self.resolver.fetch_dsn_with_context(cancel, master))
            .await
    }

    async fn bounded(
        &self,
        fetch: BoxFuture<'_, std::result::Result<String, BoxError>>,
    ) -> Result<String> {
        match self.resolve_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(resolved) => resolved.map_err(Error::Resolve),
                Err(_) => Err(Error::ResolveTimeout(limit)),
            },
            None => fetch.await.map_err(Error::Resolve),
        }
    }
}

impl<D: Driver> Driver for LazyDriver<D> {
    type Connection = D::Connection;

    fn open<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Self::Connection, BoxError>> {
        Box::pin(async move { LazyDriver::open(self, dsn).await.map_err(Into::into) })
    }

    fn connector_factory(&self) -> Option<&dyn ConnectorFactory<Connection = Self::Connection>> {
        Some(self)
    }
}

impl<D: Driver> ConnectorFactory for LazyDriver<D> {
    type Connection = D::Connection;

    fn open_connector<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, std::result::Result<SharedConnector<Self::Connection>, BoxError>> {
        Box::pin(async move {
            let connector = LazyDriver::open_connector(self, dsn).await?;
            Ok(Arc::new(connector) as SharedConnector<Self::Connection>)
        })
    }
}

//! Per-handle connectors produced by [`LazyDriver`].
//!
//! [`CachingConnector`] keeps the last resolved DSN together with the inner
//! connector built from it and rebuilds the latter only when a resolution
//! returns a different DSN. [`DirectConnector`] is the fallback for inner
//! drivers without a [`ConnectorFactory`](super::ConnectorFactory): it
//! resolves and opens on every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Connector, Driver, LazyDriver, SharedConnector};
use crate::BoxFuture;
use crate::error::{BoxError, Error, Result};

/// The connector handed out by [`LazyDriver::open_connector`].
pub enum LazyConnector<D: Driver> {
    /// The inner driver can build connectors; they are cached per DSN.
    Caching(CachingConnector<D>),
    /// The inner driver can only open directly.
    Direct(DirectConnector<D>),
}

impl<D: Driver> LazyConnector<D> {
    /// Opens a physical connection, resolving the DSN first.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<D::Connection> {
        match self {
            LazyConnector::Caching(c) => c.connect(cancel).await,
            LazyConnector::Direct(c) => c.connect(cancel).await,
        }
    }

    /// The driver this connector belongs to.
    pub fn driver(&self) -> &LazyDriver<D> {
        match self {
            LazyConnector::Caching(c) => &c.driver,
            LazyConnector::Direct(c) => &c.driver,
        }
    }
}

impl<D: Driver> Connector for LazyConnector<D> {
    type Connection = D::Connection;

    fn connect<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, std::result::Result<Self::Connection, BoxError>> {
        Box::pin(async move { LazyConnector::connect(self, cancel).await.map_err(Into::into) })
    }
}

impl<D: Driver> std::fmt::Debug for LazyConnector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LazyConnector::Caching(c) => f.debug_tuple("Caching").field(c).finish(),
            LazyConnector::Direct(c) => f.debug_tuple("Direct").field(c).finish(),
        }
    }
}

// The resolved DSN and the inner connector built from it. Always replaced as a pair.
struct Cached<C: Send + 'static> {
    dsn: String,
    connector: SharedConnector<C>,
}

/// Connector for inner drivers with a connector factory.
///
/// Every [`connect`](Self::connect) re-resolves the master identifier. When
/// the result matches the cached DSN exactly, the cached inner connector is
/// reused; otherwise a new one is built and, only if that succeeds, replaces
/// the cached pair. Resolution and rebuild are serialized per connector, so
/// concurrent callers that observe a change wait for a single rebuild.
pub struct CachingConnector<D: Driver> {
    driver: LazyDriver<D>,
    master: String,
    cached: Mutex<Option<Cached<D::Connection>>>,
    rebuilds: AtomicU64,
}

impl<D: Driver> CachingConnector<D> {
    pub(crate) fn seeded(
        driver: LazyDriver<D>,
        master: &str,
        dsn: String,
        connector: SharedConnector<D::Connection>,
    ) -> Self {
        debug!("inner connector built");
        Self {
            driver,
            master: master.to_owned(),
            cached: Mutex::new(Some(Cached { dsn, connector })),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub(crate) fn deferred(driver: LazyDriver<D>, master: &str) -> Self {
        Self {
            driver,
            master: master.to_owned(),
            cached: Mutex::new(None),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Number of times the cached inner connector was replaced after a DSN
    /// change. The first build, eager or deferred, is not counted.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Opens a physical connection through the inner connector for the
    /// currently resolved DSN.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires before the inner connector is
    ///   settled; cached state is left as it was.
    /// - [`Error::Resolve`] / [`Error::ResolveTimeout`] if resolution fails.
    /// - [`Error::Build`] if the inner connector cannot be built for a new
    ///   DSN. The previous connector stays cached and the next call retries.
    /// - [`Error::Connect`] if the inner connector fails.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<D::Connection> {
        // Biased: an already-cancelled token wins before resolution is polled.
        let connector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            current = self.current(cancel) => current?,
        };

        connector
            .connect(cancel)
            .await
            .map_err(|e| Error::lift(e, Error::Connect))
    }

    // Resolve, compare against the cache and rebuild on change. The lock is
    // held throughout; dropping this future leaves the cache untouched.
    async fn current(&self, cancel: &CancellationToken) -> Result<SharedConnector<D::Connection>> {
        let mut cached = self.cached.lock().await;
        let dsn = self.driver.resolve(cancel, &self.master).await?;

        if let Some(current) = &*cached {
            if current.dsn == dsn {
                trace!("DSN unchanged, reusing inner connector");
                return Ok(Arc::clone(&current.connector));
            }
        }

        let factory = self
            .driver
            .inner()
            .connector_factory()
            .ok_or_else(|| Error::Build("inner driver lost its connector factory".into()))?;
        let connector = factory
            .open_connector(&dsn)
            .await
            .map_err(|e| Error::lift(e, Error::Build))?;

        if cached.is_some() {
            self.rebuilds.fetch_add(1, Ordering::Relaxed);
            debug!("DSN changed, inner connector rebuilt");
        } else {
            debug!("inner connector built");
        }
        *cached = Some(Cached {
            dsn,
            connector: Arc::clone(&connector),
        });
        Ok(connector)
    }
}

// DSNs and master identifiers carry credentials; keep them out of Debug output.
impl<D: Driver> std::fmt::Debug for CachingConnector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingConnector")
            .field("driver", &self.driver)
            .field("rebuilds", &self.rebuilds())
            .finish_non_exhaustive()
    }
}

/// Connector for inner drivers that can only open directly.
///
/// Each [`connect`](Self::connect) resolves the master identifier and calls
/// the inner driver's `open`. Nothing is cached.
pub struct DirectConnector<D: Driver> {
    driver: LazyDriver<D>,
    master: String,
}

impl<D: Driver> DirectConnector<D> {
    pub(crate) fn new(driver: LazyDriver<D>, master: &str) -> Self {
        Self {
            driver,
            master: master.to_owned(),
        }
    }

    /// Resolves and opens a connection. `cancel` is checked before starting
    /// and aborts the attempt when it fires; it is not forwarded, since the
    /// direct-open path has no way to carry it.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<D::Connection> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            conn = self.driver.open(&self.master) => conn,
        }
    }
}

impl<D: Driver> std::fmt::Debug for DirectConnector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConnector")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

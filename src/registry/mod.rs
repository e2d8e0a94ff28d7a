//! Process-wide driver registry.
//!
//! Associates an alias with a driver for the lifetime of the process, so that
//! code which only knows the alias and a master identifier can open database
//! handles. Registration is one-shot: an alias cannot be replaced or removed.
//!
//! ```rust,no_run
//! # use lazydsn::driver::Driver;
//! # use lazydsn::resolver::provider_fn;
//! # async fn demo<D: Driver>(inner: D) -> lazydsn::Result<()> {
//! lazydsn::registry::register(
//!     "lazydsn:postgres",
//!     inner,
//!     provider_fn(|master: String| async move { Ok::<_, std::io::Error>(master) }),
//! )?;
//!
//! let handle = lazydsn::registry::open::<D::Connection>("lazydsn:postgres", "arn:secret").await?;
//! let conn = handle.connect(&Default::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{Driver, LazyDriver, SharedConnector};
use crate::error::{Error, Result};
use crate::resolver::Resolver;

/// A registered driver, erased down to its connection type.
pub type DynDriver<C> = Arc<dyn Driver<Connection = C>>;

type Table = RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>;

fn table() -> &'static Table {
    static DRIVERS: OnceLock<Table> = OnceLock::new();
    DRIVERS.get_or_init(Default::default)
}

/// Wraps `inner` in a [`LazyDriver`] using `resolver` and registers it under `alias`.
///
/// # Errors
///
/// Returns [`Error::DuplicateAlias`] if `alias` is already taken.
pub fn register<D: Driver>(alias: &str, inner: D, resolver: impl Into<Resolver>) -> Result<()> {
    register_driver(alias, LazyDriver::new(inner, resolver))
}

/// Registers an already constructed driver under `alias`.
pub fn register_driver<D: Driver>(alias: &str, driver: D) -> Result<()> {
    let erased: DynDriver<D::Connection> = Arc::new(driver);
    // A poisoned lock still guards a consistent map: inserts are single calls.
    let mut drivers = table().write().unwrap_or_else(|e| e.into_inner());
    if drivers.contains_key(alias) {
        return Err(Error::DuplicateAlias(alias.to_owned()));
    }
    drivers.insert(alias.to_owned(), Arc::new(erased));
    debug!(alias, "driver registered");
    Ok(())
}

/// Looks up the driver registered under `alias`.
///
/// # Errors
///
/// - [`Error::UnknownAlias`] if nothing is registered under `alias`.
/// - [`Error::ConnectionTypeMismatch`] if the driver produces connections
///   other than `C`.
pub fn driver<C: Send + 'static>(alias: &str) -> Result<DynDriver<C>> {
    let entry = table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(alias)
        .cloned()
        .ok_or_else(|| Error::UnknownAlias(alias.to_owned()))?;

    entry
        .downcast_ref::<DynDriver<C>>()
        .cloned()
        .ok_or_else(|| Error::ConnectionTypeMismatch(alias.to_owned()))
}

/// Aliases currently registered, sorted.
pub fn aliases() -> Vec<String> {
    let mut names: Vec<String> = table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Opens a database handle: looks up `alias` and builds the handle's single
/// connector from `master`.
pub async fn open<C: Send + 'static>(alias: &str, master: &str) -> Result<Handle<C>> {
    let driver = driver::<C>(alias)?;
    let connector = match driver.connector_factory() {
        Some(factory) => {
            let connector = factory
                .open_connector(master)
                .await
                .map_err(|e| Error::lift(e, Error::Build))?;
            Some(connector)
        }
        None => None,
    };
    Ok(Handle {
        driver,
        master: master.to_owned(),
        connector,
    })
}

/// An opened database handle. Owns exactly one connector, shared by every
/// connection request made through it.
pub struct Handle<C: Send + 'static> {
    driver: DynDriver<C>,
    master: String,
    connector: Option<SharedConnector<C>>,
}

impl<C: Send + 'static> Handle<C> {
    /// Opens a new physical connection. This is what a pool calls.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<C> {
        let result = match &self.connector {
            Some(connector) => connector.connect(cancel).await,
            None => self.driver.open(&self.master).await,
        };
        result.map_err(|e| Error::lift(e, Error::Connect))
    }

    pub fn driver(&self) -> &DynDriver<C> {
        &self.driver
    }
}

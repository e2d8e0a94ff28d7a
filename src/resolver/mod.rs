//! DSN resolvers — turn the master identifier given at open time into the DSN
//! handed to the inner driver.
//!
//! Two capabilities exist:
//!
//! - [`DsnProvider`] — the basic form, `fetch_dsn(master)`.
//! - [`ContextDsnProvider`] — additionally accepts a [`CancellationToken`] so a
//!   slow lookup (typically a secret-store round trip) can be abandoned.
//!
//! Drivers always talk to the cancellation-aware form. A basic provider is
//! adapted once, when the driver is built, through [`IgnoreCancellation`].
//!
//! Most applications don't need a dedicated type; [`provider_fn`] and
//! [`context_provider_fn`] turn an async closure into a resolver:
//!
//! ```rust,no_run
//! use lazydsn::resolver::{Resolver, provider_fn};
//!
//! let resolver: Resolver = provider_fn(|master: String| async move {
//!     Ok::<_, std::io::Error>(format!("{master}?password=rotated"))
//! })
//! .into();
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::BoxFuture;
use crate::error::BoxError;

/// Maps a master identifier to a driver-ready DSN.
pub trait DsnProvider: Send + Sync + 'static {
    /// Resolve `master` into the DSN to hand to the inner driver.
    fn fetch_dsn<'a>(&'a self, master: &'a str) -> BoxFuture<'a, Result<String, BoxError>>;
}

/// A [`DsnProvider`] that can be cancelled while resolving.
pub trait ContextDsnProvider: DsnProvider {
    /// Resolve `master`, giving up when `cancel` fires.
    fn fetch_dsn_with_context<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        master: &'a str,
    ) -> BoxFuture<'a, Result<String, BoxError>>;
}

/// A resolver as supplied by the application, in either capability variant.
#[derive(Clone)]
pub enum Resolver {
    Basic(Arc<dyn DsnProvider>),
    ContextAware(Arc<dyn ContextDsnProvider>),
}

impl Resolver {
    pub fn basic<P: DsnProvider>(provider: P) -> Self {
        Resolver::Basic(Arc::new(provider))
    }

    pub fn context_aware<P: ContextDsnProvider>(provider: P) -> Self {
        Resolver::ContextAware(Arc::new(provider))
    }

    /// Returns the cancellation-aware view of this resolver, wrapping a basic
    /// provider in [`IgnoreCancellation`].
    pub fn into_context_aware(self) -> Arc<dyn ContextDsnProvider> {
        match self {
            Resolver::Basic(provider) => Arc::new(IgnoreCancellation(provider)),
            Resolver::ContextAware(provider) => provider,
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolver::Basic(_) => f.write_str("Resolver::Basic"),
            Resolver::ContextAware(_) => f.write_str("Resolver::ContextAware"),
        }
    }
}

/// Adapts a basic provider to [`ContextDsnProvider`] by discarding the token.
pub struct IgnoreCancellation<P: ?Sized>(pub Arc<P>);

impl<P: DsnProvider + ?Sized> DsnProvider for IgnoreCancellation<P> {
    fn fetch_dsn<'a>(&'a self, master: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        self.0.fetch_dsn(master)
    }
}

impl<P: DsnProvider + ?Sized> ContextDsnProvider for IgnoreCancellation<P> {
    fn fetch_dsn_with_context<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        master: &'a str,
    ) -> BoxFuture<'a, Result<String, BoxError>> {
        self.0.fetch_dsn(master)
    }
}

/// Basic resolver backed by an async closure. Build one with [`provider_fn`].
pub struct ProviderFn<F>(F);

/// Wraps `f` as a basic [`DsnProvider`].
pub fn provider_fn<F, Fut, E>(f: F) -> ProviderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    ProviderFn(f)
}

impl<F, Fut, E> DsnProvider for ProviderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn fetch_dsn<'a>(&'a self, master: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        let fut = (self.0)(master.to_owned());
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

impl<F, Fut, E> From<ProviderFn<F>> for Resolver
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn from(provider: ProviderFn<F>) -> Self {
        Resolver::basic(provider)
    }
}

/// Cancellation-aware resolver backed by an async closure. Build one with
/// [`context_provider_fn`].
pub struct ContextProviderFn<F>(F);

/// Wraps `f` as a [`ContextDsnProvider`]. When called through the basic
/// [`DsnProvider::fetch_dsn`], `f` receives a token that is never cancelled.
pub fn context_provider_fn<F, Fut, E>(f: F) -> ContextProviderFn<F>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    ContextProviderFn(f)
}

impl<F, Fut, E> DsnProvider for ContextProviderFn<F>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn fetch_dsn<'a>(&'a self, master: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        let fut = (self.0)(CancellationToken::new(), master.to_owned());
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

impl<F, Fut, E> ContextDsnProvider for ContextProviderFn<F>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn fetch_dsn_with_context<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        master: &'a str,
    ) -> BoxFuture<'a, Result<String, BoxError>> {
        let fut = (self.0)(cancel.clone(), master.to_owned());
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

impl<F, Fut, E> From<ContextProviderFn<F>> for Resolver
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn from(provider: ContextProviderFn<F>) -> Self {
        Resolver::context_aware(provider)
    }
}

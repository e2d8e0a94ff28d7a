//! Rotating credentials behind a connector-capable driver.
//!
//! The "secret store" hands out a new password every third lookup. Run with
//! `RUST_LOG=lazydsn=trace` to watch the inner connector being rebuilt only
//! when the password actually changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazydsn::driver::{Connector, ConnectorFactory, Driver, LazyDriver, SharedConnector};
use lazydsn::resolver::context_provider_fn;
use lazydsn::{BoxError, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Stand-in for a real database driver: a "connection" is just the DSN it was made from.
struct EchoDriver;

impl Driver for EchoDriver {
    type Connection = String;

    fn open<'a>(&'a self, dsn: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(async move { Ok(dsn.to_owned()) })
    }

    fn connector_factory(&self) -> Option<&dyn ConnectorFactory<Connection = String>> {
        Some(self)
    }
}

impl ConnectorFactory for EchoDriver {
    type Connection = String;

    fn open_connector<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, Result<SharedConnector<String>, BoxError>> {
        println!("  (parsing DSN and building connector)");
        let connector: SharedConnector<String> = Arc::new(EchoConnector(dsn.to_owned()));
        Box::pin(async move { Ok(connector) })
    }
}

struct EchoConnector(String);

impl Connector for EchoConnector {
    type Connection = String;

    fn connect<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let lookups = Arc::new(AtomicUsize::new(0));
    let resolver = context_provider_fn(move |_cancel: CancellationToken, master: String| {
        let lookups = Arc::clone(&lookups);
        async move {
            let generation = lookups.fetch_add(1, Ordering::Relaxed) / 3;
            Ok::<_, BoxError>(format!("postgres://app:password-{generation}@db/{master}"))
        }
    });

    let driver = LazyDriver::new(EchoDriver, resolver);
    let connector = driver.open_connector("orders").await?;

    for attempt in 1..=7 {
        let conn = connector.connect(&CancellationToken::new()).await?;
        println!("connection {attempt}: {conn}");
    }

    Ok(())
}

//! In-memory inner drivers and resolvers shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::BoxFuture;
use crate::driver::{Connector, ConnectorFactory, Driver, SharedConnector};
use crate::error::BoxError;
use crate::resolver::{ContextDsnProvider, DsnProvider, Resolver};

/// A "physical connection": remembers which DSN and which inner connector made it.
#[derive(Debug, Clone)]
pub struct MockConnection {
    pub dsn: String,
    /// 0 for direct opens, otherwise the 1-based build number of the connector.
    pub factory_id: usize,
    pub token_cancelled: bool,
}

#[derive(Default)]
struct DriverState {
    opened: Vec<String>,
    built: Vec<String>,
    build_attempts: usize,
    failing_builds: usize,
    build_error: String,
    build_delay: Option<Duration>,
    open_error: Option<String>,
    connect_error: Option<String>,
    connects: usize,
    last_token: Option<CancellationToken>,
}

/// Inner driver double. Clones share state.
#[derive(Clone)]
pub struct MockDriver {
    factory: bool,
    state: Arc<Mutex<DriverState>>,
}

impl MockDriver {
    pub fn with_factory() -> Self {
        Self {
            factory: true,
            state: Arc::default(),
        }
    }

    pub fn direct_only() -> Self {
        Self {
            factory: false,
            state: Arc::default(),
        }
    }

    pub fn fail_builds(&self, count: usize, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_builds = count;
        state.build_error = message.to_owned();
    }

    pub fn fail_open(&self, message: &str) {
        self.state.lock().unwrap().open_error = Some(message.to_owned());
    }

    pub fn fail_connects(&self, message: &str) {
        self.state.lock().unwrap().connect_error = Some(message.to_owned());
    }

    pub fn set_build_delay(&self, delay: Duration) {
        self.state.lock().unwrap().build_delay = Some(delay);
    }

    pub fn opened_dsns(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn built_dsns(&self) -> Vec<String> {
        self.state.lock().unwrap().built.clone()
    }

    pub fn build_attempts(&self) -> usize {
        self.state.lock().unwrap().build_attempts
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn last_token(&self) -> Option<CancellationToken> {
        self.state.lock().unwrap().last_token.clone()
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn open<'a>(&'a self, dsn: &'a str) -> BoxFuture<'a, Result<MockConnection, BoxError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = &state.open_error {
                return Err(message.clone().into());
            }
            state.opened.push(dsn.to_owned());
            Ok(MockConnection {
                dsn: dsn.to_owned(),
                factory_id: 0,
                token_cancelled: false,
            })
        })
    }

    fn connector_factory(&self) -> Option<&dyn ConnectorFactory<Connection = MockConnection>> {
        if self.factory { Some(self) } else { None }
    }
}

impl ConnectorFactory for MockDriver {
    type Connection = MockConnection;

    fn open_connector<'a>(
        &'a self,
        dsn: &'a str,
    ) -> BoxFuture<'a, Result<SharedConnector<MockConnection>, BoxError>> {
        Box::pin(async move {
            let delay = self.state.lock().unwrap().build_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            state.build_attempts += 1;
            if state.failing_builds > 0 {
                state.failing_builds -= 1;
                return Err(state.build_error.clone().into());
            }
            state.built.push(dsn.to_owned());
            Ok(Arc::new(MockConnector {
                dsn: dsn.to_owned(),
                id: state.built.len(),
                state: Arc::clone(&self.state),
            }) as SharedConnector<MockConnection>)
        })
    }
}

struct MockConnector {
    dsn: String,
    id: usize,
    state: Arc<Mutex<DriverState>>,
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<MockConnection, BoxError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.last_token = Some(cancel.clone());
            if let Some(message) = &state.connect_error {
                return Err(message.clone().into());
            }
            state.connects += 1;
            Ok(MockConnection {
                dsn: self.dsn.clone(),
                factory_id: self.id,
                token_cancelled: cancel.is_cancelled(),
            })
        })
    }
}

struct ResolverState {
    values: Vec<String>,
    served: AtomicUsize,
    calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    masters: Mutex<Vec<String>>,
}

/// Resolver that walks through a fixed list of DSNs, repeating the last one.
/// Clones share state.
#[derive(Clone)]
pub struct SequenceResolver(Arc<ResolverState>);

impl SequenceResolver {
    pub fn new<const N: usize>(values: [&str; N]) -> Self {
        Self(Arc::new(ResolverState {
            values: values.iter().map(|v| v.to_string()).collect(),
            served: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            delay: Mutex::new(None),
            masters: Mutex::new(Vec::new()),
        }))
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.0.delay.lock().unwrap() = Some(delay);
    }

    /// The next call fails with `message` without advancing the sequence.
    pub fn fail_next(&self, message: &str) {
        *self.0.fail_next.lock().unwrap() = Some(message.to_owned());
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn masters(&self) -> Vec<String> {
        self.0.masters.lock().unwrap().clone()
    }
}

impl DsnProvider for SequenceResolver {
    fn fetch_dsn<'a>(&'a self, master: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(async move {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            self.0.masters.lock().unwrap().push(master.to_owned());

            let delay = *self.0.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self.0.fail_next.lock().unwrap().take();
            if let Some(message) = failure {
                return Err(message.into());
            }

            let n = self.0.served.fetch_add(1, Ordering::SeqCst);
            let last = self.0.values.len() - 1;
            Ok(self.0.values[n.min(last)].clone())
        })
    }
}

impl ContextDsnProvider for SequenceResolver {
    fn fetch_dsn_with_context<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        master: &'a str,
    ) -> BoxFuture<'a, Result<String, BoxError>> {
        self.fetch_dsn(master)
    }
}

impl From<SequenceResolver> for Resolver {
    fn from(resolver: SequenceResolver) -> Self {
        Resolver::context_aware(resolver)
    }
}

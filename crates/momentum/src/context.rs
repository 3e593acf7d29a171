use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::time::FutureExt;
use tracing::Instrument as _;

use crate::config::Config;
use crate::database::{Database, DatabaseConnectionOptions, EstablishDatabaseConnectionError};
use crate::ranks::RanksDaemonHandle;

mod inner {
    use super::*;

    #[derive(Debug)]
    pub(super) struct Context {
        pub(super) config: Config,
        pub(super) database: Database,
        pub(super) shutdown_token: CancellationToken,
        pub(super) tasks: TaskTracker,
        pub(super) ranks_daemon: RanksDaemonHandle,
    }
}

/// The engine's global state.
#[derive(Clone)]
pub struct Context(Arc<inner::Context>);

#[derive(Debug, Display, Error, From)]
pub enum InitializeContextError {
    #[display("{_0}")]
    EstablishDatabaseConnection(EstablishDatabaseConnectionError),
}

impl Context {
    /// Initializes a new [`Context`].
    pub async fn new(config: Config) -> Result<Self, InitializeContextError> {
        Self::with_shutdown_token(config, CancellationToken::new()).await
    }

    /// Initializes a new [`Context`] with the given cancellation token.
    ///
    /// The token will be cancelled by [`Context::cleanup()`] and is given to tasks spawned by the
    /// returned [`Context`].
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub async fn with_shutdown_token(
        config: Config,
        shutdown_token: CancellationToken,
    ) -> Result<Self, InitializeContextError> {
        let database = Database::connect(DatabaseConnectionOptions {
            url: &config.database.url,
            min_connections: config.database.min_connections,
            max_connections: config.database.max_connections,
            acquire_timeout: config.database.acquire_timeout,
        })
        .await?;

        Ok(Self(Arc::new(inner::Context {
            config,
            database,
            shutdown_token,
            tasks: TaskTracker::new(),
            ranks_daemon: RanksDaemonHandle::new(),
        })))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn database(&self) -> &Database {
        &self.0.database
    }

    pub fn ranks_daemon(&self) -> &RanksDaemonHandle {
        &self.0.ranks_daemon
    }

    /// Tracks the future produced by `make_future` and spawns it as a tokio task.
    ///
    /// `make_future` is given a [`CancellationToken`] the produced future can use to detect when
    /// the process is shutting down. When this happens, all tracked futures will be given some
    /// amount of time to perform cleanup.
    pub fn spawn<F, Fut>(&self, name: &'static str, make_future: F) -> task::JoinHandle<Fut::Output>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let cancellation_token = self.0.shutdown_token.child_token();
        let task = self.0.tasks.track_future(make_future(cancellation_token));

        task::spawn(task.instrument(info_span!("task", name)))
    }

    /// Initiates cleanup.
    ///
    /// All tasks spawned by this [`Context`] will be notified and are given a few seconds to
    /// exit. Open database connections are closed gracefully.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn cleanup(self) {
        if !self.0.tasks.is_empty() {
            self.shutdown_tasks(Duration::from_secs(10)).await;
        }

        self.close_database(Duration::from_secs(5)).await;
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn shutdown_tasks(&self, timeout: Duration) {
        self.0.tasks.close();
        self.0.shutdown_token.cancel();

        if let Err(_) = self.0.tasks.wait().timeout(timeout).await {
            warn!(?timeout, "tasks did not shutdown within timeout");
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn close_database(&self, timeout: Duration) {
        if let Err(_) = self.database().cleanup().timeout(timeout).await {
            warn!(?timeout, "failed to cleanup database connections within timeout");
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        <inner::Context as fmt::Debug>::fmt(&*self.0, fmt)
    }
}

//! Global ranks.
//!
//! A pass loads every ranked leaderboard, turns placements into [XP](xp), folds them into
//! per-mode totals and dense ranks ([`aggregate`]) and [publishes](publish) the result.
//! [`daemon`] repeats this on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{self, JoinError};
use tokio::time::Instant;
use tokio_util::time::FutureExt as _;

use crate::Gamemode;
use crate::cache::{Generation, SnapshotStore};
use crate::config::RanksConfig;
use crate::leaderboards::{LoadRunsError, RunSource};

pub mod xp;
pub use xp::{RankXpParams, Xp, XpCurve};

pub mod aggregate;
pub use aggregate::{AggregateStats, UserRanks, UserScores};

pub mod publish;
pub use publish::{PublishError, PublishOptions};

pub mod daemon;
pub use daemon::RanksDaemonHandle;

/// Runs passes against one source and one store.
pub struct RankEngine<S, T> {
    source: S,
    store: T,
    curve: Arc<dyn XpCurve>,
    options: PassOptions,

    /// Held for the duration of a pass.
    running: Mutex<()>,
}

#[derive(Debug, Clone)]
pub struct PassOptions {
    pub load_timeout: Duration,
    pub publish_timeout: Duration,
    pub excluded_gamemodes: Vec<Gamemode>,
    pub publish: PublishOptions,
}

impl From<&RanksConfig> for PassOptions {
    fn from(config: &RanksConfig) -> Self {
        Self {
            load_timeout: config.load_timeout,
            publish_timeout: config.publish_timeout,
            excluded_gamemodes: config.excluded_gamemodes.clone(),
            publish: PublishOptions::from(config),
        }
    }
}

/// The outcome of a successful pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub stats: AggregateStats,
    pub generation: Generation,
    pub previous: Option<Generation>,
    pub entries: usize,
    pub load_time: Duration,
    pub aggregate_time: Duration,
    pub publish_time: Duration,
}

#[derive(Debug, Display, Error, From)]
pub enum PassError {
    #[display("another pass is still running")]
    AlreadyRunning,

    #[display("{_0}")]
    #[from]
    LoadRuns(LoadRunsError),

    #[display("loading runs timed out after {after:?}")]
    LoadTimedOut { after: Duration },

    #[display("aggregation task failed: {_0}")]
    #[from]
    Aggregate(JoinError),

    #[display("{_0}")]
    #[from]
    Publish(PublishError),

    #[display("publishing timed out after {after:?}")]
    PublishTimedOut { after: Duration },
}

impl<S, T> RankEngine<S, T>
where
    S: RunSource,
    T: SnapshotStore,
{
    pub fn new(
        source: S,
        store: T,
        curve: impl XpCurve + 'static,
        options: PassOptions,
    ) -> Self {
        Self {
            source,
            store,
            curve: Arc::new(curve),
            options,
            running: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    /// Whether a pass is in progress right now.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Loads, aggregates and publishes once.
    ///
    /// Fails with [`PassError::AlreadyRunning`] instead of waiting if another pass is in
    /// progress. Any failure leaves the published snapshot as it was.
    #[tracing::instrument(level = "info", skip(self), err(level = "warn"))]
    pub async fn run_pass(&self) -> Result<PassReport, PassError> {
        let Ok(_running) = self.running.try_lock() else {
            return Err(PassError::AlreadyRunning);
        };

        let started = Instant::now();
        let leaderboards = self
            .source
            .load_ranked_primary_runs()
            .timeout(self.options.load_timeout)
            .await
            .map_err(|_| PassError::LoadTimedOut { after: self.options.load_timeout })??;

        let load_time = started.elapsed();
        debug!(leaderboards = leaderboards.len(), ?load_time, "loaded leaderboards");

        let started = Instant::now();
        let curve = Arc::clone(&self.curve);
        let excluded_gamemodes = self.options.excluded_gamemodes.clone();
        let (stats, entries) = task::spawn_blocking(move || {
            let aggregate =
                aggregate::aggregate(&leaderboards, curve.as_ref(), &excluded_gamemodes);
            let entries = publish::snapshot_entries(&aggregate.scores, &aggregate.ranks);

            (aggregate.stats, entries)
        })
        .await?;

        let aggregate_time = started.elapsed();
        debug!(users = stats.users, entries = entries.len(), ?aggregate_time, "aggregated runs");

        let started = Instant::now();
        let published = publish::publish(&self.store, &entries, &self.options.publish)
            .timeout(self.options.publish_timeout)
            .await
            .map_err(|_| PassError::PublishTimedOut { after: self.options.publish_timeout })??;

        let publish_time = started.elapsed();

        info!(
            generation = %published.generation,
            leaderboards = stats.leaderboards,
            runs = stats.runs,
            users = stats.users,
            ?load_time,
            ?aggregate_time,
            ?publish_time,
            "published ranks",
        );

        Ok(PassReport {
            stats,
            generation: published.generation,
            previous: published.previous,
            entries: published.entries,
            load_time,
            aggregate_time,
            publish_time,
        })
    }
}

impl<S, T> std::fmt::Debug for RankEngine<S, T>
where
    S: std::fmt::Debug,
    T: std::fmt::Debug,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RankEngine")
            .field("source", &self.source)
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

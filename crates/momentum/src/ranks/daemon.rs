//! Runs passes on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::{PassError, RankEngine};
use crate::cache::SnapshotStore;
use crate::leaderboards::RunSource;

/// Lets other parts of the system ask for a pass outside of the schedule.
#[derive(Debug, Clone)]
pub struct RanksDaemonHandle {
    notifications: Arc<Notifications>,
}

impl RanksDaemonHandle {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(Notifications { pass_requested: Notify::new() }),
        }
    }

    /// Requests a pass as soon as the current one (if any) is done.
    ///
    /// Requests made while a pass is running are coalesced into one.
    pub fn request_pass(&self) {
        self.notifications.pass_requested.notify_one();
    }
}

#[derive(Debug)]
struct Notifications {
    pass_requested: Notify,
}

/// Runs a pass every `period` until `cancellation_token` is cancelled.
///
/// The first pass starts right away. Ticks that are missed while a pass is running are skipped
/// rather than made up for. Failed passes are logged; the next tick runs as usual.
/// Cancellation takes effect between passes.
#[tracing::instrument(skip_all, fields(period = ?period))]
pub async fn run<S, T>(
    engine: Arc<RankEngine<S, T>>,
    period: Duration,
    handle: RanksDaemonHandle,
    cancellation_token: CancellationToken,
) where
    S: RunSource,
    T: SnapshotStore,
{
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        select! {
            () = cancellation_token.cancelled() => {
                tracing::debug!("cancelled");
                break;
            },

            _ = ticks.tick() => {
                tracing::trace!("scheduled pass");
            },

            () = handle.notifications.pass_requested.notified() => {
                tracing::debug!("received request for a pass");
            },
        };

        match engine.run_pass().await {
            Ok(report) => {
                tracing::trace!(generation = %report.generation, "pass finished");
            },
            Err(PassError::AlreadyRunning) => {
                tracing::debug!("skipping pass; another one is still running");
            },
            Err(error) => {
                tracing::error!(%error, "pass failed");
            },
        }
    }
}

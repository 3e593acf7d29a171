//! Leaderboards and the runs recorded on them.

use std::future::Future;

use crate::Gamemode;
use crate::time::Seconds;
use crate::users::UserId;

mod loader;
pub use loader::LoadRunsError;

define_id_type! {
    /// A unique identifier for maps.
    pub struct MapId(i32);
}

/// How a leaderboard takes part in global ranking.
#[repr(i32)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderboardType {
    Ranked = 0,
    Unranked = 1,
    Hidden = 2,
}

/// The kind of route a leaderboard belongs to.
#[repr(i32)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// The map's main route; the only one used for global ranking.
    Main = 0,
    Stage = 1,
    Bonus = 2,
}

impl LeaderboardType {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TrackType {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// A ranked main-track leaderboard together with every run recorded on it.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    pub map_id: MapId,
    pub mode: Gamemode,
    pub track_num: i32,
    pub style: i32,
    pub runs: Vec<LeaderboardRun>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardRun {
    pub user_id: UserId,
    pub time: Seconds,
}

/// Where the runs for a pass come from.
pub trait RunSource: Send + Sync {
    /// Loads every ranked main-track leaderboard with all of its runs.
    ///
    /// The result is one consistent read; nothing is streamed into the aggregator.
    fn load_ranked_primary_runs(
        &self,
    ) -> impl Future<Output = Result<Vec<Leaderboard>, LoadRunsError>> + Send;
}

//! The store published ranks are served from.
//!
//! Every pass writes a complete snapshot into a fresh [`Generation`]. Readers only ever follow
//! the store's "current" pointer, which is swapped atomically once a generation has been fully
//! written, so they never observe a mix of two passes.

use std::future::Future;
use std::time::Duration;

use ulid::Ulid;

use crate::ranks::xp::Xp;
use crate::users::UserId;
use crate::{Gamemode, ModeMap};

mod memory;
pub use memory::{MemoryStore, SnapshotContents};

mod redis;
pub use self::redis::{ConnectRedisError, RedisStore, RedisStoreOptions};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[display("redis error: {_0}")]
    #[from]
    Redis(::redis::RedisError),

    #[display("cache operation timed out after {after:?}")]
    TimedOut { after: Duration },

    #[display("unexpected value {value:?} at `{key}`")]
    Corrupt { key: String, value: String },
}

/// One published snapshot.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromStr)]
pub struct Generation(Ulid);

impl Generation {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

/// What a user's published entry holds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishedScores {
    /// Total XP per gamemode, `0` where the user has none.
    pub xp: ModeMap<Xp>,

    /// `None` where the user is unranked.
    pub ranks: ModeMap<Option<u32>>,
}

/// A single record of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A user with XP in at least one gamemode.
    Scores { user_id: UserId, scores: PublishedScores },

    /// The occupant of an occupied rank.
    Rank { mode: Gamemode, rank: u32, user_id: UserId },
}

/// A store that serves published snapshots.
///
/// A generation goes through `stage` → `write`* → `commit` → `retire`. Nothing written to a
/// generation is visible to the read methods before it is committed, and committing swaps the
/// current generation atomically. A generation that is about to be replaced is marked as retiring
/// first, so it can still be found if its retirement never happens.
pub trait SnapshotStore: Send + Sync {
    /// Registers a new generation as in progress.
    fn stage(&self, generation: Generation) -> impl Future<Output = Result<()>> + Send;

    /// Writes `entries` into a staged generation.
    fn write(
        &self,
        generation: Generation,
        entries: Vec<Entry>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Records that `generation` is about to be replaced.
    fn mark_retiring(&self, generation: Generation) -> impl Future<Output = Result<()>> + Send;

    /// Makes `generation` the current one.
    ///
    /// Returns the generation that was current before.
    fn commit(
        &self,
        generation: Generation,
    ) -> impl Future<Output = Result<Option<Generation>>> + Send;

    /// Removes everything written for `generation` and forgets it was staged or retiring.
    ///
    /// Stores may keep the data readable for a grace period.
    fn retire(&self, generation: Generation) -> impl Future<Output = Result<()>> + Send;

    /// Generations that were staged but neither committed nor retired.
    fn staged(&self) -> impl Future<Output = Result<Vec<Generation>>> + Send;

    /// Generations marked as retiring that have not been retired yet.
    ///
    /// This may include the current generation if the commit that was meant to replace it never
    /// went through.
    fn retiring(&self) -> impl Future<Output = Result<Vec<Generation>>> + Send;

    fn current(&self) -> impl Future<Output = Result<Option<Generation>>> + Send;

    /// Reads a user's entry from the current generation.
    fn user_scores(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<PublishedScores>>> + Send;

    /// Reads who occupies `rank` in `mode` in the current generation.
    fn rank_occupant(
        &self,
        mode: Gamemode,
        rank: u32,
    ) -> impl Future<Output = Result<Option<UserId>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_roundtrip_through_strings() {
        let generation = Generation::new();
        let parsed = generation.to_string().parse::<Generation>().unwrap();

        assert_eq!(parsed, generation);
        assert!("not-a-ulid".parse::<Generation>().is_err());
    }

    #[test]
    fn later_generations_sort_after_earlier_ones() {
        let first = Generation::new();
        std::thread::sleep(Duration::from_millis(2));
        let second = Generation::new();

        assert!(first < second);
    }
}

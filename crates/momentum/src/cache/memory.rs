use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Entry, Error, Generation, PublishedScores, Result, SnapshotStore};
use crate::Gamemode;
use crate::users::UserId;

/// A [`SnapshotStore`] that lives in process memory.
///
/// Used for dry runs and tests. Retired generations are dropped immediately.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

/// Everything a generation holds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotContents {
    pub users: BTreeMap<UserId, PublishedScores>,
    pub ranks: BTreeMap<(Gamemode, u32), UserId>,
}

#[derive(Debug, Default)]
struct State {
    current: Option<Generation>,
    staging: BTreeSet<Generation>,
    retiring: BTreeSet<Generation>,
    generations: HashMap<Generation, SnapshotContents>,

    /// Number of entries that may still be written before writes start failing.
    write_budget: Option<usize>,

    /// Number of upcoming `retire` calls that fail without touching anything.
    failing_retires: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail once `entries` more entries have been written.
    ///
    /// A write that exhausts the budget applies the entries that still fit and then fails, like a
    /// connection that drops halfway through a pipeline.
    pub fn fail_writes_after(&self, entries: usize) {
        self.lock().write_budget = Some(entries);
    }

    /// Makes the next `count` retirements fail.
    pub fn fail_retires(&self, count: usize) {
        self.lock().failing_retires = count;
    }

    pub fn stop_failing(&self) {
        let mut state = self.lock();
        state.write_budget = None;
        state.failing_retires = 0;
    }

    /// The contents of the current generation.
    pub fn current_contents(&self) -> Option<SnapshotContents> {
        let state = self.lock();
        state
            .current
            .and_then(|current| state.generations.get(&current))
            .cloned()
    }

    /// Number of generations still held, current one included.
    pub fn generation_count(&self) -> usize {
        self.lock().generations.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected_failure(what: &'static str) -> Error {
    Error::Redis(io::Error::new(io::ErrorKind::ConnectionReset, what).into())
}

impl SnapshotStore for MemoryStore {
    async fn stage(&self, generation: Generation) -> Result<()> {
        let mut state = self.lock();
        state.staging.insert(generation);
        state.generations.entry(generation).or_default();
        Ok(())
    }

    async fn write(&self, generation: Generation, entries: Vec<Entry>) -> Result<()> {
        let mut state = self.lock();
        let State { generations, write_budget, .. } = &mut *state;
        let contents = generations.entry(generation).or_default();

        for entry in entries {
            if let Some(budget) = write_budget {
                if *budget == 0 {
                    return Err(injected_failure("injected write failure"));
                }

                *budget -= 1;
            }

            match entry {
                Entry::Scores { user_id, scores } => {
                    contents.users.insert(user_id, scores);
                },
                Entry::Rank { mode, rank, user_id } => {
                    contents.ranks.insert((mode, rank), user_id);
                },
            }
        }

        Ok(())
    }

    async fn commit(&self, generation: Generation) -> Result<Option<Generation>> {
        let mut state = self.lock();
        state.staging.remove(&generation);
        Ok(state.current.replace(generation))
    }

    async fn mark_retiring(&self, generation: Generation) -> Result<()> {
        self.lock().retiring.insert(generation);
        Ok(())
    }

    async fn retire(&self, generation: Generation) -> Result<()> {
        let mut state = self.lock();

        if state.failing_retires > 0 {
            state.failing_retires -= 1;
            return Err(injected_failure("injected retire failure"));
        }

        state.staging.remove(&generation);
        state.retiring.remove(&generation);
        state.generations.remove(&generation);
        Ok(())
    }

    async fn staged(&self) -> Result<Vec<Generation>> {
        Ok(self.lock().staging.iter().copied().collect())
    }

    async fn retiring(&self) -> Result<Vec<Generation>> {
        Ok(self.lock().retiring.iter().copied().collect())
    }

    async fn current(&self) -> Result<Option<Generation>> {
        Ok(self.lock().current)
    }

    async fn user_scores(&self, user_id: UserId) -> Result<Option<PublishedScores>> {
        let state = self.lock();

        Ok(state
            .current
            .and_then(|current| state.generations.get(&current))
            .and_then(|contents| contents.users.get(&user_id))
            .copied())
    }

    async fn rank_occupant(&self, mode: Gamemode, rank: u32) -> Result<Option<UserId>> {
        let state = self.lock();

        Ok(state
            .current
            .and_then(|current| state.generations.get(&current))
            .and_then(|contents| contents.ranks.get(&(mode, rank)))
            .copied())
    }
}

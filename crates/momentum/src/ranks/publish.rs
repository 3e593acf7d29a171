//! Replacing the published snapshot.

use std::collections::BTreeSet;
use std::num::NonZero;

use futures_util::StreamExt as _;
use futures_util::stream::FuturesUnordered;

use crate::ModeMap;
use crate::cache::{self, Entry, Generation, PublishedScores, SnapshotStore};
use crate::config::RanksConfig;
use crate::ranks::aggregate::{UserRanks, UserScores};

#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Entries per [`SnapshotStore::write()`] call.
    pub batch_size: NonZero<usize>,

    /// Number of writes in flight at once.
    pub concurrency: NonZero<usize>,
}

impl From<&RanksConfig> for PublishOptions {
    fn from(config: &RanksConfig) -> Self {
        Self { batch_size: config.batch_size, concurrency: config.concurrency }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    #[display("stage")]
    Stage,

    #[display("write")]
    Write,

    #[display("commit")]
    Commit,
}

#[derive(Debug, Display, Error)]
#[display("failed to {step} generation {generation}: {source}")]
pub struct PublishError {
    pub step: PublishStep,
    pub generation: Generation,
    pub source: cache::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub generation: Generation,

    /// The generation that was replaced.
    pub previous: Option<Generation>,
    pub entries: usize,
}

/// Turns a pass's results into snapshot entries.
///
/// Users come first, ordered by ID, followed by every occupied rank.
pub fn snapshot_entries(scores: &UserScores, ranks: &UserRanks) -> Vec<Entry> {
    let users = scores.by_user().into_iter().map(|(user_id, xp)| Entry::Scores {
        user_id,
        scores: PublishedScores {
            xp,
            ranks: ModeMap::from_fn(|mode| ranks.rank_of(user_id, mode)),
        },
    });

    let occupants = ranks
        .iter()
        .map(|(mode, rank, user_id)| Entry::Rank { mode, rank, user_id });

    users.chain(occupants).collect()
}

/// Publishes `entries` as the new snapshot.
///
/// The entries are written into a fresh generation which replaces the current one only after
/// every write succeeded. If anything fails before that, the current snapshot stays in place.
#[tracing::instrument(level = "debug", skip_all, fields(entries = entries.len()), err(level = "debug"))]
pub async fn publish<S>(
    store: &S,
    entries: &[Entry],
    options: &PublishOptions,
) -> Result<Published, PublishError>
where
    S: SnapshotStore,
{
    sweep(store).await;

    let generation = Generation::new();
    let fail = |step| move |source| PublishError { step, generation, source };

    store
        .stage(generation)
        .await
        .map_err(fail(PublishStep::Stage))?;

    trace!(%generation, "staged generation");

    if let Err(source) = write_batches(store, generation, entries, options).await {
        discard(store, generation).await;
        return Err(fail(PublishStep::Write)(source));
    }

    // the generation being replaced is marked before the swap, so it is still found if it never
    // gets retired below
    let replacing = match mark_current_retiring(store).await {
        Ok(replacing) => replacing,
        Err(source) => {
            discard(store, generation).await;
            return Err(fail(PublishStep::Commit)(source));
        },
    };

    // A failed commit may still have been applied, so the generation is left alone; if it is
    // still staged, the next pass sweeps it.
    let previous = store
        .commit(generation)
        .await
        .map_err(fail(PublishStep::Commit))?;

    if let Some(previous) = previous.filter(|&previous| previous != generation) {
        if replacing != Some(previous) {
            if let Err(error) = store.mark_retiring(previous).await {
                warn!(%error, %previous, "failed to mark previous generation as retiring");
            }
        }

        if let Err(error) = store.retire(previous).await {
            warn!(%error, %previous, "failed to retire previous generation; next pass retries");
        }
    }

    Ok(Published { generation, previous, entries: entries.len() })
}

/// Writes `entries` in batches, keeping up to `options.concurrency` writes in flight.
async fn write_batches<S>(
    store: &S,
    generation: Generation,
    entries: &[Entry],
    options: &PublishOptions,
) -> cache::Result<()>
where
    S: SnapshotStore,
{
    let mut batches = entries.chunks(options.batch_size.get());
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < options.concurrency.get() {
            let Some(batch) = batches.next() else {
                break;
            };

            in_flight.push(store.write(generation, batch.to_vec()));
        }

        match in_flight.next().await {
            Some(result) => result?,
            None => return Ok(()),
        }
    }
}

async fn mark_current_retiring<S>(store: &S) -> cache::Result<Option<Generation>>
where
    S: SnapshotStore,
{
    let current = store.current().await?;

    if let Some(current) = current {
        store.mark_retiring(current).await?;
    }

    Ok(current)
}

/// Retires generations left behind by earlier passes.
///
/// That is every staged generation that was never committed, and every replaced generation whose
/// retirement failed. The current generation is never touched.
async fn sweep<S>(store: &S)
where
    S: SnapshotStore,
{
    let current = match store.current().await {
        Ok(current) => current,
        Err(error) => {
            warn!(%error, "failed to read current generation; skipping sweep");
            return;
        },
    };

    let mut leftovers = BTreeSet::new();

    match store.staged().await {
        Ok(staged) => leftovers.extend(staged),
        Err(error) => warn!(%error, "failed to list staged generations"),
    }

    match store.retiring().await {
        Ok(retiring) => leftovers.extend(retiring),
        Err(error) => warn!(%error, "failed to list retiring generations"),
    }

    for generation in leftovers {
        if Some(generation) == current {
            continue;
        }

        info!(%generation, "retiring leftover generation");
        discard(store, generation).await;
    }
}

async fn discard<S>(store: &S, generation: Generation)
where
    S: SnapshotStore,
{
    if let Err(error) = store.retire(generation).await {
        warn!(%error, %generation, "failed to discard generation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gamemode;
    use crate::cache::MemoryStore;
    use crate::users::UserId;

    fn options(batch_size: usize) -> PublishOptions {
        PublishOptions {
            batch_size: NonZero::new(batch_size).unwrap(),
            concurrency: NonZero::new(4).unwrap(),
        }
    }

    fn user(id: i32) -> UserId {
        UserId::from_inner(id)
    }

    fn sample() -> (UserScores, UserRanks) {
        let mut scores = UserScores::new();
        scores.add(user(1), Gamemode::Surf, 100);
        scores.add(user(2), Gamemode::Surf, 40);
        scores.add(user(2), Gamemode::Bhop, 7);

        let ranks = scores.rank();
        (scores, ranks)
    }

    #[test]
    fn entries_cover_users_and_ranks() {
        let (scores, ranks) = sample();
        let entries = snapshot_entries(&scores, &ranks);

        assert_eq!(entries.len(), 2 + 3);

        let Entry::Scores { user_id, scores } = entries[1] else {
            panic!("users come first");
        };

        assert_eq!(user_id, user(2));
        assert_eq!(scores.xp[Gamemode::Surf], 40);
        assert_eq!(scores.xp[Gamemode::Bhop], 7);
        assert_eq!(scores.ranks[Gamemode::Surf], Some(2));
        assert_eq!(scores.ranks[Gamemode::Bhop], Some(1));
        assert_eq!(scores.ranks[Gamemode::Conc], None);

        assert!(entries.contains(&Entry::Rank { mode: Gamemode::Bhop, rank: 1, user_id: user(2) }));
    }

    #[tokio::test]
    async fn replaces_the_previous_generation() {
        let store = MemoryStore::new();
        let (scores, ranks) = sample();
        let entries = snapshot_entries(&scores, &ranks);

        let first = publish(&store, &entries, &options(2)).await.unwrap();
        let second = publish(&store, &entries, &options(2)).await.unwrap();

        assert_eq!(first.previous, None);
        assert_eq!(second.previous, Some(first.generation));
        assert_eq!(store.current().await.unwrap(), Some(second.generation));
        assert_eq!(store.generation_count(), 1, "previous generation was retired");
    }

    #[tokio::test]
    async fn failed_writes_keep_the_current_snapshot() {
        let store = MemoryStore::new();
        let (scores, ranks) = sample();
        let entries = snapshot_entries(&scores, &ranks);

        let published = publish(&store, &entries, &options(1)).await.unwrap();
        let before = store.current_contents();

        store.fail_writes_after(2);

        let error = publish(&store, &entries, &options(1)).await.unwrap_err();

        assert_eq!(error.step, PublishStep::Write);
        assert_eq!(store.current().await.unwrap(), Some(published.generation));
        assert_eq!(store.current_contents(), before);
        assert!(store.staged().await.unwrap().is_empty(), "failed generation was discarded");
        assert_eq!(store.generation_count(), 1);
    }

    #[tokio::test]
    async fn sweeps_abandoned_generations() {
        let store = MemoryStore::new();
        let abandoned = Generation::new();

        store.stage(abandoned).await.unwrap();

        let published = publish(&store, &[], &options(10)).await.unwrap();

        assert_eq!(published.entries, 0);
        assert!(store.staged().await.unwrap().is_empty());
        assert_eq!(store.generation_count(), 1);
    }

    #[tokio::test]
    async fn failed_retirements_are_retried() {
        let store = MemoryStore::new();
        let (scores, ranks) = sample();
        let entries = snapshot_entries(&scores, &ranks);

        let first = publish(&store, &entries, &options(2)).await.unwrap();

        store.fail_retires(1);

        let second = publish(&store, &entries, &options(2)).await.unwrap();

        assert_eq!(second.previous, Some(first.generation));
        assert_eq!(store.generation_count(), 2, "retirement failed");
        assert_eq!(store.retiring().await.unwrap(), [first.generation]);

        for _ in 0..5 {
            publish(&store, &entries, &options(2)).await.unwrap();
        }

        assert_eq!(store.generation_count(), 1);
        assert!(store.retiring().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweeps_never_touch_the_current_generation() {
        let store = MemoryStore::new();
        let (scores, ranks) = sample();
        let entries = snapshot_entries(&scores, &ranks);

        let published = publish(&store, &entries, &options(2)).await.unwrap();

        // left over by a commit that never went through
        store.mark_retiring(published.generation).await.unwrap();

        sweep(&store).await;

        assert_eq!(store.current().await.unwrap(), Some(published.generation));
        assert_eq!(store.generation_count(), 1);
        assert!(store.current_contents().is_some());
    }

    #[tokio::test]
    async fn writes_every_batch() {
        let store = MemoryStore::new();
        let entries = (1..=7)
            .map(|id| Entry::Scores { user_id: user(id), scores: PublishedScores::default() })
            .collect::<Vec<_>>();

        let published = publish(&store, &entries, &options(3)).await.unwrap();

        assert_eq!(published.entries, 7);
        assert_eq!(store.current_contents().unwrap().users.len(), 7);
    }
}

//! Full passes against the in-memory store.

use std::num::NonZero;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use momentum::Gamemode;
use momentum::cache::{MemoryStore, SnapshotStore};
use momentum::database;
use momentum::leaderboards::{Leaderboard, LeaderboardRun, LoadRunsError, MapId, RunSource};
use momentum::ranks::{PassError, PassOptions, PublishOptions, RankEngine, RankXpParams, Xp, XpCurve};
use momentum::time::Seconds;
use momentum::users::UserId;

#[derive(Default)]
struct FakeSource {
    leaderboards: Mutex<Vec<Leaderboard>>,
    unreachable: AtomicBool,
}

impl FakeSource {
    fn new(leaderboards: Vec<Leaderboard>) -> Self {
        Self { leaderboards: Mutex::new(leaderboards), ..Default::default() }
    }

    fn replace(&self, leaderboards: Vec<Leaderboard>) {
        *self.leaderboards.lock().unwrap() = leaderboards;
    }
}

impl RunSource for FakeSource {
    async fn load_ranked_primary_runs(&self) -> Result<Vec<Leaderboard>, LoadRunsError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(database::Error::from(sqlx::Error::PoolTimedOut).into());
        }

        Ok(self.leaderboards.lock().unwrap().clone())
    }
}

/// 100 / 40 / 10 for the first three placements, nothing after.
struct Table;

impl XpCurve for Table {
    fn xp_for_rank(&self, rank: u32, total: u32) -> Xp {
        match rank {
            _ if rank > total => 0,
            1 => 100,
            2 => 40,
            3 => 10,
            _ => 0,
        }
    }
}

fn user(id: i32) -> UserId {
    UserId::from_inner(id)
}

fn leaderboard(map: i32, mode: Gamemode, runs: &[(i32, f64)]) -> Leaderboard {
    Leaderboard {
        map_id: MapId::from_inner(map),
        mode,
        track_num: 0,
        style: 0,
        runs: runs
            .iter()
            .map(|&(user_id, secs)| LeaderboardRun {
                user_id: user(user_id),
                time: Seconds(Duration::from_secs_f64(secs)),
            })
            .collect(),
    }
}

fn options() -> PassOptions {
    PassOptions {
        load_timeout: Duration::from_secs(10),
        publish_timeout: Duration::from_secs(10),
        excluded_gamemodes: Vec::new(),
        publish: PublishOptions {
            batch_size: NonZero::new(1).unwrap(),
            concurrency: NonZero::new(3).unwrap(),
        },
    }
}

fn engine(
    leaderboards: Vec<Leaderboard>,
    curve: impl XpCurve + 'static,
) -> Arc<RankEngine<FakeSource, MemoryStore>> {
    Arc::new(RankEngine::new(FakeSource::new(leaderboards), MemoryStore::new(), curve, options()))
}

/// Ten users on one leaderboard each of surf and bhop, fastest first by ID.
fn ten_users() -> Vec<Leaderboard> {
    let runs = (1..=10).map(|id| (id, f64::from(id))).collect::<Vec<_>>();
    vec![leaderboard(1, Gamemode::Surf, &runs), leaderboard(1, Gamemode::Bhop, &runs)]
}

#[tokio::test]
async fn publishes_the_surf_scenario() {
    let engine = engine(vec![leaderboard(1, Gamemode::Surf, &[(1, 10.0), (2, 12.5), (3, 12.5)])], Table);
    let store = engine.store();

    engine.run_pass().await.unwrap();

    for (id, xp, rank) in [(1, 100, 1), (2, 40, 2), (3, 10, 3)] {
        let scores = store.user_scores(user(id)).await.unwrap().unwrap();

        assert_eq!(scores.xp[Gamemode::Surf], xp);
        assert_eq!(scores.ranks[Gamemode::Surf], Some(rank));
        assert_eq!(scores.xp[Gamemode::Bhop], 0);
        assert_eq!(scores.ranks[Gamemode::Bhop], None);
        assert_eq!(store.rank_occupant(Gamemode::Surf, rank).await.unwrap(), Some(user(id)));
    }

    assert_eq!(store.rank_occupant(Gamemode::Surf, 4).await.unwrap(), None);
}

#[tokio::test]
async fn back_to_back_passes_publish_the_same_snapshot() {
    let engine = engine(ten_users(), RankXpParams::default());

    let first = engine.run_pass().await.unwrap();
    let first_contents = engine.store().current_contents().unwrap();

    let second = engine.run_pass().await.unwrap();
    let second_contents = engine.store().current_contents().unwrap();

    assert_ne!(first.generation, second.generation);
    assert_eq!(second.previous, Some(first.generation));
    assert_eq!(first_contents, second_contents);
    assert_eq!(engine.store().generation_count(), 1);
}

#[tokio::test]
async fn published_ranks_never_gain_xp_going_down() {
    let leaderboards = (1..=25)
        .flat_map(|map| {
            [Gamemode::Surf, Gamemode::RocketJump].map(|mode| {
                let runs = (1..=40)
                    .filter(|id| (id + map) % 3 != 0)
                    .map(|id| (id, f64::from((id * 7 + map * 13) % 50) + 1.0))
                    .collect::<Vec<_>>();

                leaderboard(map, mode, &runs)
            })
        })
        .collect();

    let engine = engine(leaderboards, RankXpParams::default());
    engine.run_pass().await.unwrap();

    let contents = engine.store().current_contents().unwrap();

    for ((mode, rank), user_id) in &contents.ranks {
        let xp = contents.users[user_id].xp[*mode];
        assert!(xp > 0, "rank {rank} in {mode} is held by a user without XP");
        assert_eq!(contents.users[user_id].ranks[*mode], Some(*rank));

        if let Some(next) = contents.ranks.get(&(*mode, rank + 1)) {
            let next_xp = contents.users[next].xp[*mode];

            assert!(xp >= next_xp, "rank {rank} in {mode} has less XP than rank {}", rank + 1);

            if xp == next_xp {
                assert!(user_id < next, "equal XP is ordered by user ID");
            }
        }
    }
}

#[tokio::test]
async fn interrupted_publish_keeps_the_previous_snapshot() {
    let engine = engine(ten_users(), RankXpParams::default());
    let store = engine.store();

    let published = engine.run_pass().await.unwrap();
    let before = store.current_contents().unwrap();

    // reverse the order of the surf leaderboard
    let runs = (1..=10).map(|id| (id, f64::from(20 - id))).collect::<Vec<_>>();
    engine
        .source()
        .replace(vec![leaderboard(1, Gamemode::Surf, &runs)]);

    store.fail_writes_after(3);

    let error = engine.run_pass().await.unwrap_err();

    assert!(matches!(error, PassError::Publish(_)), "{error}");
    assert_eq!(store.current().await.unwrap(), Some(published.generation));
    assert_eq!(store.current_contents().unwrap(), before);
    assert_eq!(store.rank_occupant(Gamemode::Surf, 1).await.unwrap(), Some(user(1)));

    store.stop_failing();
    engine.run_pass().await.unwrap();

    assert_eq!(store.rank_occupant(Gamemode::Surf, 1).await.unwrap(), Some(user(10)));
    assert_eq!(store.rank_occupant(Gamemode::Bhop, 1).await.unwrap(), None);
    assert!(store.staged().await.unwrap().is_empty());
    assert_eq!(store.generation_count(), 1);
}

#[tokio::test]
async fn unreachable_database_keeps_the_previous_snapshot() {
    let engine = engine(ten_users(), RankXpParams::default());

    let published = engine.run_pass().await.unwrap();

    engine.source().unreachable.store(true, Ordering::SeqCst);

    assert!(matches!(engine.run_pass().await, Err(PassError::LoadRuns(_))));
    assert_eq!(engine.store().current().await.unwrap(), Some(published.generation));
}

#[tokio::test]
async fn users_without_xp_are_not_ranked() {
    let runs = [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)];
    let engine = engine(vec![leaderboard(1, Gamemode::Conc, &runs)], Table);
    let store = engine.store();

    engine.run_pass().await.unwrap();

    assert_eq!(store.user_scores(user(4)).await.unwrap(), None);
    assert_eq!(store.user_scores(user(5)).await.unwrap(), None);
    assert_eq!(store.rank_occupant(Gamemode::Conc, 4).await.unwrap(), None);
    assert!(
        store
            .current_contents()
            .unwrap()
            .ranks
            .values()
            .all(|&user_id| user_id != user(4) && user_id != user(5))
    );
}

#[tokio::test]
async fn sole_finisher_everywhere_ranks_first() {
    let leaderboards = (1..=4)
        .map(|map| leaderboard(map, Gamemode::StickyJump, &[(42, 60.0)]))
        .collect();

    let engine = engine(leaderboards, RankXpParams::default());
    engine.run_pass().await.unwrap();

    assert_eq!(engine.store().rank_occupant(Gamemode::StickyJump, 1).await.unwrap(), Some(user(42)));
    assert_eq!(
        engine
            .store()
            .user_scores(user(42))
            .await
            .unwrap()
            .map(|scores| scores.xp[Gamemode::StickyJump]),
        Some(4 * 4000),
    );
}

#[tokio::test]
async fn dropped_users_leave_no_stale_ranks() {
    let engine = engine(ten_users(), Table);
    let store = engine.store();

    engine.run_pass().await.unwrap();
    assert_eq!(store.rank_occupant(Gamemode::Surf, 3).await.unwrap(), Some(user(3)));

    engine
        .source()
        .replace(vec![leaderboard(1, Gamemode::Surf, &[(7, 5.0)])]);
    engine.run_pass().await.unwrap();

    assert_eq!(store.rank_occupant(Gamemode::Surf, 1).await.unwrap(), Some(user(7)));
    assert_eq!(store.rank_occupant(Gamemode::Surf, 2).await.unwrap(), None);
    assert_eq!(store.rank_occupant(Gamemode::Surf, 3).await.unwrap(), None);
    assert_eq!(store.user_scores(user(3)).await.unwrap(), None);
}

#[tokio::test]
async fn failed_retirements_are_cleaned_up_by_later_passes() {
    let engine = engine(ten_users(), RankXpParams::default());
    let store = engine.store();

    let first = engine.run_pass().await.unwrap();

    store.fail_retires(1);

    let second = engine.run_pass().await.unwrap();

    assert_eq!(second.previous, Some(first.generation));
    assert_eq!(store.current().await.unwrap(), Some(second.generation));
    assert_eq!(store.generation_count(), 2);

    for _ in 0..5 {
        engine.run_pass().await.unwrap();
    }

    assert_eq!(store.generation_count(), 1);
    assert!(store.retiring().await.unwrap().is_empty());
    assert_eq!(store.rank_occupant(Gamemode::Surf, 1).await.unwrap(), Some(user(1)));
}

#[tokio::test]
async fn passes_run_on_spawned_tasks() {
    let engine = engine(ten_users(), RankXpParams::default());

    let report = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_pass().await }
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(engine.store().current().await.unwrap(), Some(report.generation));
}

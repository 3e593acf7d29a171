//! Folding leaderboards into per-mode scores and ranks.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::leaderboards::Leaderboard;
use crate::ranks::xp::{Xp, XpCurve};
use crate::users::UserId;
use crate::{Gamemode, ModeMap};

/// A user's placement on a single leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub user_id: UserId,

    /// 1-based.
    pub rank: u32,
}

/// Orders a leaderboard's runs and hands out placements `1..=N`.
///
/// Faster times place better. Equal times are ordered by user ID, lowest first, and still
/// receive distinct, successive placements.
pub fn place_runs(leaderboard: &Leaderboard) -> Vec<Placement> {
    let mut runs = leaderboard.runs.iter().collect::<Vec<_>>();
    runs.sort_by_key(|run| (run.time, run.user_id));

    runs.into_iter()
        .zip(1..)
        .map(|(run, rank)| Placement { user_id: run.user_id, rank })
        .collect()
}

/// Total XP per user and gamemode.
///
/// Only strictly positive totals are stored.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UserScores {
    scores: BTreeMap<(UserId, Gamemode), Xp>,
}

impl UserScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Awards XP for every placement on `leaderboard`.
    ///
    /// Returns the number of placements.
    pub fn add_leaderboard(&mut self, leaderboard: &Leaderboard, curve: &dyn XpCurve) -> usize {
        let placements = place_runs(leaderboard);
        let total = u32::try_from(placements.len()).unwrap_or(u32::MAX);

        for Placement { user_id, rank } in &placements {
            self.add(*user_id, leaderboard.mode, curve.xp_for_rank(*rank, total));
        }

        placements.len()
    }

    pub fn add(&mut self, user_id: UserId, mode: Gamemode, xp: Xp) {
        if xp == 0 {
            return;
        }

        let total = self.scores.entry((user_id, mode)).or_default();
        *total = total.saturating_add(xp);
    }

    /// A user's total in `mode`; `0` if they have none.
    pub fn get(&self, user_id: UserId, mode: Gamemode) -> Xp {
        self.scores.get(&(user_id, mode)).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, Gamemode, Xp)> + '_ {
        self.scores
            .iter()
            .map(|(&(user_id, mode), &xp)| (user_id, mode, xp))
    }

    /// Every user with XP in at least one gamemode, with their totals in all of them.
    pub fn by_user(&self) -> BTreeMap<UserId, ModeMap<Xp>> {
        self.iter()
            .fold(BTreeMap::new(), |mut users, (user_id, mode, xp)| {
                users.entry(user_id).or_insert_with(ModeMap::default)[mode] = xp;
                users
            })
    }

    /// Derives the dense rank ordering of each gamemode.
    ///
    /// Higher totals rank better; equal totals are ordered by user ID, lowest first.
    pub fn rank(&self) -> UserRanks {
        let mut candidates = ModeMap::<Vec<(Xp, UserId)>>::default();

        for (user_id, mode, xp) in self.iter() {
            candidates[mode].push((xp, user_id));
        }

        let by_mode = ModeMap::from_fn(|mode| {
            let mut users = std::mem::take(&mut candidates[mode]);
            users.sort_unstable_by_key(|&(xp, user_id)| (Reverse(xp), user_id));
            users.into_iter().map(|(_, user_id)| user_id).collect::<Vec<_>>()
        });

        let lookup = by_mode
            .iter()
            .flat_map(|(mode, users)| {
                users
                    .iter()
                    .zip(1..)
                    .map(move |(&user_id, rank)| ((user_id, mode), rank))
            })
            .collect();

        UserRanks { by_mode, lookup }
    }
}

/// Dense per-mode ranks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UserRanks {
    /// `by_mode[mode][n]` holds rank `n + 1`.
    by_mode: ModeMap<Vec<UserId>>,
    lookup: HashMap<(UserId, Gamemode), u32>,
}

impl UserRanks {
    /// `None` means the user is unranked in `mode`.
    pub fn rank_of(&self, user_id: UserId, mode: Gamemode) -> Option<u32> {
        self.lookup.get(&(user_id, mode)).copied()
    }

    pub fn occupant(&self, mode: Gamemode, rank: u32) -> Option<UserId> {
        let idx = usize::try_from(rank.checked_sub(1)?).ok()?;
        self.by_mode[mode].get(idx).copied()
    }

    /// Ranked users of `mode`, best first.
    pub fn ranked(&self, mode: Gamemode) -> &[UserId] {
        &self.by_mode[mode]
    }

    /// Every occupied `(mode, rank)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (Gamemode, u32, UserId)> + '_ {
        self.by_mode.iter().flat_map(|(mode, users)| {
            users
                .iter()
                .zip(1..)
                .map(move |(&user_id, rank)| (mode, rank, user_id))
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregateStats {
    /// Leaderboards that contributed placements.
    pub leaderboards: usize,
    pub runs: usize,

    /// Leaderboards without runs or in an excluded gamemode.
    pub skipped: usize,

    /// Users with XP in at least one gamemode.
    pub users: usize,
    pub ranked: ModeMap<usize>,
}

#[derive(Debug, Default)]
pub struct Aggregate {
    pub scores: UserScores,
    pub ranks: UserRanks,
    pub stats: AggregateStats,
}

/// Runs the whole aggregation over a pass's leaderboards.
pub fn aggregate(
    leaderboards: &[Leaderboard],
    curve: &dyn XpCurve,
    excluded_gamemodes: &[Gamemode],
) -> Aggregate {
    let mut scores = UserScores::new();
    let mut stats = AggregateStats::default();

    for leaderboard in leaderboards {
        if leaderboard.runs.is_empty() || excluded_gamemodes.contains(&leaderboard.mode) {
            stats.skipped += 1;
            continue;
        }

        stats.runs += scores.add_leaderboard(leaderboard, curve);
        stats.leaderboards += 1;
    }

    let ranks = scores.rank();

    stats.users = scores.by_user().len();
    stats.ranked = ModeMap::from_fn(|mode| ranks.ranked(mode).len());

    Aggregate { scores, ranks, stats }
}

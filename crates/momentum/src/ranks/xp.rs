//! The curve that turns leaderboard placements into XP.

use serde::Deserialize;

/// An amount of rank XP.
pub type Xp = u64;

/// Maps a placement on a leaderboard with `total` finishers to an XP award.
///
/// Implementations must be pure: the same inputs always produce the same award. Placements
/// outside of `1..=total` award nothing.
pub trait XpCurve: Send + Sync {
    fn xp_for_rank(&self, rank: u32, total: u32) -> Xp;
}

/// Parameters of the platform's rank XP curve.
///
/// A placement earns `formula + top10 + group`:
///
/// - `formula` decays with the placement and is awarded to everyone
/// - `top10` is a share of the world record points for the first few placements
/// - `group` is a smaller share for placements in one of the groups following the top placements;
///   groups grow with the number of finishers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RankXpParams {
    pub top10: Top10Params,
    pub formula: FormulaParams,
    pub groups: Vec<GroupParams>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Top10Params {
    /// Points for the world record.
    pub wr_points: f64,

    /// Share of [`wr_points`](Self::wr_points) for each top placement, best first.
    pub rank_percentages: Vec<f64>,
}

/// `ceil(a / (rank + b))`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FormulaParams {
    pub a: f64,
    pub b: f64,
}

/// A group of placements after the top placements.
///
/// The group spans `max(ceil(scale_factor * total^exponent), min_size)` placements.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GroupParams {
    pub scale_factor: f64,
    pub exponent: f64,
    pub min_size: u32,

    /// Share of the world record points awarded to every placement in the group.
    pub point_pct: f64,
}

/// How an XP award came together.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RankXpGain {
    pub formula: Xp,
    pub top10: Xp,
    pub group: Option<GroupXp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupXp {
    /// 1-based.
    pub number: usize,
    pub xp: Xp,
}

impl RankXpGain {
    pub fn total(&self) -> Xp {
        self.formula
            .saturating_add(self.top10)
            .saturating_add(self.group.map_or(0, |group| group.xp))
    }
}

impl RankXpParams {
    /// Computes the XP breakdown for placement `rank` out of `total` finishers.
    pub fn gain(&self, rank: u32, total: u32) -> RankXpGain {
        if rank == 0 || rank > total {
            return RankXpGain::default();
        }

        let mut gain = RankXpGain {
            formula: to_xp(self.formula.a / (f64::from(rank) + self.formula.b)),
            ..Default::default()
        };

        let top_placements = u32::try_from(self.top10.rank_percentages.len()).unwrap_or(u32::MAX);

        if rank <= top_placements {
            let idx = usize::try_from(rank - 1).unwrap_or(usize::MAX);

            if let Some(&pct) = self.top10.rank_percentages.get(idx) {
                gain.top10 = to_xp(self.top10.wr_points * pct);
            }

            return gain;
        }

        let rank = f64::from(rank);
        let total = f64::from(total);
        let mut group_end = f64::from(top_placements);

        for (idx, group) in self.groups.iter().enumerate() {
            let size = (group.scale_factor * total.powf(group.exponent))
                .ceil()
                .max(f64::from(group.min_size));

            group_end += size;

            if rank <= group_end {
                gain.group = Some(GroupXp {
                    number: idx + 1,
                    xp: to_xp(self.top10.wr_points * group.point_pct),
                });
                break;
            }
        }

        gain
    }
}

impl XpCurve for RankXpParams {
    fn xp_for_rank(&self, rank: u32, total: u32) -> Xp {
        self.gain(rank, total).total()
    }
}

impl Default for RankXpParams {
    fn default() -> Self {
        Self {
            top10: Top10Params::default(),
            formula: FormulaParams::default(),
            groups: vec![
                GroupParams { scale_factor: 1.0, exponent: 0.5, min_size: 10, point_pct: 0.2 },
                GroupParams { scale_factor: 1.5, exponent: 0.56, min_size: 45, point_pct: 0.15 },
                GroupParams { scale_factor: 2.0, exponent: 0.62, min_size: 125, point_pct: 0.1 },
                GroupParams { scale_factor: 2.5, exponent: 0.68, min_size: 250, point_pct: 0.05 },
            ],
        }
    }
}

impl Default for Top10Params {
    fn default() -> Self {
        Self {
            wr_points: 3000.0,
            rank_percentages: vec![1.0, 0.75, 0.68, 0.61, 0.57, 0.53, 0.505, 0.48, 0.455, 0.43],
        }
    }
}

impl Default for FormulaParams {
    fn default() -> Self {
        Self { a: 50_000.0, b: 49.0 }
    }
}

/// Rounds up to whole XP; anything that is not a positive, finite amount is worth nothing.
#[allow(clippy::as_conversions, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_xp(value: f64) -> Xp {
    if value.is_finite() && value > 0.0 {
        value.ceil() as Xp
    } else {
        0
    }
}

use std::num::NonZero;
use std::time::Duration;

use serde::Deserialize;

use crate::Gamemode;
use crate::ranks::xp::RankXpParams;

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RanksConfig {
    /// Time between the starts of two passes.
    #[serde(deserialize_with = "super::deserialize_secs")]
    pub interval: Duration,

    /// Upper bound for loading every leaderboard.
    #[serde(deserialize_with = "super::deserialize_secs")]
    pub load_timeout: Duration,

    /// Upper bound for publishing a snapshot, from staging to commit.
    #[serde(deserialize_with = "super::deserialize_secs")]
    pub publish_timeout: Duration,

    /// Number of snapshot entries written per pipeline.
    pub batch_size: NonZero<usize>,

    /// Number of pipelines in flight at once.
    pub concurrency: NonZero<usize>,

    /// Gamemodes that should not be ranked even though their leaderboards are ranked.
    pub excluded_gamemodes: Vec<Gamemode>,

    /// Parameters of the XP curve.
    pub xp: RankXpParams,
}

impl Default for RanksConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            load_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(30),
            batch_size: NonZero::<usize>::new(500).expect("non-zero"),
            concurrency: NonZero::<usize>::new(8).expect("non-zero"),
            excluded_gamemodes: Vec::new(),
            xp: RankXpParams::default(),
        }
    }
}

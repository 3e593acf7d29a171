use std::time::Duration;

use serde::{Deserialize, Deserializer};

mod database;
pub use database::DatabaseConfig;

mod cache;
pub use cache::CacheConfig;

mod ranks;
pub use ranks::RanksConfig;

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Postgres, which holds the leaderboards.
    pub database: DatabaseConfig,

    /// Redis, which serves the published ranks.
    pub cache: CacheConfig,

    /// The aggregation passes themselves.
    pub ranks: RanksConfig,
}

/// Deserializes a [`Duration`] from a (fractional) amount of seconds.
fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = <f64 as Deserialize<'de>>::deserialize(deserializer)?;

    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gamemode;

    #[test]
    fn empty_config_uses_defaults() {
        let config = toml::from_str::<Config>("").unwrap();

        assert_eq!(config.ranks.interval, Duration::from_secs(60));
        assert_eq!(config.cache.namespace, "ranks");
        assert_eq!(config.ranks.xp.formula.a, 50_000.0);
    }

    #[test]
    fn parses_sections() {
        let config = toml::from_str::<Config>(
            r#"
            [database]
            url = "postgres://momentum@localhost/momentum"
            max-connections = 4

            [cache]
            url = "redis://localhost:6379/1"
            namespace = "ranks-staging"
            retired-ttl = 0
            io-timeout = 2.5

            [ranks]
            interval = 300
            batch-size = 250
            excluded-gamemodes = ["CONC"]

            [ranks.xp.top10]
            wr-points = 4000
            "#,
        )
        .unwrap();

        assert_eq!(config.database.max_connections.map(|n| n.get()), Some(4));
        assert_eq!(config.cache.namespace, "ranks-staging");
        assert_eq!(config.cache.retired_ttl, Duration::ZERO);
        assert_eq!(config.cache.io_timeout, Duration::from_millis(2500));
        assert_eq!(config.ranks.interval, Duration::from_secs(300));
        assert_eq!(config.ranks.batch_size.get(), 250);
        assert_eq!(config.ranks.excluded_gamemodes, [Gamemode::Conc]);
        assert_eq!(config.ranks.xp.top10.wr_points, 4000.0);
        assert_eq!(config.ranks.xp.formula.b, 49.0, "unspecified tables keep their defaults");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("[ranks]\nintervall = 5").is_err(), "typo should fail");
    }
}

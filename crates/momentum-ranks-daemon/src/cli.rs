//! CLI argument handling.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::config::Config;

pub fn args() -> Args {
    Args::parse()
}

#[derive(Debug, Parser)]
#[command(about = "Keeps Momentum Mod's global ranks up to date")]
pub struct Args {
    /// Path to the configuration file.
    ///
    /// Will default to `./momentum-ranks.toml` if unspecified.
    /// If that file does not exist, default configuration values will be used.
    #[arg(short, long = "config")]
    pub config_path: Option<PathBuf>,

    /// URL of the website's Postgres database.
    ///
    /// This takes precedence over `DATABASE_URL` and the configuration file.
    #[arg(long)]
    pub database_url: Option<Url>,

    /// URL of the Redis instance ranks are published to.
    ///
    /// This takes precedence over `REDIS_URL` and the configuration file.
    #[arg(long)]
    pub redis_url: Option<Url>,

    /// Seconds between the starts of two passes.
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Run a single pass and exit.
    ///
    /// The exit code is non-zero if the pass fails.
    #[arg(long)]
    pub once: bool,

    /// Publish into memory instead of Redis.
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Applies any overrides specified as CLI flags to the given config.
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(ref url) = self.database_url {
            config.database.url = url.clone();
        }

        if let Some(ref url) = self.redis_url {
            config.cache.url = url.clone();
        }

        if let Some(secs) = self.interval {
            config.ranks.interval = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config() {
        let args = Args::try_parse_from([
            "momentum-ranks-daemon",
            "--redis-url",
            "redis://cache:6380",
            "--interval",
            "15",
            "--once",
        ])
        .unwrap();

        let mut config = Config::default();
        args.apply_to_config(&mut config);

        assert!(args.once);
        assert!(!args.dry_run);
        assert_eq!(config.cache.url.as_str(), "redis://cache:6380");
        assert_eq!(config.ranks.interval, Duration::from_secs(15));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;

        Args::command().debug_assert();
    }
}

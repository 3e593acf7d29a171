use momentum::config::{CacheConfig, DatabaseConfig, RanksConfig};

pub mod tracing;
pub use self::tracing::TracingConfig;

pub use crate::runtime::RuntimeConfig;

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Configuration for [`tracing-subscriber`].
    pub tracing: TracingConfig,

    /// Configuration for Tokio.
    pub runtime: RuntimeConfig,

    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub ranks: RanksConfig,
}

impl Config {
    /// Splits off the parts the daemon needs before the engine starts.
    pub fn into_parts(self) -> (TracingConfig, RuntimeConfig, momentum::Config) {
        let Self { tracing, runtime, database, cache, ranks } = self;

        (tracing, runtime, momentum::Config { database, cache, ranks })
    }
}

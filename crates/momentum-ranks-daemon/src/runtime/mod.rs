use std::io;
use std::num::NonZero;

use tokio::runtime::Builder;
pub use tokio::runtime::Runtime;

pub mod signal;

/// How the Tokio runtime is sized.
///
/// Passes spend most of their time waiting on Postgres and Redis, so a few workers go a long way.
/// Aggregation is CPU-bound and runs on the blocking pool, one pass at a time.
#[derive(Debug, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Defaults to the number of CPUs.
    pub worker_threads: Option<NonZero<usize>>,

    /// Upper bound for the blocking pool.
    ///
    /// Besides aggregation, this pool resolves hostnames when connections are re-established,
    /// so it should not be smaller than 2.
    pub blocking_threads: NonZero<usize>,

    /// Prefix for the names of every runtime thread.
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            blocking_threads: NonZero::new(4).expect("4 is not 0"),
            thread_name: String::from("momentum-ranks"),
        }
    }
}

/// Builds a [Tokio runtime] according to the given `config`.
///
/// [Tokio runtime]: Runtime
pub fn build(config: &RuntimeConfig) -> io::Result<Runtime> {
    let mut builder = Builder::new_multi_thread();
    builder
        .enable_all()
        .thread_name(config.thread_name.as_str())
        .max_blocking_threads(config.blocking_threads.get());

    if let Some(n) = config.worker_threads {
        builder.worker_threads(n.get());
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_threads_carry_the_configured_name() {
        let config = RuntimeConfig {
            worker_threads: NonZero::new(1),
            thread_name: String::from("ranks-test"),
            ..RuntimeConfig::default()
        };

        let runtime = build(&config).unwrap();
        let name = runtime
            .block_on(runtime.spawn_blocking(|| {
                std::thread::current().name().map(String::from)
            }))
            .unwrap();

        assert_eq!(name.as_deref(), Some("ranks-test"));
    }

    #[test]
    fn rejects_an_empty_blocking_pool() {
        assert!(toml::from_str::<RuntimeConfig>("blocking-threads = 0").is_err());
        assert_eq!(
            toml::from_str::<RuntimeConfig>("worker-threads = 2")
                .unwrap()
                .blocking_threads
                .get(),
            4,
        );
    }
}

use std::env;
use std::num::NonZero;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use url::Url;

const DEFAULT_URL: &str = "redis://localhost:6379";

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CacheConfig {
    /// `REDIS_URL` takes precedence over this value.
    #[serde(deserialize_with = "deserialize_url")]
    pub url: Url,

    /// Prefix of every key the publisher writes.
    pub namespace: String,

    /// How long the keys of a replaced snapshot stay readable.
    ///
    /// Readers that resolved the old snapshot right before a swap can still finish their
    /// lookups during this window. `0` deletes the keys immediately.
    #[serde(deserialize_with = "super::deserialize_secs")]
    pub retired_ttl: Duration,

    /// Upper bound for any single round trip to Redis.
    #[serde(deserialize_with = "super::deserialize_secs")]
    pub io_timeout: Duration,

    /// How often a failed command is retried on a fresh connection.
    pub retries: usize,

    /// Maximum number of keys deleted / expired in one command.
    pub delete_chunk_size: NonZero<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            namespace: String::from("ranks"),
            retired_ttl: Duration::from_secs(60),
            io_timeout: Duration::from_secs(5),
            retries: 1,
            delete_chunk_size: NonZero::<usize>::new(1_000).expect("non-zero"),
        }
    }
}

fn default_url() -> Url {
    if let Ok(url) = env::var("REDIS_URL") {
        match url.parse::<Url>() {
            Ok(url) => return url,
            Err(error) => warn!(%error, "`REDIS_URL` is set but is not a valid URL"),
        }
    }

    DEFAULT_URL.parse::<Url>().expect("default redis URL is valid")
}

fn deserialize_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let url = Url::deserialize(deserializer)?;

    match env::var("REDIS_URL").map(|var| var.parse::<Url>()) {
        Ok(Ok(from_env)) => Ok(from_env),
        Ok(Err(error)) => {
            warn!(%error, "`REDIS_URL` is set but is not a valid URL; falling back to config value");
            Ok(url)
        },
        Err(_) => Ok(url),
    }
}

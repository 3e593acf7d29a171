//! Publishing into Redis.
//!
//! Key layout, below a configurable namespace `ns`:
//!
//! | key                        | type   | value                                           |
//! |----------------------------|--------|-------------------------------------------------|
//! | `ns:current`               | string | the current generation                          |
//! | `ns:staging`               | set    | generations that are being written              |
//! | `ns:retiring`              | set    | replaced generations that are not retired yet   |
//! | `ns:{gen}:user:{id}`       | hash   | `gamemode:{code}` → XP, `rank:{code}` → rank     |
//! | `ns:{gen}:rank:{code}:{n}` | string | ID of the user at rank `n`                      |
//! | `ns:{gen}:keys`            | set    | every key written for the generation            |
//!
//! Readers resolve `ns:current` first and then only touch keys of that generation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZero;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Pipeline, RedisResult};
use tokio_util::time::FutureExt as _;

use super::{Entry, Error, Generation, PublishedScores, Result, SnapshotStore};
use crate::Gamemode;
use crate::config::CacheConfig;
use crate::users::UserId;

/// A [`SnapshotStore`] backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    keys: Keys,
    options: RedisStoreOptions,
}

#[derive(Debug, Clone)]
pub struct RedisStoreOptions {
    /// How long a retired generation stays readable; zero deletes it right away.
    pub retired_ttl: Duration,
    pub io_timeout: Duration,
    pub delete_chunk_size: NonZero<usize>,
}

#[derive(Debug, Display, Error, From)]
#[display("failed to connect to redis: {_0}")]
#[from(forward)]
pub struct ConnectRedisError(Error);

/// Names of the keys below a namespace.
#[derive(Debug, Clone)]
struct Keys {
    namespace: Arc<str>,
}

impl Keys {
    fn new(namespace: &str) -> Self {
        Self { namespace: Arc::from(namespace) }
    }

    fn current(&self) -> String {
        format!("{}:current", self.namespace)
    }

    fn staging(&self) -> String {
        format!("{}:staging", self.namespace)
    }

    fn retiring(&self) -> String {
        format!("{}:retiring", self.namespace)
    }

    fn index(&self, generation: Generation) -> String {
        format!("{}:{generation}:keys", self.namespace)
    }

    fn user(&self, generation: Generation, user_id: UserId) -> String {
        format!("{}:{generation}:user:{user_id}", self.namespace)
    }

    fn rank(&self, generation: Generation, mode: Gamemode, rank: u32) -> String {
        format!("{}:{generation}:rank:{}:{rank}", self.namespace, mode.code())
    }

    fn entry(&self, generation: Generation, entry: &Entry) -> String {
        match *entry {
            Entry::Scores { user_id, .. } => self.user(generation, user_id),
            Entry::Rank { mode, rank, .. } => self.rank(generation, mode, rank),
        }
    }
}

/// Writes a batch of entries, registering every key in the generation's index first.
fn write_pipeline(keys: &Keys, generation: Generation, entries: &[Entry]) -> Pipeline {
    let entry_keys = entries
        .iter()
        .map(|entry| keys.entry(generation, entry))
        .collect::<Vec<_>>();

    let mut pipe = redis::pipe();

    // index first, so a batch that fails halfway can still be cleaned up
    pipe.cmd("SADD")
        .arg(keys.index(generation))
        .arg(entry_keys.as_slice())
        .ignore();

    for (key, entry) in entry_keys.iter().zip(entries) {
        match entry {
            Entry::Scores { scores, .. } => {
                let hset = pipe.cmd("HSET").arg(key.as_str());

                for (mode, xp) in scores.xp.iter() {
                    hset.arg(format!("gamemode:{}", mode.code())).arg(*xp);
                }

                for (mode, rank) in scores.ranks.iter() {
                    if let Some(rank) = rank {
                        hset.arg(format!("rank:{}", mode.code())).arg(*rank);
                    }
                }

                hset.ignore();
            },
            Entry::Rank { user_id, .. } => {
                pipe.cmd("SET")
                    .arg(key.as_str())
                    .arg(user_id.into_inner())
                    .ignore();
            },
        }
    }

    pipe
}

/// Swaps the current pointer and unstages `generation` in one transaction.
///
/// Replies with the previous value of the pointer.
fn commit_pipeline(keys: &Keys, generation: Generation) -> Pipeline {
    let mut pipe = redis::pipe();

    pipe.atomic()
        .cmd("SET")
        .arg(keys.current())
        .arg(generation.to_string())
        .arg("GET")
        .cmd("SREM")
        .arg(keys.staging())
        .arg(generation.to_string())
        .ignore();

    pipe
}

/// Deletes `chunk`, or lets it expire after `ttl` if that is non-zero.
fn expire_pipeline(chunk: &[String], ttl: Duration) -> Pipeline {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    let mut pipe = redis::pipe();

    if ttl_ms == 0 {
        pipe.cmd("DEL").arg(chunk).ignore();
    } else {
        for key in chunk {
            pipe.cmd("PEXPIRE").arg(key.as_str()).arg(ttl_ms).ignore();
        }
    }

    pipe
}

/// Forgets that `generation` was ever staged or retiring.
fn release_pipeline(keys: &Keys, generation: Generation) -> Pipeline {
    let mut pipe = redis::pipe();

    pipe.cmd("SREM")
        .arg(keys.staging())
        .arg(generation.to_string())
        .ignore()
        .cmd("SREM")
        .arg(keys.retiring())
        .arg(generation.to_string())
        .ignore();

    pipe
}

impl RedisStore {
    #[tracing::instrument(skip_all, fields(host = config.url.host_str()), err(level = "debug"))]
    pub async fn connect(config: &CacheConfig) -> Result<Self, ConnectRedisError> {
        let options = RedisStoreOptions {
            retired_ttl: config.retired_ttl,
            io_timeout: config.io_timeout,
            delete_chunk_size: config.delete_chunk_size,
        };

        let connection_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.retries)
            .set_connection_timeout(config.io_timeout);

        let client = Client::open(config.url.as_str()).map_err(Error::from)?;
        let connection = with_timeout(
            config.io_timeout,
            client.get_connection_manager_with_config(connection_config),
        )
        .await?;

        debug!(namespace = %config.namespace, "connected to redis");

        Ok(Self { connection, keys: Keys::new(&config.namespace), options })
    }

    pub fn namespace(&self) -> &str {
        &self.keys.namespace
    }

    async fn io<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T> {
        with_timeout(self.options.io_timeout, op).await
    }

    async fn run(&self, pipe: Pipeline) -> Result<()> {
        let mut conn = self.connection.clone();
        self.io(pipe.query_async::<()>(&mut conn)).await
    }

    async fn members(&self, key: String) -> Result<Vec<Generation>> {
        let mut conn = self.connection.clone();
        let members = self
            .io(
                redis::cmd("SMEMBERS")
                    .arg(key.as_str())
                    .query_async::<Vec<String>>(&mut conn),
            )
            .await?;

        members
            .into_iter()
            .map(|value| {
                value
                    .parse::<Generation>()
                    .map_err(|_| Error::Corrupt { key: key.clone(), value })
            })
            .collect()
    }

    fn parse_generation(&self, value: String) -> Result<Generation> {
        value
            .parse::<Generation>()
            .map_err(|_| Error::Corrupt { key: self.keys.current(), value })
    }
}

async fn with_timeout<T>(after: Duration, op: impl Future<Output = RedisResult<T>>) -> Result<T> {
    match op.timeout(after).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::TimedOut { after }),
    }
}

impl SnapshotStore for RedisStore {
    #[tracing::instrument(level = "trace", skip(self), err(level = "debug"))]
    async fn stage(&self, generation: Generation) -> Result<()> {
        let mut conn = self.connection.clone();

        self.io(
            redis::cmd("SADD")
                .arg(self.keys.staging())
                .arg(generation.to_string())
                .query_async::<()>(&mut conn),
        )
        .await
    }

    #[tracing::instrument(level = "trace", skip(self, entries), fields(entries = entries.len()), err(level = "debug"))]
    async fn write(&self, generation: Generation, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.run(write_pipeline(&self.keys, generation, &entries))
            .await
    }

    #[tracing::instrument(level = "trace", skip(self), err(level = "debug"))]
    async fn mark_retiring(&self, generation: Generation) -> Result<()> {
        let mut conn = self.connection.clone();

        self.io(
            redis::cmd("SADD")
                .arg(self.keys.retiring())
                .arg(generation.to_string())
                .query_async::<()>(&mut conn),
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn commit(&self, generation: Generation) -> Result<Option<Generation>> {
        let mut conn = self.connection.clone();
        let (previous,) = self
            .io(
                commit_pipeline(&self.keys, generation)
                    .query_async::<(Option<String>,)>(&mut conn),
            )
            .await?;

        previous
            .map(|value| self.parse_generation(value))
            .transpose()
    }

    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn retire(&self, generation: Generation) -> Result<()> {
        let mut conn = self.connection.clone();
        let index_key = self.keys.index(generation);
        let mut keys = self
            .io(
                redis::cmd("SMEMBERS")
                    .arg(index_key.as_str())
                    .query_async::<Vec<String>>(&mut conn),
            )
            .await?;

        trace!(keys = keys.len(), ttl = ?self.options.retired_ttl, "retiring keys");

        // the index goes last so an interrupted retirement can be resumed
        keys.push(index_key);

        for chunk in keys.chunks(self.options.delete_chunk_size.get()) {
            self.run(expire_pipeline(chunk, self.options.retired_ttl))
                .await?;
        }

        self.run(release_pipeline(&self.keys, generation)).await
    }

    async fn staged(&self) -> Result<Vec<Generation>> {
        self.members(self.keys.staging()).await
    }

    async fn retiring(&self) -> Result<Vec<Generation>> {
        self.members(self.keys.retiring()).await
    }

    async fn current(&self) -> Result<Option<Generation>> {
        let mut conn = self.connection.clone();

        self.io(
            redis::cmd("GET")
                .arg(self.keys.current())
                .query_async::<Option<String>>(&mut conn),
        )
        .await?
        .map(|value| self.parse_generation(value))
        .transpose()
    }

    async fn user_scores(&self, user_id: UserId) -> Result<Option<PublishedScores>> {
        let Some(generation) = self.current().await? else {
            return Ok(None);
        };

        let key = self.keys.user(generation, user_id);
        let mut conn = self.connection.clone();
        let fields = self
            .io(
                redis::cmd("HGETALL")
                    .arg(key.as_str())
                    .query_async::<HashMap<String, String>>(&mut conn),
            )
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        parse_scores(&key, fields).map(Some)
    }

    async fn rank_occupant(&self, mode: Gamemode, rank: u32) -> Result<Option<UserId>> {
        let Some(generation) = self.current().await? else {
            return Ok(None);
        };

        let key = self.keys.rank(generation, mode, rank);
        let mut conn = self.connection.clone();

        self.io(
            redis::cmd("GET")
                .arg(key.as_str())
                .query_async::<Option<String>>(&mut conn),
        )
        .await?
        .map(|value| {
            value
                .parse::<UserId>()
                .map_err(|_| Error::Corrupt { key: key.clone(), value })
        })
        .transpose()
    }
}

/// Parses a user hash; fields this version does not know about are ignored.
fn parse_scores(key: &str, fields: HashMap<String, String>) -> Result<PublishedScores> {
    let mut scores = PublishedScores::default();

    for (field, value) in fields {
        let Some((kind, code)) = field.split_once(':') else {
            continue;
        };

        let Some(mode) = code
            .parse::<i32>()
            .ok()
            .and_then(|code| Gamemode::try_from(code).ok())
        else {
            continue;
        };

        let corrupt = || Error::Corrupt { key: format!("{key} {field}"), value: value.clone() };

        match kind {
            "gamemode" => scores.xp[mode] = value.parse().map_err(|_| corrupt())?,
            "rank" => scores.ranks[mode] = Some(value.parse().map_err(|_| corrupt())?),
            _ => {},
        }
    }

    Ok(scores)
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("RedisStore")
            .field("namespace", &self.keys.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

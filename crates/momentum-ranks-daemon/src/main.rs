#[macro_use(debug, info, warn, error)]
extern crate tracing;

#[macro_use(select)]
extern crate tokio;

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use momentum::Context;
use momentum::cache::{MemoryStore, RedisStore, SnapshotStore};
use momentum::ranks::{self, PassOptions, RankEngine};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::tracing::StderrFormat;
use crate::config::{Config, TracingConfig};
use crate::runtime::signal::{Request, Signals};

mod cli;
mod config;
mod runtime;

const DEFAULT_CONFIG_PATH: &str = "./momentum-ranks.toml";

fn main() -> anyhow::Result<ExitCode> {
    let cli_args = cli::args();
    let mut config = if let Some(config_path) = cli_args.config_path.as_deref() {
        read_and_parse_config_file(config_path)?
    } else if fs::exists(DEFAULT_CONFIG_PATH)? {
        read_and_parse_config_file(Path::new(DEFAULT_CONFIG_PATH))?
    } else {
        Config::default()
    };

    cli_args.apply_to_config(&mut config);

    let (tracing_config, runtime_config, config) = config.into_parts();

    let _guard = if tracing_config.enable {
        init_tracing(&tracing_config).context("failed to initialize tracing")?
    } else {
        None
    };

    let mode = if cli_args.once { Mode::Once } else { Mode::Daemon };

    runtime::build(&runtime_config)
        .context("failed to build tokio runtime")?
        .block_on(run(config, mode, cli_args.dry_run))
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Once,
    Daemon,
}

async fn run(config: momentum::Config, mode: Mode, dry_run: bool) -> anyhow::Result<ExitCode> {
    let cx = Context::new(config)
        .await
        .context("failed to initialize context")?;

    let exit_code = if dry_run {
        warn!("dry run; ranks will not leave this process");
        drive(&cx, MemoryStore::new(), mode).await
    } else {
        match RedisStore::connect(&cx.config().cache).await {
            Ok(store) => drive(&cx, store, mode).await,
            Err(error) => {
                error!(%error, "failed to connect to redis");
                ExitCode::FAILURE
            },
        }
    };

    cx.cleanup().await;

    Ok(exit_code)
}

async fn drive<T>(cx: &Context, store: T, mode: Mode) -> ExitCode
where
    T: SnapshotStore + 'static,
{
    let ranks_config = &cx.config().ranks;
    let engine = Arc::new(RankEngine::new(
        cx.database().clone(),
        store,
        ranks_config.xp.clone(),
        PassOptions::from(ranks_config),
    ));

    match mode {
        Mode::Once => match engine.run_pass().await {
            Ok(report) => {
                for (gamemode, ranked) in report.stats.ranked.iter() {
                    debug!(%gamemode, ranked, "ranked users");
                }

                info!(
                    generation = %report.generation,
                    entries = report.entries,
                    skipped = report.stats.skipped,
                    "pass complete",
                );

                ExitCode::SUCCESS
            },
            Err(error) => {
                error!(%error, "pass failed");
                ExitCode::FAILURE
            },
        },
        Mode::Daemon => {
            let mut signals = match Signals::listen() {
                Ok(signals) => signals,
                Err(error) => {
                    error!(%error, "failed to listen for signals");
                    return ExitCode::FAILURE;
                },
            };

            let period = ranks_config.interval.max(Duration::from_secs(1));
            let handle = cx.ranks_daemon().clone();

            cx.spawn("momentum::ranks_daemon", {
                let engine = Arc::clone(&engine);
                move |cancellation_token| {
                    ranks::daemon::run(engine, period, handle, cancellation_token)
                }
            });

            info!(?period, "started; send SIGHUP to run a pass right away");

            loop {
                match signals.next().await {
                    Ok(Request::Pass) => {
                        info!("pass requested");
                        cx.ranks_daemon().request_pass();
                    },
                    Ok(Request::Shutdown { signal }) => {
                        if engine.is_running() {
                            warn!(signal, "shutting down; waiting for the current pass to finish");
                        } else {
                            warn!(signal, "shutting down");
                        }

                        break ExitCode::SUCCESS;
                    },
                    Err(error) => {
                        error!(%error, "failed to listen for signals");
                        break ExitCode::FAILURE;
                    },
                }
            }
        },
    }
}

fn read_and_parse_config_file(path: &Path) -> anyhow::Result<Config> {
    fs::read_to_string(path)
        .context("failed to read configuration file")
        .and_then(|text| toml::from_str(&text).context("failed to parse configuration file"))
}

fn init_tracing(config: &TracingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    assert!(config.enable);

    let stderr = config.stderr.enable.then(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(config.stderr.ansi)
            .with_writer(std::io::stderr);

        match config.stderr.format {
            StderrFormat::Pretty => layer.pretty().boxed(),
            StderrFormat::Compact => layer.compact().boxed(),
        }
    });

    let (files, guard) = config
        .files
        .enable
        .then(|| {
            if !config.files.directory.exists() {
                fs::create_dir_all(&config.files.directory).context("create log dir")?;
            }

            let log_dir = config
                .files
                .directory
                .canonicalize()
                .context("canonicalize log dir path")?;

            let (writer, guard) = tracing_appender::rolling::Builder::new()
                .rotation(config.files.rotation.into())
                .filename_prefix(config.files.prefix.as_str())
                .filename_suffix("log")
                .build(&log_dir)
                .map(tracing_appender::non_blocking)
                .context("failed to initialize logger")?;

            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false)
                .with_file(true)
                .with_level(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_writer(writer);

            anyhow::Ok((layer, guard))
        })
        .transpose()?
        .unzip();

    let layers = Layer::<Registry>::and_then(stderr, files);

    tracing_subscriber::registry()
        .with(layers.with_filter(config.env_filter()))
        .init();

    Ok(guard)
}

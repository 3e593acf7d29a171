use std::path::PathBuf;

use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TracingConfig {
    /// Whether to initialize a subscriber at all.
    pub enable: bool,

    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,

    pub stderr: StderrConfig,
    pub files: FilesConfig,
}

impl TracingConfig {
    /// `RUST_LOG` if it is set and valid, `filter` otherwise.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable: true,
            filter: String::from("momentum=info,momentum_ranks_daemon=info,warn"),
            stderr: StderrConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct StderrConfig {
    pub enable: bool,

    /// Whether to include ANSI escape codes for colors.
    pub ansi: bool,

    pub format: StderrFormat,
}

impl Default for StderrConfig {
    fn default() -> Self {
        Self { enable: true, ansi: true, format: StderrFormat::Pretty }
    }
}

/// How events are laid out on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StderrFormat {
    /// Multi-line, for a terminal.
    Pretty,

    /// One line per event, for journald and friends.
    Compact,
}

/// Pass reports are written to rolling log files.
#[derive(Debug, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilesConfig {
    pub enable: bool,

    /// Created if it does not exist.
    pub directory: PathBuf,

    /// Files are named `{prefix}.{date}.log`, or `{prefix}.log` if they never rotate.
    pub prefix: String,

    pub rotation: FileRotation,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enable: false,
            directory: PathBuf::from("/var/log/momentum-ranks"),
            prefix: String::from("momentum-ranks"),
            rotation: FileRotation::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileRotation {
    Hourly,
    Daily,
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Daily => Self::DAILY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_settings() {
        let config = toml::from_str::<TracingConfig>(
            r#"
            filter = "momentum=debug"

            [stderr]
            format = "compact"

            [files]
            enable = true
            prefix = "ranks"
            rotation = "hourly"
            "#,
        )
        .unwrap();

        assert_eq!(config.filter, "momentum=debug");
        assert_eq!(config.stderr.format, StderrFormat::Compact);
        assert!(config.stderr.ansi);
        assert_eq!(config.files.prefix, "ranks");
        assert_eq!(Rotation::from(config.files.rotation), Rotation::HOURLY);
        assert_eq!(config.files.directory, PathBuf::from("/var/log/momentum-ranks"));
    }

    #[test]
    fn rejects_unknown_rotations() {
        assert!(toml::from_str::<TracingConfig>("[files]\nrotation = \"weekly\"").is_err());
    }
}

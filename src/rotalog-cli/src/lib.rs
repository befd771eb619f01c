//! Command-line front end for `rotalog`.
//!
//! Reads standard input line by line and writes each line into a rotating
//! file, so a long-running process can be piped through it:
//!
//! ```text
//! my-server 2>&1 | rotalog --max-age 14d '/var/log/my-server/%Y-%m-%d.log'
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info};

use rotalog::{
    ClockKind, DEFAULT_MAX_AGE, RotateWriter, RotationConfig, format_duration, parse_duration,
};

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Pipe standard input into time-rotated files.
#[derive(Debug, Parser)]
#[command(name = "rotalog")]
#[command(author, version)]
#[command(about = "Pipe standard input into time-rotated files", long_about = None)]
pub struct Cli {
    /// Filename template, e.g. `/var/log/app/app-%Y-%m-%d.log`.
    ///
    /// Overrides the pattern from `--config` when both are given.
    #[arg(required_unless_present = "config")]
    pub pattern: Option<String>,

    /// Width of a rotation bucket (`30s`, `15m`, `1h`, `24h`, `7d`) [default: 24h].
    #[arg(long, value_parser = parse_duration)]
    pub rotation_interval: Option<Duration>,

    /// Delete rotated files older than this; `0` keeps everything [default: 7d].
    #[arg(long, value_parser = parse_duration)]
    pub max_age: Option<Duration>,

    /// Never reuse an existing file when a new bucket starts.
    #[arg(long)]
    pub force_new_file: bool,

    /// Clock used to pick buckets (`local` or `utc`) [default: local].
    #[arg(long)]
    pub clock: Option<ClockKind>,

    /// TOML file with a rotation config. Options given on the command line
    /// take precedence over the file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also copy input to standard output.
    #[arg(long)]
    pub tee: bool,

    /// Enable verbose output (same as --log-level debug)
    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Set log verbosity level (error, warn, info, debug, trace)
    #[arg(long = "log-level", short = 'L', value_enum, default_value = "warn")]
    pub log_level: LogLevel,
}

impl Cli {
    /// Effective tracing level: `-v` wins, then `ROTALOG_LOG_LEVEL`, then
    /// `--log-level`.
    pub fn log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else if let Ok(env_level) = std::env::var("ROTALOG_LOG_LEVEL") {
            LogLevel::from_str_loose(&env_level).unwrap_or(self.log_level)
        } else {
            self.log_level
        }
    }

    /// Build the writer configuration: the config file (or the defaults),
    /// then every option given on the command line on top.
    pub fn rotation_config(&self) -> Result<RotationConfig> {
        let mut config = match &self.config {
            Some(path) => RotationConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RotationConfig {
                max_age_secs: DEFAULT_MAX_AGE.as_secs(),
                ..RotationConfig::new(String::new())
            },
        };

        if let Some(pattern) = &self.pattern {
            config.pattern = pattern.clone();
        }
        if let Some(interval) = self.rotation_interval {
            config.rotation_interval_secs = interval.as_secs();
        }
        if let Some(max_age) = self.max_age {
            config.max_age_secs = max_age.as_secs();
        }
        if self.force_new_file {
            config.force_new_file = true;
        }
        if let Some(clock) = self.clock {
            config.clock = clock;
        }

        if config.pattern.is_empty() {
            bail!("No filename pattern given");
        }
        Ok(config)
    }
}

/// Copy `reader` into `writer` one line per write, so a line never straddles
/// two files. Returns the number of bytes copied.
pub fn copy_lines<R: BufRead>(
    mut reader: R,
    writer: &RotateWriter,
    mut tee: Option<&mut dyn Write>,
) -> Result<u64> {
    let mut line = Vec::with_capacity(1024);
    let mut copied = 0u64;
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .context("Failed to read input")?;
        if n == 0 {
            break;
        }
        writer.write(&line)?;
        if let Some(out) = tee.as_mut() {
            out.write_all(&line).context("Failed to copy to stdout")?;
        }
        copied += n as u64;
    }
    if let Some(out) = tee.as_mut() {
        out.flush()?;
    }
    Ok(copied)
}

/// Run the command.
pub fn run(cli: &Cli) -> Result<()> {
    let config = cli.rotation_config()?;
    info!(
        pattern = %config.pattern,
        rotation_interval = %format_duration(config.rotation_interval()),
        max_age = %format_duration(config.max_age()),
        "Starting rotalog"
    );

    let writer = RotateWriter::from_config(&config)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let tee: Option<&mut dyn Write> = if cli.tee {
        Some(&mut stdout_lock)
    } else {
        None
    };

    let copied = copy_lines(stdin.lock(), &writer, tee)?;
    writer.close()?;
    debug!(bytes = copied, "Input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rotalog", "app-%Y.log"]);
        let config = cli.rotation_config().unwrap();
        assert_eq!(config.pattern, "app-%Y.log");
        assert_eq!(config.rotation_interval_secs, 24 * 60 * 60);
        assert_eq!(config.max_age_secs, 7 * 24 * 60 * 60);
        assert!(!config.force_new_file);
        assert_eq!(config.clock, ClockKind::Local);
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_log_level_from_str_loose() {
        assert_eq!(LogLevel::from_str_loose("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str_loose("loud"), None);
        assert_eq!(LogLevel::Info.as_filter_str(), "info");
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "rotalog",
            "--rotation-interval",
            "1h",
            "--max-age",
            "0",
            "--force-new-file",
            "--clock",
            "utc",
            "-v",
            "app-%Y%m%d%H.log",
        ]);
        let config = cli.rotation_config().unwrap();
        assert_eq!(config.rotation_interval_secs, 3600);
        assert_eq!(config.max_age_secs, 0);
        assert!(config.force_new_file);
        assert_eq!(config.clock, ClockKind::Utc);
        assert_eq!(cli.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["rotalog", "--max-age", "soon", "a-%Y"]).is_err());
    }

    #[test]
    fn test_cli_requires_pattern_or_config() {
        assert!(Cli::try_parse_from(["rotalog"]).is_err());
    }

    #[test]
    fn test_config_file_with_pattern_override() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rotalog.toml");
        fs::write(
            &path,
            "pattern = \"from-file-%Y.log\"\nmax_age_secs = 60\nclock = \"utc\"\n",
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from(["rotalog", "--config", path_arg.as_str()]);
        let config = cli.rotation_config().unwrap();
        assert_eq!(config.pattern, "from-file-%Y.log");
        assert_eq!(config.max_age_secs, 60);

        assert_eq!(config.rotation_interval_secs, 24 * 60 * 60);
        assert_eq!(config.clock, ClockKind::Utc);

        let cli = Cli::parse_from(["rotalog", "--config", path_arg.as_str(), "cli-%Y.log"]);
        assert_eq!(cli.rotation_config().unwrap().pattern, "cli-%Y.log");
    }

    #[test]
    fn test_command_line_options_override_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rotalog.toml");
        fs::write(
            &path,
            "pattern = \"from-file-%Y.log\"\nrotation_interval_secs = 60\nmax_age_secs = 60\nclock = \"utc\"\n",
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from([
            "rotalog",
            "--config",
            path_arg.as_str(),
            "--max-age",
            "2d",
            "--rotation-interval",
            "1h",
            "--force-new-file",
            "--clock",
            "local",
        ]);
        let config = cli.rotation_config().unwrap();
        assert_eq!(config.pattern, "from-file-%Y.log");
        assert_eq!(config.max_age_secs, 2 * 24 * 60 * 60);
        assert_eq!(config.rotation_interval_secs, 3600);
        assert!(config.force_new_file);
        assert_eq!(config.clock, ClockKind::Local);
    }

    #[test]
    fn test_copy_lines_writes_and_tees() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("out-%Y.log");
        let writer = RotateWriter::builder(template.to_string_lossy())
            .build()
            .unwrap();

        let input = Cursor::new(b"first\nsecond\nno newline".to_vec());
        let mut teed = Vec::new();
        let copied = copy_lines(input, &writer, Some(&mut teed)).unwrap();
        let file = writer.current_filename().unwrap();
        writer.close().unwrap();

        assert_eq!(copied, 24);
        assert_eq!(teed, b"first\nsecond\nno newline");
        assert_eq!(fs::read(file).unwrap(), b"first\nsecond\nno newline");
    }
}

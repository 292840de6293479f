use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use vacuumlink_core::engine::EngineConfig;
use vacuumlink_core::protocol::{ConfigError, PollMode};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Log engine internals at debug level (RUST_LOG overrides)
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists connected serial devices
    List,
    /// Poll a gauge on a serial port
    Run(RunCommand),
    /// Poll the built-in gauge simulator
    Demo(DemoCommand),
}

#[derive(Args)]
pub struct RunCommand {
    /// Serial port the gauge is attached to
    #[clap(long, short)]
    pub port: String,

    #[clap(flatten)]
    pub polling: PollingConf,

    #[clap(flatten)]
    pub output: LogConf,
}

#[derive(Args)]
pub struct DemoCommand {
    /// Share of simulated readings that come out garbled
    #[clap(long, default_value = "0.0")]
    pub glitch_rate: f64,

    #[clap(flatten)]
    pub polling: PollingConf,

    #[clap(flatten)]
    pub output: LogConf,
}

#[derive(Args)]
pub struct PollingConf {
    /// 1 = every 100 ms, 2 = every 1 s, 3 = manual interval
    #[clap(long, short, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub mode: Option<u8>,

    /// Interval between readings in manual mode, at least 1100 ms
    #[clap(long, short)]
    pub interval: Option<u32>,

    /// Blocking read timeout in ms
    #[clap(long)]
    pub read_timeout: Option<u32>,

    /// Give up when a fixed-cadence gauge stays silent this long (ms)
    #[clap(long)]
    pub idle_timeout: Option<u32>,

    /// JSON engine configuration; flags above override it
    #[clap(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct LogConf {
    /// Pressure log, appended to
    #[clap(long, default_value = "output.txt")]
    pub log: PathBuf,
}

impl PollingConf {
    /// Merge the config file and flags into a validated configuration
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = match (&self.config, self.mode) {
            (Some(path), _) => EngineConfig::from_json_file(path)?,
            (None, Some(_)) => EngineConfig::fast_fixed(),
            (None, None) => {
                return Err(ConfigError::InvalidValue {
                    field: "mode",
                    reason: "pass --mode or --config".into(),
                })
            }
        };

        if let Some(selector) = self.mode {
            config.mode = PollMode::from_selector(selector)?;
            // A file interval only survives into manual mode
            if config.mode != PollMode::Manual {
                config.manual_interval_ms = None;
            }
        }
        if self.interval.is_some() {
            config.manual_interval_ms = self.interval;
        }
        if let Some(ms) = self.read_timeout {
            config.read_timeout_ms = ms;
        }
        if self.idle_timeout.is_some() {
            config.idle_timeout_ms = self.idle_timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conf(mode: Option<u8>, interval: Option<u32>) -> PollingConf {
        PollingConf {
            mode,
            interval,
            read_timeout: None,
            idle_timeout: None,
            config: None,
        }
    }

    #[test]
    fn test_manual_mode_from_flags() {
        let config = conf(Some(3), Some(1500)).engine_config().unwrap();
        assert_eq!(config.mode, PollMode::Manual);
        assert_eq!(config.manual_interval_ms, Some(1500));
    }

    #[test]
    fn test_flags_are_validated() {
        assert_eq!(
            conf(Some(3), Some(1000)).engine_config().unwrap_err(),
            ConfigError::IntervalTooShort(1000)
        );
        assert_eq!(
            conf(Some(3), None).engine_config().unwrap_err(),
            ConfigError::MissingInterval
        );
        assert_eq!(
            conf(Some(1), Some(1500)).engine_config().unwrap_err(),
            ConfigError::UnexpectedInterval
        );
        assert!(conf(None, None).engine_config().is_err());
    }

    fn config_file(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauge.json");
        std::fs::write(&path, json).unwrap();
        (dir, path)
    }

    #[test]
    fn test_file_interval_kept_when_flag_omitted() {
        let (_dir, path) = config_file(r#"{"mode":"manual","manual_interval_ms":2000}"#);
        let mut polling = conf(Some(3), None);
        polling.config = Some(path);

        let config = polling.engine_config().unwrap();
        assert_eq!(config.mode, PollMode::Manual);
        assert_eq!(config.manual_interval_ms, Some(2000));
    }

    #[test]
    fn test_flags_override_file() {
        let (_dir, path) = config_file(
            r#"{"mode":"manual","manual_interval_ms":2000,"read_timeout_ms":500}"#,
        );

        let mut polling = conf(None, Some(3000));
        polling.config = Some(path.clone());
        let config = polling.engine_config().unwrap();
        assert_eq!(config.manual_interval_ms, Some(3000));
        assert_eq!(config.read_timeout_ms, 500);

        // Switching to a fixed mode drops the file's manual interval
        let mut polling = conf(Some(1), None);
        polling.config = Some(path);
        let config = polling.engine_config().unwrap();
        assert_eq!(config.mode, PollMode::FastFixed);
        assert_eq!(config.manual_interval_ms, None);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "vacuumlink", "run", "--port", "/dev/ttyUSB0", "--mode", "3", "--interval", "2000",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(run) => {
                assert_eq!(run.port, "/dev/ttyUSB0");
                assert_eq!(run.output.log, PathBuf::from("output.txt"));
                let config = run.polling.engine_config().unwrap();
                assert_eq!(config.manual_interval_ms, Some(2000));
            }
            _ => panic!("Expected run command"),
        }

        assert!(Cli::try_parse_from(["vacuumlink", "demo", "--mode", "4"]).is_err());
    }
}

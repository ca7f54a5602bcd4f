// ABOUTME: Validated runtime configuration built from command-line flags and environment.
// ABOUTME: Rejects conflicting settings before anything touches the engine.

mod secret;

pub use secret::resolve_secret;

use crate::api::ApiConfig;
use crate::cli::Cli;
use crate::engine::EngineOptions;
use crate::error::{Error, Result};
use crate::filters::build_filter;
use crate::resolver::WarnStrategy;
use crate::scheduler::Schedule;
use crate::runtime::{ApiVersion, ConnectOptions, TlsFiles};
use crate::update::UpdateParams;
use std::path::PathBuf;
use std::time::Duration;

/// Poll interval used when neither an interval nor a schedule is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub engine_timeout: Duration,
    pub api_version: Option<ApiVersion>,
    pub tls: Option<TlsFiles>,
    pub schedule: Schedule,
    pub run_once: bool,
    pub names: Vec<String>,
    pub disabled_names: Vec<String>,
    pub label_enable: bool,
    pub scope: String,
    pub cleanup: bool,
    pub no_restart: bool,
    pub monitor_only: bool,
    pub lifecycle_hooks: bool,
    pub rolling_restart: bool,
    pub label_precedence: bool,
    pub stop_timeout: Duration,
    pub engine: EngineOptions,
    pub warn_on_head_failure: WarnStrategy,
    pub registry_timeout: Duration,
    pub api: ApiConfig,
    pub api_port: u16,
    pub periodic_polls: bool,
    pub startup_message: bool,
}

impl Config {
    /// Validates flags into a configuration.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let schedule = match (&cli.schedule, cli.interval) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConfig(
                    "only schedule or interval can be defined, not both".to_string(),
                ));
            }
            (Some(expression), None) => expression.parse()?,
            (None, Some(seconds)) => Schedule::every(Duration::from_secs(seconds))?,
            (None, None) => Schedule::every(DEFAULT_INTERVAL)?,
        };

        if cli.stop_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "stop timeout must be greater than zero".to_string(),
            ));
        }

        if cli.rolling_restart && cli.monitor_only {
            return Err(Error::InvalidConfig(
                "rolling restart cannot be combined with monitor-only".to_string(),
            ));
        }

        if cli.monitor_only && cli.no_pull {
            tracing::warn!("Using no-pull and monitor-only simultaneously might lead to no action being taken at all");
        }

        let api_version = cli.api_version.as_deref().map(parse_api_version).transpose()?;
        let tls = if cli.tls_verify {
            if cli.host.starts_with("unix://") {
                return Err(Error::InvalidConfig(format!(
                    "TLS verification needs a tcp:// engine host, got {}",
                    cli.host
                )));
            }
            Some(TlsFiles::in_dir(&cert_dir(cli.cert_path)?))
        } else {
            None
        };

        let token = resolve_secret(&cli.http_api_token)?;
        let api = ApiConfig {
            token,
            update: cli.http_api_update,
            metrics: cli.http_api_metrics,
        };
        if api.enabled() && api.token.is_empty() {
            return Err(Error::InvalidConfig(
                "an HTTP API token is required when the HTTP API is enabled".to_string(),
            ));
        }

        Ok(Self {
            host: cli.host,
            engine_timeout: cli.engine_timeout,
            api_version,
            tls,
            schedule,
            run_once: cli.run_once,
            names: cli.names,
            disabled_names: cli.disable_containers,
            label_enable: cli.label_enable,
            scope: cli.scope,
            cleanup: cli.cleanup,
            no_restart: cli.no_restart,
            monitor_only: cli.monitor_only,
            lifecycle_hooks: cli.enable_lifecycle_hooks,
            rolling_restart: cli.rolling_restart,
            label_precedence: cli.label_take_precedence,
            stop_timeout: cli.stop_timeout,
            engine: EngineOptions {
                pull_images: !cli.no_pull,
                remove_volumes: cli.remove_volumes,
                include_stopped: cli.include_stopped,
                revive_stopped: cli.revive_stopped,
                include_restarting: cli.include_restarting,
            },
            warn_on_head_failure: cli.warn_on_head_failure,
            registry_timeout: cli.registry_timeout,
            api,
            api_port: cli.http_api_port,
            periodic_polls: cli.http_api_periodic_polls,
            startup_message: !cli.no_startup_message,
        })
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            timeout: self.engine_timeout,
            api_version: self.api_version,
            tls: self.tls.clone(),
        }
    }

    /// Session parameters plus a sentence describing the container filter.
    pub fn update_params(&self) -> (UpdateParams, String) {
        let (filter, description) = build_filter(
            &self.names,
            &self.disabled_names,
            self.label_enable,
            &self.scope,
        );
        let params = UpdateParams {
            filter,
            cleanup: self.cleanup,
            no_restart: self.no_restart,
            timeout: self.stop_timeout,
            monitor_only: self.monitor_only,
            lifecycle_hooks: self.lifecycle_hooks,
            rolling_restart: self.rolling_restart,
            label_precedence: self.label_precedence,
        };
        (params, description)
    }

    /// The schedule is off while the update API is enabled, unless periodic
    /// polls were asked for.
    pub fn scheduler_enabled(&self) -> bool {
        !self.api.update || self.periodic_polls
    }
}

fn parse_api_version(value: &str) -> Result<ApiVersion> {
    let version = ApiVersion::parse(value).ok_or_else(|| {
        Error::InvalidConfig(format!("API version {value:?} is not of the form major.minor"))
    })?;
    if version < ApiVersion::MINIMUM {
        return Err(Error::InvalidConfig(format!(
            "API version {version} is too old, {} is the minimum",
            ApiVersion::MINIMUM
        )));
    }
    Ok(version)
}

/// Certificate directory, falling back to `~/.docker`.
fn cert_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker")))
        .ok_or_else(|| {
            Error::InvalidConfig("no certificate path given and HOME is not set".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["watchtower"];
        argv.extend_from_slice(args);
        Config::from_cli(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn defaults_poll_daily() {
        let config = config(&[]).unwrap();
        assert_eq!(config.schedule.to_string(), "@every 1day");
        assert!(config.engine.pull_images);
        assert!(config.scheduler_enabled());
        assert!(config.startup_message);
    }

    #[test]
    fn schedule_and_interval_conflict() {
        let err = config(&["--interval", "30", "--schedule", "0 0 * * * *"]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rolling_restart_rejects_monitor_only() {
        assert!(config(&["--rolling-restart", "--monitor-only"]).is_err());
    }

    #[test]
    fn api_requires_token() {
        assert!(config(&["--http-api-update"]).is_err());
        let config = config(&["--http-api-update", "--http-api-token", "t0k"]).unwrap();
        assert!(!config.scheduler_enabled());
        assert_eq!(config.api.token, "t0k");
    }

    #[test]
    fn periodic_polls_keep_the_schedule() {
        let config = config(&[
            "--http-api-update",
            "--http-api-token",
            "t0k",
            "--http-api-periodic-polls",
        ])
        .unwrap();
        assert!(config.scheduler_enabled());
    }

    #[test]
    fn update_params_follow_flags() {
        let config = config(&["--cleanup", "--scope", "prod", "web"]).unwrap();
        let (params, description) = config.update_params();
        assert!(params.cleanup);
        assert_eq!(params.timeout, Duration::from_secs(10));
        assert_eq!(
            description,
            "Only checking containers which name matches \"web\", in scope \"prod\""
        );
    }

    #[test]
    fn api_version_is_pinned() {
        temp_env::with_var_unset("DOCKER_API_VERSION", || {
            assert_eq!(config(&[]).unwrap().api_version, None);
        });
        let config = config(&["--api-version", "1.41"]).unwrap();
        assert_eq!(config.connect_options().api_version, ApiVersion::parse("1.41"));
    }

    #[test]
    fn api_version_below_minimum_is_rejected() {
        for version in ["1.24", "1.12", "0.99"] {
            let err = config(&["--api-version", version]).unwrap_err();
            assert!(err.to_string().contains("1.25"), "{version}: {err}");
        }
        assert!(matches!(
            config(&["--api-version", "latest"]).unwrap_err(),
            Error::InvalidConfig(_)
        ));
    }

    #[test]
    fn tls_reads_certificates_from_cert_path() {
        let config = config(&["--tlsverify", "--cert-path", "/certs", "-H", "tcp://engine:2376"]).unwrap();
        let options = config.connect_options();
        assert_eq!(options.host, "tcp://engine:2376");
        assert_eq!(options.tls, Some(TlsFiles::in_dir(std::path::Path::new("/certs"))));
    }

    #[test]
    fn tls_defaults_to_the_home_docker_directory() {
        temp_env::with_vars(
            [("HOME", Some("/home/ops")), ("DOCKER_CERT_PATH", None)],
            || {
                let config = config(&["--tlsverify", "-H", "tcp://engine:2376"]).unwrap();
                assert_eq!(config.tls.unwrap().ca, PathBuf::from("/home/ops/.docker/ca.pem"));
            },
        );
    }

    #[test]
    fn tls_settings_come_from_the_engine_environment() {
        temp_env::with_vars(
            [
                ("DOCKER_TLS_VERIFY", Some("1")),
                ("DOCKER_CERT_PATH", Some("/certs")),
                ("DOCKER_HOST", Some("tcp://engine:2376")),
                ("DOCKER_API_VERSION", Some("1.40")),
            ],
            || {
                let config = config(&[]).unwrap();
                assert_eq!(config.tls.unwrap().key, PathBuf::from("/certs/key.pem"));
                assert_eq!(config.api_version, ApiVersion::parse("1.40"));
            },
        );
    }

    #[test]
    fn tls_over_a_socket_is_rejected() {
        let args = ["--tlsverify", "--cert-path", "/certs", "-H", "unix:///var/run/docker.sock"];
        assert!(matches!(config(&args).unwrap_err(), Error::InvalidConfig(_)));
    }
}

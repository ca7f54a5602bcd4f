// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Every flag has a WATCHTOWER_* (or engine-standard) environment fallback.

use crate::resolver::WarnStrategy;
use crate::runtime::DEFAULT_DOCKER_HOST;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

#[derive(Debug, Parser)]
#[command(name = "watchtower")]
#[command(about = "Automatically updates running containers when their images change")]
#[command(version)]
pub struct Cli {
    /// Containers to watch (all when none are given)
    pub names: Vec<String>,

    /// Engine socket to connect to
    #[arg(short = 'H', long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub host: String,

    /// Connect over TLS and verify the engine's certificate
    #[arg(long = "tlsverify", env = "DOCKER_TLS_VERIFY")]
    pub tls_verify: bool,

    /// Directory holding ca.pem, cert.pem and key.pem (defaults to ~/.docker)
    #[arg(long, env = "DOCKER_CERT_PATH")]
    pub cert_path: Option<PathBuf>,

    /// Engine API version to use, as major.minor (1.25 or newer)
    #[arg(short = 'a', long, env = "DOCKER_API_VERSION")]
    pub api_version: Option<String>,

    /// Poll interval in seconds
    #[arg(short, long, env = "WATCHTOWER_POLL_INTERVAL")]
    pub interval: Option<u64>,

    /// Cron expression (with seconds) or `@every <duration>` for when to check
    #[arg(short, long, env = "WATCHTOWER_SCHEDULE")]
    pub schedule: Option<String>,

    /// Remove old images after updating
    #[arg(short, long, env = "WATCHTOWER_CLEANUP")]
    pub cleanup: bool,

    /// Remove anonymous volumes along with replaced containers
    #[arg(long, env = "WATCHTOWER_REMOVE_VOLUMES")]
    pub remove_volumes: bool,

    /// Stop stale containers without starting replacements
    #[arg(long, env = "WATCHTOWER_NO_RESTART")]
    pub no_restart: bool,

    /// Do not pull images; only compare against what is already local
    #[arg(long, env = "WATCHTOWER_NO_PULL")]
    pub no_pull: bool,

    /// Detect new images without updating anything
    #[arg(long, env = "WATCHTOWER_MONITOR_ONLY")]
    pub monitor_only: bool,

    /// Also watch created and exited containers
    #[arg(short = 'S', long, env = "WATCHTOWER_INCLUDE_STOPPED")]
    pub include_stopped: bool,

    /// Also watch restarting containers
    #[arg(long, env = "WATCHTOWER_INCLUDE_RESTARTING")]
    pub include_restarting: bool,

    /// Start stopped containers after updating them
    #[arg(long, env = "WATCHTOWER_REVIVE_STOPPED")]
    pub revive_stopped: bool,

    /// Replace containers one at a time
    #[arg(long, env = "WATCHTOWER_ROLLING_RESTART")]
    pub rolling_restart: bool,

    /// Only watch containers carrying the enable label
    #[arg(short = 'e', long, env = "WATCHTOWER_LABEL_ENABLE")]
    pub label_enable: bool,

    /// Let container labels override monitor-only and no-pull
    #[arg(long, env = "WATCHTOWER_LABEL_TAKE_PRECEDENCE")]
    pub label_take_precedence: bool,

    /// Containers to exclude, comma separated
    #[arg(short = 'x', long, env = "WATCHTOWER_DISABLE_CONTAINERS", value_delimiter = ',')]
    pub disable_containers: Vec<String>,

    /// Run lifecycle commands declared in container labels
    #[arg(long, env = "WATCHTOWER_LIFECYCLE_HOOKS")]
    pub enable_lifecycle_hooks: bool,

    /// Grace period between stop signal and forced removal
    #[arg(short = 't', long, env = "WATCHTOWER_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub stop_timeout: Duration,

    /// Only watch containers in this scope ("none" for unscoped ones)
    #[arg(long, env = "WATCHTOWER_SCOPE", default_value = "")]
    pub scope: String,

    /// Run a single session and exit
    #[arg(short = 'R', long, env = "WATCHTOWER_RUN_ONCE")]
    pub run_once: bool,

    /// When to log failed registry HEAD requests as warnings
    #[arg(long, env = "WATCHTOWER_WARN_ON_HEAD_FAILURE", value_enum, default_value = "auto")]
    pub warn_on_head_failure: WarnStrategy,

    /// Timeout for registry HEAD and token requests
    #[arg(long, env = "WATCHTOWER_REGISTRY_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub registry_timeout: Duration,

    /// Timeout for each engine API request
    #[arg(long, env = "WATCHTOWER_ENGINE_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub engine_timeout: Duration,

    /// Enable the update HTTP endpoints
    #[arg(long, env = "WATCHTOWER_HTTP_API_UPDATE")]
    pub http_api_update: bool,

    /// Enable the metrics HTTP endpoint
    #[arg(long, env = "WATCHTOWER_HTTP_API_METRICS")]
    pub http_api_metrics: bool,

    /// Bearer token for the HTTP API (or a path to a file holding it)
    #[arg(long, env = "WATCHTOWER_HTTP_API_TOKEN", default_value = "")]
    pub http_api_token: String,

    /// Keep the schedule running while the update API is enabled
    #[arg(long, env = "WATCHTOWER_HTTP_API_PERIODIC_POLLS")]
    pub http_api_periodic_polls: bool,

    /// Port the HTTP API listens on
    #[arg(long, env = "WATCHTOWER_HTTP_API_PORT", default_value_t = crate::api::DEFAULT_PORT)]
    pub http_api_port: u16,

    /// Do not log the startup summary
    #[arg(long, env = "WATCHTOWER_NO_STARTUP_MESSAGE")]
    pub no_startup_message: bool,

    /// Enable debug logging
    #[arg(short, long, env = "WATCHTOWER_DEBUG")]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long, env = "WATCHTOWER_TRACE")]
    pub trace: bool,
}

impl Cli {
    /// Log filter directive picked by the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            "trace"
        } else if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["watchtower"]).unwrap();
        assert_eq!(cli.stop_timeout, Duration::from_secs(10));
        assert_eq!(cli.registry_timeout, Duration::from_secs(30));
        assert_eq!(cli.warn_on_head_failure, WarnStrategy::Auto);
        assert_eq!(cli.http_api_port, 8080);
        assert!(cli.names.is_empty());
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn names_and_exclusions() {
        let cli = Cli::try_parse_from([
            "watchtower",
            "web",
            "db",
            "-x",
            "cache,queue",
            "--stop-timeout",
            "1m",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.names, vec!["web", "db"]);
        assert_eq!(cli.disable_containers, vec!["cache", "queue"]);
        assert_eq!(cli.stop_timeout, Duration::from_secs(60));
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn engine_connection_flags() {
        let cli = Cli::try_parse_from([
            "watchtower",
            "--tlsverify",
            "--cert-path",
            "/certs",
            "-a",
            "1.41",
            "-H",
            "tcp://engine:2376",
        ])
        .unwrap();
        assert!(cli.tls_verify);
        assert_eq!(cli.cert_path, Some(PathBuf::from("/certs")));
        assert_eq!(cli.api_version.as_deref(), Some("1.41"));
        assert_eq!(cli.host, "tcp://engine:2376");
    }

    #[test]
    fn bad_duration_is_rejected() {
        assert!(Cli::try_parse_from(["watchtower", "--stop-timeout", "soon"]).is_err());
    }
}

use std::time::Duration;

use clap::{Args, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Runtime configuration. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Port the HTTP control surface listens on
    #[arg(long, env = "SERVER_PORT", default_value_t = 8888)]
    pub server_port: u16,

    /// Namespace holding the admin secret
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: String,

    /// Name of the secret holding the admin JMX credentials
    #[arg(long, env = "ADMIN_SECRET_NAME")]
    pub admin_secret_name: String,

    /// How often every known node is polled (e.g. 500ms, 10s, 1m)
    #[arg(long, env = "JMX_POLLING_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub jmx_polling_interval: Duration,

    /// JMX port of the Cassandra nodes
    #[arg(long, env = "JMX_PORT", default_value_t = 7199)]
    pub jmx_port: u16,

    /// Port of the local Jolokia proxy
    #[arg(long, env = "JOLOKIA_PORT", default_value_t = 8080)]
    pub jolokia_port: u16,

    #[arg(long, env = "LOGLEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOGFORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Optional OTLP collector endpoint traces are exported to
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Jolokia requests must complete well within a polling cycle
    pub fn jolokia_timeout(&self) -> Duration {
        self.jmx_polling_interval / 2
    }
}

/// Parses durations in the `<integer><unit>` form, unit being one of `ms`, `s` or `m`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {:?} (expected ms, s or m)", value))?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid duration {:?}", value))?;

    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount * 60),
        _ => return Err(format!("unknown unit {:?} in duration {:?}", unit, value)),
    };

    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::{parse_duration, Config, LogFormat};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10h").is_err());
        assert!(parse_duration("0s").is_err());
    }

    #[test]
    fn defaults() {
        let cli = TestCli::try_parse_from([
            "cassprober-server",
            "--pod-namespace",
            "cassandra",
            "--admin-secret-name",
            "admin",
        ])
        .unwrap();

        let config = cli.config;
        assert_eq!(config.server_port, 8888);
        assert_eq!(config.jmx_port, 7199);
        assert_eq!(config.jolokia_port, 8080);
        assert_eq!(config.jmx_polling_interval, Duration::from_secs(10));
        assert_eq!(config.jolokia_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.otlp_endpoint, None);
    }

    #[test]
    fn overrides() {
        let cli = TestCli::try_parse_from([
            "cassprober-server",
            "--pod-namespace",
            "cassandra",
            "--admin-secret-name",
            "admin",
            "--jmx-polling-interval",
            "2s",
            "--log-format",
            "text",
            "--server-port",
            "9999",
        ])
        .unwrap();

        assert_eq!(cli.config.jmx_polling_interval, Duration::from_secs(2));
        assert_eq!(cli.config.log_format, LogFormat::Text);
        assert_eq!(cli.config.server_port, 9999);
    }

    #[test]
    fn invalid_interval_is_rejected() {
        assert!(TestCli::try_parse_from([
            "cassprober-server",
            "--pod-namespace",
            "cassandra",
            "--admin-secret-name",
            "admin",
            "--jmx-polling-interval",
            "often",
        ])
        .is_err());
    }
}

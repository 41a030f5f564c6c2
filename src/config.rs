//! Service configuration.
//!
//! Every option can come from the command line or the environment (after `.env`
//! is loaded); [`Config::from_args`] validates the combination once at startup.

use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "optflow")]
#[command(about = "Stream option premium summaries and threshold alerts from daily tick logs")]
pub struct ServerArgs {
    /// Directory holding `<TICKER>_<YYYY-MM-DD>.jsonl` tick logs
    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Directory holding per-user notification rule files
    #[arg(long, env = "NOTIFICATIONS_DIR", default_value = "./notifications")]
    pub notifications_dir: PathBuf,

    /// Directory holding per-user push device files
    #[arg(long, env = "DEVICES_DIR", default_value = "./devices")]
    pub devices_dir: PathBuf,

    /// Bucket width in minutes
    #[arg(long, env = "PERIOD_MINUTES", default_value = "5")]
    pub period: u32,

    #[arg(long, env = "HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Reference timezone for "today", file dates and bucket alignment
    #[arg(long, env = "REFERENCE_TZ", default_value = "America/Los_Angeles")]
    pub timezone: String,

    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "JWT_EXPIRY_HOURS", default_value = "168")]
    pub jwt_expiry_hours: i64,

    #[arg(long, env = "PING_INTERVAL_SECS", default_value = "54")]
    pub ping_interval_secs: u64,

    /// Throttle window for alerts on in-progress buckets
    #[arg(long, env = "DEDUP_WINDOW_SECS", default_value = "30")]
    pub dedup_window_secs: u64,

    /// Completed buckets kept in memory, in multiples of the period
    #[arg(long, env = "RETENTION_PERIODS", default_value = "2")]
    pub retention_periods: u32,

    #[arg(long, env = "DEBOUNCE_MS", default_value = "500")]
    pub debounce_ms: u64,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "30")]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "RULES_RELOAD_SECS", default_value = "30")]
    pub rules_reload_secs: u64,

    /// Webhook that accepts push payloads; alerts are only logged when unset
    #[arg(long, env = "PUSH_GATEWAY_URL")]
    pub push_gateway_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_dir: PathBuf,
    pub notifications_dir: PathBuf,
    pub devices_dir: PathBuf,
    pub period_minutes: u32,
    pub host: String,
    pub port: u16,
    pub timezone: Tz,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub ping_interval: Duration,
    pub dedup_window: Duration,
    pub retention_periods: u32,
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub rules_reload_interval: Duration,
    pub push_gateway_url: Option<String>,
}

impl Config {
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let timezone = args
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone {}: {}", args.timezone, e))?;

        if args.jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if args.jwt_expiry_hours <= 0 {
            bail!("JWT_EXPIRY_HOURS must be a positive integer");
        }

        let config = Self {
            log_dir: args.log_dir,
            notifications_dir: args.notifications_dir,
            devices_dir: args.devices_dir,
            period_minutes: args.period,
            host: args.host,
            port: args.port,
            timezone,
            jwt_secret: args.jwt_secret,
            jwt_expiry_hours: args.jwt_expiry_hours,
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            dedup_window: Duration::from_secs(args.dedup_window_secs),
            retention_periods: args.retention_periods,
            debounce: Duration::from_millis(args.debounce_ms),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            rules_reload_interval: Duration::from_secs(args.rules_reload_secs),
            push_gateway_url: args.push_gateway_url.filter(|u| !u.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `base`, used by tooling and tests.
    pub fn rooted_at(base: impl Into<PathBuf>, jwt_secret: &str) -> Self {
        let base = base.into();
        Self {
            log_dir: base.join("logs"),
            notifications_dir: base.join("notifications"),
            devices_dir: base.join("devices"),
            period_minutes: 5,
            host: "127.0.0.1".to_string(),
            port: 0,
            timezone: chrono_tz::America::Los_Angeles,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiry_hours: 168,
            ping_interval: Duration::from_secs(54),
            dedup_window: Duration::from_secs(30),
            retention_periods: 2,
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
            sweep_interval: Duration::from_secs(30),
            rules_reload_interval: Duration::from_secs(30),
            push_gateway_url: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_minutes == 0 {
            bail!("period must be greater than 0");
        }
        if self.period_minutes > 24 * 60 {
            bail!("period must not exceed one day");
        }
        if self.retention_periods == 0 {
            bail!("retention must keep at least one period");
        }
        for (name, d) in [
            ("ping interval", self.ping_interval),
            ("dedup window", self.dedup_window),
            ("debounce", self.debounce),
            ("poll interval", self.poll_interval),
            ("sweep interval", self.sweep_interval),
            ("rules reload interval", self.rules_reload_interval),
        ] {
            if d.is_zero() {
                bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> ServerArgs {
        let mut argv = vec!["optflow", "--jwt-secret", "test-secret"];
        argv.extend_from_slice(extra);
        ServerArgs::parse_from(argv)
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::from_args(args(&[])).unwrap();
        assert_eq!(config.period_minutes, 5);
        assert_eq!(config.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.dedup_window, Duration::from_secs(30));
        assert_eq!(config.retention_periods, 2);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert!(config.push_gateway_url.is_none());
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(Config::from_args(args(&["--period", "0"])).is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(Config::from_args(args(&["--timezone", "Mars/Olympus"])).is_err());
    }

    #[test]
    fn test_blank_push_url_treated_as_unset() {
        let config = Config::from_args(args(&["--push-gateway-url", "  "])).unwrap();
        assert!(config.push_gateway_url.is_none());
    }

    #[test]
    fn test_rooted_config_is_valid() {
        let config = Config::rooted_at("/tmp/optflow", "secret");
        assert!(config.validate().is_ok());
        assert_eq!(config.log_dir, PathBuf::from("/tmp/optflow/logs"));
    }
}

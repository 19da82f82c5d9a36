use crate::simulator::generator::cents_range;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

fn backend_url_default() -> String { return "https://iot-pp8j.onrender.com".to_string() }
fn device_name_default() -> String { return "blue_bulb".to_string() }
fn location_default() -> String { return "living-room".to_string() }
fn count_default() -> u32 { return 60 }
fn delay_ms_default() -> u64 { return 10_000 }
fn min_watts_default() -> f64 { return 10.0 }
fn max_watts_default() -> f64 { return 2000.0 }
fn on_submit_error_default() -> SubmitErrorPolicy { return SubmitErrorPolicy::Log }
fn submit_retries_default() -> u32 { return 0 }
fn retry_delay_ms_default() -> u64 { return 1_000 }
fn request_timeout_ms_default() -> u64 { return 30_000 }
fn send_timestamp_default() -> bool { return false }

/// What to do when posting a reading fails
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubmitErrorPolicy {
    /// Fire and forget, failures only show up in debug logs
    Ignore,
    /// Warn and keep going
    Log,
    /// Stop the run on the first failed reading
    Abort,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SimConfig {
    #[serde(default="backend_url_default")]
    pub backend_url: String,
    #[serde(default="device_name_default")]
    pub device_name: String,
    #[serde(default="location_default")]
    pub location: String,
    #[serde(default="count_default")]
    pub count: u32,
    #[serde(default="delay_ms_default")]
    pub delay_ms: u64,              // Pause between two readings
    #[serde(default="min_watts_default")]
    pub min_watts: f64,
    #[serde(default="max_watts_default")]
    pub max_watts: f64,
    #[serde(default="on_submit_error_default")]
    pub on_submit_error: SubmitErrorPolicy,
    #[serde(default="submit_retries_default")]
    pub submit_retries: u32,
    #[serde(default="retry_delay_ms_default")]
    pub retry_delay_ms: u64,
    #[serde(default="request_timeout_ms_default")]
    pub request_timeout_ms: u64,
    #[serde(default="send_timestamp_default")]
    pub send_timestamp: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        return SimConfig {
            backend_url: backend_url_default(),
            device_name: device_name_default(),
            location: location_default(),
            count: count_default(),
            delay_ms: delay_ms_default(),
            min_watts: min_watts_default(),
            max_watts: max_watts_default(),
            on_submit_error: on_submit_error_default(),
            submit_retries: submit_retries_default(),
            retry_delay_ms: retry_delay_ms_default(),
            request_timeout_ms: request_timeout_ms_default(),
            send_timestamp: send_timestamp_default(),
        };
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("unable to parse config file {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_yml::Error },
    #[error("invalid backend url {url:?}: {reason}")]
    BackendUrl { url: String, reason: String },
    #[error("device name must not be empty")]
    EmptyDeviceName,
    #[error("invalid watt range {min}..={max}")]
    WattRange { min: f64, max: f64 },
}

/// Command line and environment overrides, everything is optional so the
/// config file and the defaults can fill the gaps
#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML config file, defaults to config/sim.yaml or sim.yaml if present
    #[arg(env = "SIM_CONFIG", long = "config", value_name = "path")]
    pub config: Option<PathBuf>,

    /// Base URL of the backend
    #[arg(env = "SIM_BACKEND_URL", long = "backend-url", value_name = "url")]
    pub backend_url: Option<String>,

    /// Name used when registering the device
    #[arg(env = "SIM_DEVICE_NAME", long = "device-name", value_name = "str")]
    pub device_name: Option<String>,

    /// Location used when registering the device
    #[arg(env = "SIM_LOCATION", long = "location", value_name = "str")]
    pub location: Option<String>,

    /// Number of readings to send
    #[arg(env = "SIM_COUNT", long = "count", value_name = "int")]
    pub count: Option<u32>,

    /// Delay between readings in milliseconds
    #[arg(env = "SIM_DELAY_MS", long = "delay-ms", value_name = "ms")]
    pub delay_ms: Option<u64>,

    /// Lower bound of the generated power value
    #[arg(env = "SIM_MIN_WATTS", long = "min-watts", value_name = "watts")]
    pub min_watts: Option<f64>,

    /// Upper bound of the generated power value
    #[arg(env = "SIM_MAX_WATTS", long = "max-watts", value_name = "watts")]
    pub max_watts: Option<f64>,

    /// Behaviour when a reading could not be delivered
    #[arg(env = "SIM_ON_SUBMIT_ERROR", long = "on-submit-error", value_enum)]
    pub on_submit_error: Option<SubmitErrorPolicy>,

    /// Retries for a failed reading before the policy applies
    #[arg(env = "SIM_SUBMIT_RETRIES", long = "submit-retries", value_name = "int")]
    pub submit_retries: Option<u32>,

    /// Delay between retries in milliseconds
    #[arg(env = "SIM_RETRY_DELAY_MS", long = "retry-delay-ms", value_name = "ms")]
    pub retry_delay_ms: Option<u64>,

    /// Request timeout in milliseconds
    #[arg(env = "SIM_REQUEST_TIMEOUT_MS", long = "request-timeout-ms", value_name = "ms")]
    pub request_timeout_ms: Option<u64>,

    /// Attach the current UTC time to every reading
    #[arg(env = "SIM_SEND_TIMESTAMP", long = "send-timestamp", value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    pub send_timestamp: Option<bool>,
}

impl SimConfig {
    /// Resolve the configuration: defaults, then the YAML file, then the
    /// command line / environment
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = match &cli.config {
            Some(p) => Some(p.clone()),
            None => default_config_path(),
        };

        let mut config = match path {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                Self::from_file(&p)?
            },
            None => {
                debug!("No config file found, using defaults");
                SimConfig::default()
            }
        };

        config.apply(cli);
        config.validate()?;
        return Ok(config);
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        return Self::from_yaml(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source });
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        /* An empty file is a valid config with only defaults */
        if contents.trim().is_empty() {
            return Ok(SimConfig::default());
        }
        return serde_yml::from_str(contents);
    }

    pub fn apply(&mut self, cli: &Cli) {
        if let Some(v) = &cli.backend_url { self.backend_url = v.clone(); }
        if let Some(v) = &cli.device_name { self.device_name = v.clone(); }
        if let Some(v) = &cli.location { self.location = v.clone(); }
        if let Some(v) = cli.count { self.count = v; }
        if let Some(v) = cli.delay_ms { self.delay_ms = v; }
        if let Some(v) = cli.min_watts { self.min_watts = v; }
        if let Some(v) = cli.max_watts { self.max_watts = v; }
        if let Some(v) = cli.on_submit_error { self.on_submit_error = v; }
        if let Some(v) = cli.submit_retries { self.submit_retries = v; }
        if let Some(v) = cli.retry_delay_ms { self.retry_delay_ms = v; }
        if let Some(v) = cli.request_timeout_ms { self.request_timeout_ms = v; }
        if let Some(v) = cli.send_timestamp { self.send_timestamp = v; }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match reqwest::Url::parse(&self.backend_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {},
            Ok(url) => {
                return Err(ConfigError::BackendUrl {
                    url: self.backend_url.clone(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                });
            },
            Err(e) => {
                return Err(ConfigError::BackendUrl { url: self.backend_url.clone(), reason: e.to_string() });
            }
        }

        if self.device_name.trim().is_empty() {
            return Err(ConfigError::EmptyDeviceName);
        }

        /* Rejects negative, reversed or huge bounds and ranges without a whole cent */
        if cents_range(self.min_watts, self.max_watts).is_none() {
            return Err(ConfigError::WattRange { min: self.min_watts, max: self.max_watts });
        }

        return Ok(());
    }

    pub fn delay(&self) -> Duration {
        return Duration::from_millis(self.delay_ms);
    }

    pub fn retry_delay(&self) -> Duration {
        return Duration::from_millis(self.retry_delay_ms);
    }

    pub fn request_timeout(&self) -> Duration {
        return Duration::from_millis(self.request_timeout_ms);
    }
}

fn default_config_path() -> Option<PathBuf> {
    /* Check for the two paths of the config file */
    for candidate in ["config/sim.yaml", "sim.yaml"] {
        let p = PathBuf::from(candidate);
        if p.is_file() {
            return Some(p);
        }
    }
    return None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = SimConfig::default();
        assert_eq!(c.count, 60);
        assert_eq!(c.delay(), Duration::from_secs(10));
        assert_eq!(c.min_watts, 10.0);
        assert_eq!(c.max_watts, 2000.0);
        assert_eq!(c.on_submit_error, SubmitErrorPolicy::Log);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let c = SimConfig::from_yaml("backend_url: http://localhost:5000\ncount: 3\non_submit_error: abort\n").unwrap();
        assert_eq!(c.backend_url, "http://localhost:5000");
        assert_eq!(c.count, 3);
        assert_eq!(c.on_submit_error, SubmitErrorPolicy::Abort);
        assert_eq!(c.device_name, "blue_bulb");
        assert_eq!(c.delay_ms, 10_000);
    }

    #[test]
    fn test_empty_yaml() {
        assert_eq!(SimConfig::from_yaml("").unwrap(), SimConfig::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device_name: red_bulb\ncount: 5\ndelay_ms: 50").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            count: Some(3),
            delay_ms: Some(0),
            ..Default::default()
        };
        let c = SimConfig::load(&cli).unwrap();
        assert_eq!(c.device_name, "red_bulb");
        assert_eq!(c.count, 3);
        assert_eq!(c.delay_ms, 0);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/sim.yaml")),
            ..Default::default()
        };
        assert!(matches!(SimConfig::load(&cli), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_watt_range() {
        let mut c = SimConfig::default();
        c.min_watts = 500.0;
        c.max_watts = 100.0;
        assert!(matches!(c.validate(), Err(ConfigError::WattRange { .. })));

        c.min_watts = f64::NAN;
        assert!(matches!(c.validate(), Err(ConfigError::WattRange { .. })));

        /* the difference overflows to infinity */
        c.min_watts = -1.7e308;
        c.max_watts = 1.7e308;
        assert!(matches!(c.validate(), Err(ConfigError::WattRange { .. })));

        c.min_watts = -5.0;
        c.max_watts = 100.0;
        assert!(matches!(c.validate(), Err(ConfigError::WattRange { .. })));
    }

    #[test]
    fn test_watt_range_without_whole_cent() {
        let mut c = SimConfig::default();
        c.min_watts = 10.001;
        c.max_watts = 10.004;
        assert!(matches!(c.validate(), Err(ConfigError::WattRange { .. })));

        c.max_watts = 10.014;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_invalid_backend_url() {
        let mut c = SimConfig::default();
        c.backend_url = "not a url".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::BackendUrl { .. })));

        c.backend_url = "ftp://example.com".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::BackendUrl { .. })));
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "energy-sim", "--count", "3", "--delay-ms", "0", "--on-submit-error", "ignore", "--send-timestamp",
        ]).unwrap();
        assert_eq!(cli.count, Some(3));
        assert_eq!(cli.delay_ms, Some(0));
        assert_eq!(cli.on_submit_error, Some(SubmitErrorPolicy::Ignore));
        assert_eq!(cli.send_timestamp, Some(true));
    }
}

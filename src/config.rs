use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the testflux collector.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    /// Overridden by `--log-level`.
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Collection pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// InfluxDB v2 connection configuration.
    #[serde(default)]
    pub influxdb: InfluxConfig,

    /// Synthetic workload configuration.
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// Collection pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Test name tag stamped onto every point. Default: "Test".
    #[serde(default = "default_test_name")]
    pub test_name: String,

    /// Node name tag identifying this generator instance. Default: "Test-Node".
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Run identifier grouping every point of one execution. Default: "R001".
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Sampler selection: a regex or a `;`-separated label list, per
    /// `useRegexForSamplerList`. Default: ".*".
    #[serde(default = "default_samplers_list")]
    pub samplers_list: String,

    /// Treat `samplersList` as a regex instead of an exact label list.
    /// Default: true.
    #[serde(default = "default_true")]
    pub use_regex_for_sampler_list: bool,

    /// Also record nested sub-results, one level deep. Default: true.
    #[serde(default = "default_true")]
    pub record_sub_samples: bool,

    /// Capture response bodies of failed samples. Default: true.
    #[serde(default = "default_true")]
    pub save_response_body_of_failures: bool,

    /// Maximum characters of a captured failure body. Default: 1024.
    #[serde(default = "default_response_body_length")]
    pub response_body_length: usize,

    /// Optional anchor time `yyyy-MM-dd HH:mm:ss <zone>` that back-dates
    /// every point by `now - anchor`. A leading `#` disables it and `//`
    /// starts an inline comment. Default: disabled.
    #[serde(default = "default_time_shift_target")]
    pub time_shift_target: Option<String>,

    /// Virtual user gauge cadence. Default: 1s.
    #[serde(default = "default_sampler_interval", with = "humantime_serde")]
    pub sampler_interval: Duration,

    /// Upper bound on waiting for ticker shutdown in `stop`. Default: 30s.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// InfluxDB v2 connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxConfig {
    /// Deliver points to InfluxDB. When false the run records points
    /// in memory and prints a summary instead. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// InfluxDB base URL. Default: "http://localhost:8086".
    #[serde(default = "default_influx_url")]
    pub url: String,

    /// Organization name.
    #[serde(default)]
    pub org: String,

    /// Destination bucket.
    #[serde(default)]
    pub bucket: String,

    /// API token with write access to the bucket.
    #[serde(default)]
    pub token: String,

    /// Periodic flush cadence. Default: 4s.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Maximum points per write request. Default: 2000.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum buffered points; the oldest are dropped beyond this. Default: 8192.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Failed batches tolerated before delivery degrades to dropping. Default: 5.
    #[serde(default = "default_threshold_error")]
    pub threshold_error: u32,

    /// HTTP request timeout. Default: 10s.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Synthetic workload configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadConfig {
    /// Number of concurrent virtual users. Default: 10.
    #[serde(default = "default_users")]
    pub users: usize,

    /// Total run duration. Default: 60s.
    #[serde(default = "default_duration", with = "humantime_serde")]
    pub duration: Duration,

    /// Pause between one user's consecutive requests. Default: 200ms.
    #[serde(default = "default_think_time", with = "humantime_serde")]
    pub think_time: Duration,

    /// Probability in [0, 1] that a synthesized request fails. Default: 0.05.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    /// Request labels, weighted towards the front of the list.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_test_name() -> String {
    "Test".to_string()
}

fn default_node_name() -> String {
    "Test-Node".to_string()
}

fn default_run_id() -> String {
    "R001".to_string()
}

fn default_samplers_list() -> String {
    ".*".to_string()
}

fn default_true() -> bool {
    true
}

fn default_response_body_length() -> usize {
    1024
}

fn default_time_shift_target() -> Option<String> {
    Some("#2023-04-01 00:00:00 UTC".to_string())
}

fn default_sampler_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(4)
}

fn default_max_batch_size() -> usize {
    2000
}

fn default_max_queue_size() -> usize {
    8192
}

fn default_threshold_error() -> u32 {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_users() -> usize {
    10
}

fn default_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_think_time() -> Duration {
    Duration::from_millis(200)
}

fn default_failure_rate() -> f64 {
    0.05
}

fn default_labels() -> Vec<String> {
    vec![
        "Login".to_string(),
        "Search".to_string(),
        "Checkout".to_string(),
    ]
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            pipeline: PipelineConfig::default(),
            influxdb: InfluxConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_name: default_test_name(),
            node_name: default_node_name(),
            run_id: default_run_id(),
            samplers_list: default_samplers_list(),
            use_regex_for_sampler_list: true,
            record_sub_samples: true,
            save_response_body_of_failures: true,
            response_body_length: default_response_body_length(),
            time_shift_target: default_time_shift_target(),
            sampler_interval: default_sampler_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_influx_url(),
            org: String::new(),
            bucket: String::new(),
            token: String::new(),
            flush_interval: default_flush_interval(),
            max_batch_size: default_max_batch_size(),
            max_queue_size: default_max_queue_size(),
            threshold_error: default_threshold_error(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            duration: default_duration(),
            think_time: default_think_time(),
            failure_rate: default_failure_rate(),
            labels: default_labels(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.test_name.is_empty() {
            bail!("pipeline.testName is required");
        }
        if self.pipeline.node_name.is_empty() {
            bail!("pipeline.nodeName is required");
        }
        if self.pipeline.run_id.is_empty() {
            bail!("pipeline.runId is required");
        }
        if self.pipeline.sampler_interval.is_zero() {
            bail!("pipeline.samplerInterval must be positive");
        }
        if self.pipeline.shutdown_timeout.is_zero() {
            bail!("pipeline.shutdownTimeout must be positive");
        }

        // The flush ticker runs for every sink, including dry runs.
        if self.influxdb.flush_interval.is_zero() {
            bail!("influxdb.flushInterval must be positive");
        }

        if self.influxdb.enabled {
            if self.influxdb.url.is_empty() {
                bail!("influxdb.url is required when enabled");
            }
            if self.influxdb.org.is_empty() {
                bail!("influxdb.org is required when enabled");
            }
            if self.influxdb.bucket.is_empty() {
                bail!("influxdb.bucket is required when enabled");
            }
            if self.influxdb.token.is_empty() {
                bail!("influxdb.token is required when enabled");
            }
            if self.influxdb.max_batch_size == 0 {
                bail!("influxdb.maxBatchSize must be positive");
            }
            if self.influxdb.max_queue_size < self.influxdb.max_batch_size {
                bail!("influxdb.maxQueueSize must be at least maxBatchSize");
            }
            if self.influxdb.threshold_error == 0 {
                bail!("influxdb.thresholdError must be positive");
            }
        }

        if self.workload.users == 0 {
            bail!("workload.users must be positive");
        }
        if self.workload.duration.is_zero() {
            bail!("workload.duration must be positive");
        }
        if !(0.0..=1.0).contains(&self.workload.failure_rate) {
            bail!("workload.failureRate must be within [0, 1]");
        }
        if self.workload.labels.is_empty() {
            bail!("workload.labels must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            influxdb: InfluxConfig {
                org: "perf".to_string(),
                bucket: "loadtests".to_string(),
                token: "secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.pipeline.test_name, "Test");
        assert_eq!(cfg.pipeline.node_name, "Test-Node");
        assert_eq!(cfg.pipeline.run_id, "R001");
        assert_eq!(cfg.pipeline.samplers_list, ".*");
        assert!(cfg.pipeline.use_regex_for_sampler_list);
        assert!(cfg.pipeline.record_sub_samples);
        assert!(cfg.pipeline.save_response_body_of_failures);
        assert_eq!(cfg.pipeline.response_body_length, 1024);
        assert_eq!(cfg.pipeline.sampler_interval, Duration::from_secs(1));
        assert_eq!(cfg.pipeline.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(cfg.influxdb.url, "http://localhost:8086");
        assert_eq!(cfg.influxdb.flush_interval, Duration::from_secs(4));
        assert_eq!(cfg.influxdb.max_batch_size, 2000);
        assert_eq!(cfg.influxdb.max_queue_size, 8192);
        assert_eq!(cfg.influxdb.threshold_error, 5);
        assert_eq!(cfg.workload.users, 10);
    }

    #[test]
    fn test_default_time_shift_target_is_disabled() {
        let cfg = Config::default();
        let target = cfg.pipeline.time_shift_target.expect("default target");
        assert!(target.starts_with('#'));
    }

    #[test]
    fn test_parse_camel_case_yaml() {
        let yaml = r#"
pipeline:
  testName: "Nightly Load"
  nodeName: "gen-02"
  runId: "R042"
  samplersList: "Login;Checkout"
  useRegexForSamplerList: false
  recordSubSamples: false
  responseBodyLength: 256
  timeShiftTarget: "2023-04-01 00:00:00 +0200"
  samplerInterval: 2s
  shutdownTimeout: 10s
influxdb:
  url: "http://influx:8086"
  org: "perf"
  bucket: "loadtests"
  token: "secret"
  flushInterval: 500ms
  maxBatchSize: 100
  maxQueueSize: 400
workload:
  users: 3
  duration: 5s
  thinkTime: 50ms
  failureRate: 0.5
  labels: ["Login", "Checkout"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("parse");
        cfg.validate().expect("valid");

        assert_eq!(cfg.pipeline.test_name, "Nightly Load");
        assert_eq!(cfg.pipeline.run_id, "R042");
        assert!(!cfg.pipeline.use_regex_for_sampler_list);
        assert!(!cfg.pipeline.record_sub_samples);
        assert!(cfg.pipeline.save_response_body_of_failures);
        assert_eq!(cfg.pipeline.response_body_length, 256);
        assert_eq!(
            cfg.pipeline.time_shift_target.as_deref(),
            Some("2023-04-01 00:00:00 +0200")
        );
        assert_eq!(cfg.pipeline.sampler_interval, Duration::from_secs(2));
        assert_eq!(cfg.influxdb.flush_interval, Duration::from_millis(500));
        assert_eq!(cfg.influxdb.max_batch_size, 100);
        assert_eq!(cfg.workload.think_time, Duration::from_millis(50));
    }

    #[test]
    fn test_validation_accepts_defaults_when_influx_disabled() {
        let cfg = Config {
            influxdb: InfluxConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_credentials_when_enabled() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("influxdb.org"));
    }

    #[test]
    fn test_validation_empty_run_id() {
        let mut cfg = valid_config();
        cfg.pipeline.run_id = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.runId"));
    }

    #[test]
    fn test_validation_zero_sampler_interval() {
        let mut cfg = valid_config();
        cfg.pipeline.sampler_interval = Duration::ZERO;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("samplerInterval"));
    }

    #[test]
    fn test_validation_zero_flush_interval_fails_even_when_disabled() {
        let mut cfg = valid_config();
        cfg.influxdb.enabled = false;
        cfg.influxdb.flush_interval = Duration::ZERO;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("flushInterval"));
    }

    #[test]
    fn test_validation_queue_must_hold_one_batch() {
        let mut cfg = valid_config();
        cfg.influxdb.max_batch_size = 500;
        cfg.influxdb.max_queue_size = 100;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("maxQueueSize"));
    }

    #[test]
    fn test_validation_failure_rate_bounds() {
        let mut cfg = valid_config();
        cfg.workload.failure_rate = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("failureRate"));

        cfg.workload.failure_rate = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_labels() {
        let mut cfg = valid_config();
        cfg.workload.labels.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("workload.labels"));
    }
}

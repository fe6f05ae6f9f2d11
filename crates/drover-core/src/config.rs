//! Drover configuration.
//!
//! [`DroverConfig`] bundles everything the cluster manager needs to request
//! clusters (log location, key pair, instance layout, spark-submit
//! defaults) together with polling and retry tuning. It serializes to JSON
//! and can be overridden from `DROVER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DroverError;
use crate::Result;

/// Default region for control-plane clients.
const DEFAULT_REGION: &str = "us-east-1";

/// Default interval between step state polls: 60 seconds.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroverConfig {
    /// Region for the EMR and S3 clients.
    pub region: String,

    /// `s3://` prefix clusters write their logs under.
    pub log_uri: Option<String>,

    /// EC2 key pair name attached to cluster instances.
    pub ec2_key_name: Option<String>,

    /// Interval between step state polls in `report_step` / `watch_step`.
    pub poll_interval: Duration,

    /// Retry policy for idempotent control-plane reads.
    pub retry: RetryPolicy,

    /// Shape of the clusters Drover requests.
    pub cluster: ClusterTemplate,

    /// How Spark jobs are turned into steps.
    pub spark: SparkSubmit,
}

impl Default for DroverConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            log_uri: None,
            ec2_key_name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            cluster: ClusterTemplate::default(),
            spark: SparkSubmit::default(),
        }
    }
}

impl DroverConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| DroverError::Config {
            message: format!("Failed to read config file {}: {e}", path.display()),
        })?;
        serde_json::from_str(&contents).map_err(|e| DroverError::Config {
            message: format!("Failed to parse config file {}: {e}", path.display()),
        })
    }

    /// Apply `DROVER_REGION`, `DROVER_LOG_URI`, `DROVER_KEY_NAME` and
    /// `DROVER_POLL_SECS` on top of this configuration.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(region) = lookup("DROVER_REGION") {
            self.region = region;
        }
        if let Some(log_uri) = lookup("DROVER_LOG_URI") {
            self.log_uri = Some(log_uri);
        }
        if let Some(key) = lookup("DROVER_KEY_NAME") {
            self.ec2_key_name = Some(key);
        }
        if let Some(secs) = lookup("DROVER_POLL_SECS") {
            let secs = secs.parse::<u64>().map_err(|e| DroverError::Config {
                message: format!("DROVER_POLL_SECS must be a whole number of seconds: {e}"),
            })?;
            if secs == 0 {
                return Err(DroverError::Config {
                    message: "DROVER_POLL_SECS must be at least 1".to_string(),
                });
            }
            self.poll_interval = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

/// Retry policy for transient control-plane failures.
///
/// The default makes a single attempt: nothing is retried unless the
/// caller opts in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first; `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between retries.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Make exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(15),
        }
    }

    /// Exponential backoff with the given number of attempts.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// EBS volumes attached to each instance of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbsVolumes {
    pub size_gb: i32,
    pub volume_type: String,
    pub volumes_per_instance: i32,
}

impl Default for EbsVolumes {
    fn default() -> Self {
        Self {
            size_gb: 32,
            volume_type: "gp2".to_string(),
            volumes_per_instance: 4,
        }
    }
}

/// One instance group (master, core, or task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    /// `MASTER`, `CORE` or `TASK`.
    pub role: String,
    pub instance_type: String,
    pub instance_count: i32,
    /// `SPOT` or `ON_DEMAND`.
    pub market: String,
    pub ebs: Option<EbsVolumes>,
}

impl InstanceGroup {
    fn spot(name: &str, role: &str, count: i32) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            instance_type: "m5.2xlarge".to_string(),
            instance_count: count,
            market: "SPOT".to_string(),
            ebs: Some(EbsVolumes::default()),
        }
    }
}

/// The shape of clusters requested from the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterTemplate {
    pub release_label: String,
    pub applications: Vec<String>,
    pub instance_groups: Vec<InstanceGroup>,
    pub ebs_root_volume_size: i32,
    pub job_flow_role: String,
    pub service_role: String,
    pub auto_scaling_role: Option<String>,
    pub scale_down_behavior: Option<String>,
    /// Properties of the `spark` configuration classification.
    pub spark_properties: Vec<(String, String)>,
    pub subnet_id: Option<String>,
    pub master_security_group: Option<String>,
    pub slave_security_group: Option<String>,
    pub visible_to_all_users: bool,
    pub termination_protected: bool,
}

impl Default for ClusterTemplate {
    fn default() -> Self {
        Self {
            release_label: "emr-5.27.0".to_string(),
            applications: ["Hadoop", "Hive", "Pig", "Hue", "Spark"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            instance_groups: vec![
                InstanceGroup::spot("Master - 1", "MASTER", 1),
                InstanceGroup::spot("Core - 2", "CORE", 2),
                InstanceGroup::spot("Task - 3", "TASK", 32),
            ],
            ebs_root_volume_size: 10,
            job_flow_role: "EMR_EC2_DefaultRole".to_string(),
            service_role: "EMR_DefaultRole".to_string(),
            auto_scaling_role: Some("EMR_AutoScaling_DefaultRole".to_string()),
            scale_down_behavior: Some("TERMINATE_AT_TASK_COMPLETION".to_string()),
            spark_properties: vec![("maximizeResourceAllocation".to_string(), "true".to_string())],
            subnet_id: None,
            master_security_group: None,
            slave_security_group: None,
            visible_to_all_users: true,
            termination_protected: false,
        }
    }
}

/// How a [`SparkJob`](crate::SparkJob) becomes a `command-runner.jar` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparkSubmit {
    /// The jar the control plane runs for every step.
    pub runner_jar: String,
    /// `--conf key=value` pairs.
    pub conf: Vec<(String, String)>,
    /// `--packages` coordinates.
    pub packages: Vec<String>,
    pub deploy_mode: String,
    pub master: String,
}

impl Default for SparkSubmit {
    fn default() -> Self {
        Self {
            runner_jar: "command-runner.jar".to_string(),
            conf: vec![("spark.driver.maxResultSize".to_string(), "4g".to_string())],
            packages: vec!["org.apache.spark:spark-avro_2.11:2.4.4".to_string()],
            deploy_mode: "cluster".to_string(),
            master: "yarn".to_string(),
        }
    }
}

impl SparkSubmit {
    /// The full `spark-submit` command line for a job packaged in `jar_path`.
    pub fn command(&self, jar_path: &str, job: &crate::SparkJob) -> Vec<String> {
        let mut args = vec!["spark-submit".to_string()];
        for (key, value) in &self.conf {
            args.push("--conf".to_string());
            args.push(format!("{key}={value}"));
        }
        if !self.packages.is_empty() {
            args.push("--packages".to_string());
            args.push(self.packages.join(","));
        }
        args.extend([
            "--deploy-mode".to_string(),
            self.deploy_mode.clone(),
            "--master".to_string(),
            self.master.clone(),
            "--class".to_string(),
            job.class_name.clone(),
            jar_path.to_string(),
        ]);
        args.extend(job.args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SparkJob;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DroverConfig::default();
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.cluster.instance_groups.len(), 3);
        assert_eq!(config.cluster.release_label, "emr-5.27.0");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = DroverConfig::default();
        config.log_uri = Some("s3://logs/emr/".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let back: DroverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.log_uri, config.log_uri);
        assert_eq!(back.cluster, config.cluster);
    }

    #[test]
    fn test_from_file_partial() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"log_uri": "s3://bucket/logs/", "region": "eu-west-1"}"#)
            .unwrap();
        let config = DroverConfig::from_file(tmp.path()).unwrap();
        assert_eq!(config.log_uri.as_deref(), Some("s3://bucket/logs/"));
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_from_file_invalid() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not json").unwrap();
        assert!(matches!(
            DroverConfig::from_file(tmp.path()),
            Err(DroverError::Config { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DROVER_LOG_URI", "s3://l/"),
            ("DROVER_KEY_NAME", "analytics"),
            ("DROVER_POLL_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let config = DroverConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.log_uri.as_deref(), Some("s3://l/"));
        assert_eq!(config.ec2_key_name.as_deref(), Some("analytics"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.region, DEFAULT_REGION);

        let bad = DroverConfig::default()
            .with_overrides(|name| (name == "DROVER_POLL_SECS").then(|| "soon".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let zero = DroverConfig::default()
            .with_overrides(|name| (name == "DROVER_POLL_SECS").then(|| "0".to_string()));
        assert!(matches!(zero, Err(DroverError::Config { .. })));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn test_spark_submit_command() {
        let submit = SparkSubmit::default();
        let job = SparkJob::new("com.acme.ClassA", ["x", "y"]);
        let cmd = submit.command("s3://jars/app.jar", &job);
        assert_eq!(
            cmd,
            vec![
                "spark-submit",
                "--conf",
                "spark.driver.maxResultSize=4g",
                "--packages",
                "org.apache.spark:spark-avro_2.11:2.4.4",
                "--deploy-mode",
                "cluster",
                "--master",
                "yarn",
                "--class",
                "com.acme.ClassA",
                "s3://jars/app.jar",
                "x",
                "y",
            ]
        );
    }
}

//! Caller-supplied submission options

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spark_log_classifier::DeployMode;

/// Default application name passed with `--name`
pub const DEFAULT_APP_NAME: &str = "default-name";

/// Everything the caller decides about one spark-submit invocation.
///
/// Optional flags are emitted only when set. `conf` and `env_vars` keep
/// insertion order so the command line is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionRequest {
    /// Application jar or Python file
    pub application: String,
    /// Arbitrary Spark configuration, one `--conf k=v` per entry
    pub conf: IndexMap<String, String>,
    pub files: Option<String>,
    pub py_files: Option<String>,
    pub archives: Option<String>,
    pub driver_class_path: Option<String>,
    pub jars: Option<String>,
    /// Main class of a Java or Scala application
    pub java_class: Option<String>,
    pub packages: Option<String>,
    pub exclude_packages: Option<String>,
    pub repositories: Option<String>,
    pub total_executor_cores: Option<u32>,
    pub executor_cores: Option<u32>,
    pub executor_memory: Option<String>,
    pub driver_memory: Option<String>,
    /// Path to a keytab; overrides a keytab carried by the connection
    pub keytab: Option<String>,
    /// Kerberos principal; overrides the connection's principal
    pub principal: Option<String>,
    pub proxy_user: Option<String>,
    pub name: String,
    pub num_executors: Option<u32>,
    /// Sleep between driver status queries
    #[serde(with = "duration_secs")]
    pub status_poll_interval: Duration,
    /// Passed verbatim after the application
    pub application_args: Vec<String>,
    /// Environment for the driver, injected per cluster manager
    pub env_vars: IndexMap<String, String>,
    pub verbose: bool,
    /// One of the allowed spark-submit binaries; overrides the connection
    pub spark_binary: Option<String>,
    pub properties_file: Option<String>,
    /// YARN queue; overrides the connection's queue
    pub yarn_queue: Option<String>,
    /// Overrides the connection's deploy mode
    pub deploy_mode: Option<DeployMode>,
    /// Authenticate through the Kerberos ticket cache named by KRB5CCNAME
    pub use_krb5ccache: bool,
}

impl Default for SubmissionRequest {
    fn default() -> Self {
        Self {
            application: String::new(),
            conf: IndexMap::new(),
            files: None,
            py_files: None,
            archives: None,
            driver_class_path: None,
            jars: None,
            java_class: None,
            packages: None,
            exclude_packages: None,
            repositories: None,
            total_executor_cores: None,
            executor_cores: None,
            executor_memory: None,
            driver_memory: None,
            keytab: None,
            principal: None,
            proxy_user: None,
            name: DEFAULT_APP_NAME.to_string(),
            num_executors: None,
            status_poll_interval: Duration::from_secs(1),
            application_args: Vec::new(),
            env_vars: IndexMap::new(),
            verbose: false,
            spark_binary: None,
            properties_file: None,
            yarn_queue: None,
            deploy_mode: None,
            use_krb5ccache: false,
        }
    }
}

impl SubmissionRequest {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            ..Self::default()
        }
    }

    /// Add a `--conf` entry, keeping insertion order
    pub fn with_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conf.insert(key.into(), value.into());
        self
    }

    /// Add a driver environment variable
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_deploy_mode(mut self, mode: DeployMode) -> Self {
        self.deploy_mode = Some(mode);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.application_args = args.into_iter().map(Into::into).collect();
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

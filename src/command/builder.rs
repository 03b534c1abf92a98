//! spark-submit command construction
//!
//! Token order is part of the interface: callers parse logged command lines,
//! so flags are always emitted in the same sequence.

use indexmap::IndexMap;
use spark_log_classifier::TargetKind;

use super::mask::masked_display;
use super::request::SubmissionRequest;
use crate::config::{ConfigError, HookSettings, TargetConnection};
use crate::process::{CommandSpec, ProcessEnv};

/// Variable naming the Kerberos credential cache
pub const KRB5CCNAME: &str = "KRB5CCNAME";

/// Management port of the standalone REST submission server
const REST_PORT_SUFFIX: &str = ":6066";

/// A built spark-submit invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCommand {
    pub tokens: Vec<String>,
    /// Variables added to the process environment of spark-submit
    pub env: IndexMap<String, String>,
}

impl SubmitCommand {
    /// Display form with secrets masked
    pub fn masked(&self) -> String {
        masked_display(&self.tokens)
    }

    /// Process spec running under `base` plus this command's variables
    pub fn to_spec(&self, base: &ProcessEnv) -> CommandSpec {
        CommandSpec::from_tokens(&self.tokens).with_env(base.with_overrides(&self.env))
    }
}

/// Build the spark-submit command line.
///
/// `env` is the environment the command will run in; it is consulted for
/// `KRB5CCNAME` when the ticket cache is requested.
pub fn build_submit_command(
    target: &TargetConnection,
    request: &SubmissionRequest,
    env: &ProcessEnv,
) -> Result<SubmitCommand, ConfigError> {
    let mut cmd = TokenList::new(&target.spark_binary);
    let mut process_env = IndexMap::new();

    cmd.flag("--master", &target.master);

    for (key, value) in &request.conf {
        cmd.flag("--conf", format!("{}={}", key, value));
    }

    if !request.env_vars.is_empty() {
        match target.kind {
            TargetKind::Yarn => {
                for (key, value) in &request.env_vars {
                    cmd.flag("--conf", format!("spark.yarn.appMasterEnv.{}={}", key, value));
                }
                // Hadoop/YARN client settings are read from the submitting process
                process_env.extend(request.env_vars.clone());
            }
            TargetKind::Kubernetes => {
                for (key, value) in &request.env_vars {
                    cmd.flag("--conf", format!("spark.kubernetes.driverEnv.{}={}", key, value));
                }
            }
            TargetKind::Standalone | TargetKind::Local if target.is_cluster_mode() => {
                return Err(ConfigError::UnsupportedEnvInjection);
            }
            TargetKind::Standalone | TargetKind::Local => {
                process_env.extend(request.env_vars.clone());
            }
        }
    }

    if target.kind == TargetKind::Kubernetes {
        if let Some(namespace) = non_empty(&target.namespace) {
            cmd.flag("--conf", format!("spark.kubernetes.namespace={}", namespace));
        }
    }

    cmd.optional("--properties-file", &request.properties_file);
    cmd.optional("--files", &request.files);
    cmd.optional("--py-files", &request.py_files);
    cmd.optional("--archives", &request.archives);
    cmd.optional("--driver-class-path", &request.driver_class_path);
    cmd.optional("--jars", &request.jars);
    cmd.optional("--packages", &request.packages);
    cmd.optional("--exclude-packages", &request.exclude_packages);
    cmd.optional("--repositories", &request.repositories);
    cmd.count("--num-executors", request.num_executors);
    cmd.count("--total-executor-cores", request.total_executor_cores);
    cmd.count("--executor-cores", request.executor_cores);
    cmd.optional("--executor-memory", &request.executor_memory);
    cmd.optional("--driver-memory", &request.driver_memory);
    cmd.optional("--keytab", &target.keytab);
    cmd.optional("--principal", &target.principal);

    if request.use_krb5ccache {
        if env.get(KRB5CCNAME).map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvVar(KRB5CCNAME.to_string()));
        }
        cmd.flag("--conf", "spark.kerberos.renewal.credentials=ccache");
    }

    cmd.optional("--proxy-user", &request.proxy_user);
    if !request.name.is_empty() {
        cmd.flag("--name", &request.name);
    }
    cmd.optional("--class", &request.java_class);
    if request.verbose {
        cmd.push("--verbose");
    }
    cmd.optional("--queue", &target.queue);
    if let Some(mode) = target.deploy_mode {
        cmd.flag("--deploy-mode", mode.as_str());
    }

    cmd.push(&request.application);
    for arg in &request.application_args {
        cmd.push(arg);
    }

    Ok(SubmitCommand {
        tokens: cmd.into_tokens(),
        env: process_env,
    })
}

/// Command querying the status of a standalone driver.
///
/// Masters on the REST port are queried over HTTP with curl; others through
/// `spark-submit --status`.
pub fn build_status_command(
    target: &TargetConnection,
    driver_id: &str,
    settings: &HookSettings,
) -> Vec<String> {
    if target.master.ends_with(REST_PORT_SUFFIX) {
        let base = target.master.replace("spark://", "http://");
        vec![
            settings.binaries.curl.clone(),
            "--max-time".to_string(),
            settings.status.curl_max_time_seconds.to_string(),
            format!("{}/v1/submissions/status/{}", base, driver_id),
        ]
    } else {
        let mut cmd = TokenList::new(&target.spark_binary);
        cmd.flag("--master", &target.master);
        cmd.flag("--status", driver_id);
        cmd.into_tokens()
    }
}

/// Command killing a standalone driver
pub fn build_driver_kill_command(target: &TargetConnection, driver_id: &str) -> Vec<String> {
    let mut cmd = TokenList::new(&target.spark_binary);
    cmd.flag("--master", &target.master);
    cmd.flag("--kill", driver_id);
    cmd.into_tokens()
}

/// Command killing a YARN application
pub fn build_yarn_kill_command(settings: &HookSettings, application_id: &str) -> Vec<String> {
    vec![
        settings.binaries.yarn.clone(),
        "application".to_string(),
        "-kill".to_string(),
        application_id.to_string(),
    ]
}

/// Command renewing a Kerberos ticket from a keytab into the configured cache
pub fn build_kinit_command(settings: &HookSettings, keytab: &str, principal: &str) -> Vec<String> {
    let mut cmd = TokenList::new(&settings.binaries.kinit);
    for flag in ["-f", "-a", "-k"] {
        cmd.push(flag);
    }
    cmd.flag("-t", keytab);
    cmd.flag("-c", &settings.kerberos.ccache);
    cmd.push(principal);
    cmd.into_tokens()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

struct TokenList {
    tokens: Vec<String>,
}

impl TokenList {
    fn new(program: &str) -> Self {
        Self {
            tokens: vec![program.to_string()],
        }
    }

    fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    fn flag(&mut self, flag: &str, value: impl Into<String>) {
        self.push(flag);
        self.push(value);
    }

    /// Emit `flag value` only for a non-empty value
    fn optional(&mut self, flag: &str, value: &Option<String>) {
        if let Some(value) = non_empty(value) {
            self.flag(flag, value);
        }
    }

    /// Emit `flag n` only for a non-zero count
    fn count(&mut self, flag: &str, value: Option<u32>) {
        if let Some(n) = value.filter(|n| *n > 0) {
            self.flag(flag, n.to_string());
        }
    }

    fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

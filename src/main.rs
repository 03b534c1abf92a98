//! Spark Submit Hook CLI
//!
//! Entry point for the `spark-submit-hook` command-line tool.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use spark_submit_hook::command::masked_display;
use spark_submit_hook::config::resolve_target;
use spark_submit_hook::logging::{init_tracing, LogFormat};
use spark_submit_hook::signal::install_interrupt_handler;
use spark_submit_hook::{
    ConnectionStore, DeployMode, HookSettings, SparkSubmitHook, SubmissionRequest,
};
use tracing::warn;

#[derive(Parser)]
#[command(name = "spark-submit-hook")]
#[command(about = "Submit and track Spark applications", version)]
struct Cli {
    /// Log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Path to connections file (default: ~/.config/spark-submit-hook/connections.toml)
    #[arg(long, global = true)]
    connections: Option<PathBuf>,

    /// Path to settings file (default: ~/.config/spark-submit-hook/settings.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Seconds to wait for spark-submit after SIGTERM on cancel
    #[arg(long, global = true)]
    grace_seconds: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an application and wait for it to finish
    Submit {
        #[command(flatten)]
        request: RequestArgs,

        /// Application jar or script
        application: String,

        /// Arguments passed to the application (after --)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show the target a connection resolves to
    Resolve {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print a command line with secrets masked
    Mask {
        /// Command tokens (after --)
        #[arg(last = true, required = true)]
        tokens: Vec<String>,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Connection id
    #[arg(long, default_value = "spark_default")]
    conn_id: String,

    /// Application name
    #[arg(long)]
    name: Option<String>,

    /// Spark configuration, KEY=VALUE (repeatable)
    #[arg(long = "conf", value_parser = parse_key_value)]
    conf: Vec<(String, String)>,

    /// Driver environment variable, KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    env_vars: Vec<(String, String)>,

    #[arg(long)]
    deploy_mode: Option<DeployMode>,

    #[arg(long)]
    queue: Option<String>,

    #[arg(long)]
    spark_binary: Option<String>,

    #[arg(long)]
    class: Option<String>,

    #[arg(long)]
    jars: Option<String>,

    #[arg(long)]
    files: Option<String>,

    #[arg(long)]
    py_files: Option<String>,

    #[arg(long)]
    archives: Option<String>,

    #[arg(long)]
    driver_class_path: Option<String>,

    #[arg(long)]
    packages: Option<String>,

    #[arg(long)]
    exclude_packages: Option<String>,

    #[arg(long)]
    repositories: Option<String>,

    #[arg(long)]
    total_executor_cores: Option<u32>,

    #[arg(long)]
    executor_cores: Option<u32>,

    #[arg(long)]
    executor_memory: Option<String>,

    #[arg(long)]
    driver_memory: Option<String>,

    #[arg(long)]
    num_executors: Option<u32>,

    /// Keytab file for Kerberos
    #[arg(long)]
    keytab: Option<String>,

    #[arg(long)]
    principal: Option<String>,

    /// Authenticate with the Kerberos ticket cache
    #[arg(long)]
    use_krb5ccache: bool,

    #[arg(long)]
    proxy_user: Option<String>,

    #[arg(long)]
    properties_file: Option<String>,

    /// Seconds between driver status polls
    #[arg(long, default_value_t = 1.0)]
    poll_interval: f64,

    #[arg(long)]
    verbose: bool,
}

impl RequestArgs {
    fn into_request(self, application: String, args: Vec<String>) -> SubmissionRequest {
        let mut request = SubmissionRequest::new(application).with_args(args);
        if let Some(name) = self.name {
            request.name = name;
        }
        request.conf.extend(self.conf);
        request.env_vars.extend(self.env_vars);
        request.deploy_mode = self.deploy_mode;
        request.yarn_queue = self.queue;
        request.spark_binary = self.spark_binary;
        request.java_class = self.class;
        request.jars = self.jars;
        request.files = self.files;
        request.py_files = self.py_files;
        request.archives = self.archives;
        request.driver_class_path = self.driver_class_path;
        request.packages = self.packages;
        request.exclude_packages = self.exclude_packages;
        request.repositories = self.repositories;
        request.total_executor_cores = self.total_executor_cores;
        request.executor_cores = self.executor_cores;
        request.executor_memory = self.executor_memory;
        request.driver_memory = self.driver_memory;
        request.num_executors = self.num_executors;
        request.keytab = self.keytab;
        request.principal = self.principal;
        request.use_krb5ccache = self.use_krb5ccache;
        request.proxy_user = self.proxy_user;
        request.properties_file = self.properties_file;
        request.verbose = self.verbose;
        if self.poll_interval.is_finite() && self.poll_interval > 0.0 {
            request.status_poll_interval = Duration::from_secs_f64(self.poll_interval);
        }
        request
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_format) {
        eprintln!("Error initializing logging: {}", e);
    }

    match cli.command {
        Commands::Submit {
            request,
            application,
            args,
        } => {
            let conn_id = request.conn_id.clone();
            let request = request.into_request(application, args);
            run_submit(
                &conn_id,
                request,
                cli.connections,
                cli.settings,
                cli.grace_seconds,
            );
        }
        Commands::Resolve { request } => {
            let conn_id = request.conn_id.clone();
            let request = request.into_request(String::new(), Vec::new());
            run_resolve(
                &conn_id,
                &request,
                cli.connections,
                cli.settings,
                cli.grace_seconds,
            );
        }
        Commands::Mask { tokens } => {
            println!("{}", masked_display(&tokens));
        }
    }
}

fn run_submit(
    conn_id: &str,
    request: SubmissionRequest,
    connections_path: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    grace_seconds: Option<u64>,
) {
    let settings = load_settings(settings_path, grace_seconds);
    let connections = load_connections(connections_path);

    let hook = match SparkSubmitHook::new(conn_id, request, &connections, settings) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if let Err(e) = install_interrupt_handler(hook.cancel_handle()) {
        warn!(error = %e, "Failed to install interrupt handler");
    }

    match hook.submit() {
        Ok(state) => {
            print_json(&json!({ "conn_id": conn_id, "state": state }));
        }
        Err(e) => {
            print_json(&json!({
                "conn_id": conn_id,
                "state": hook.run_state(),
                "error": e.to_string(),
            }));
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_resolve(
    conn_id: &str,
    request: &SubmissionRequest,
    connections_path: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    grace_seconds: Option<u64>,
) {
    let settings = load_settings(settings_path, grace_seconds);
    let connections = load_connections(connections_path);

    match resolve_target(conn_id, &connections, request, &settings) {
        Ok(target) => print_json(&target),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn load_settings(path: Option<PathBuf>, grace_seconds: Option<u64>) -> HookSettings {
    let path = path.or_else(HookSettings::default_path);
    let overrides = grace_seconds.map(|secs| json!({ "termination_grace_seconds": secs }));

    match HookSettings::load(path.as_deref(), overrides) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(2);
        }
    }
}

/// A missing or unreadable connections file leaves every lookup on the
/// default target.
fn load_connections(path: Option<PathBuf>) -> ConnectionStore {
    let path = match path.map(Ok).unwrap_or_else(ConnectionStore::default_path) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "No connections file, using defaults");
            return ConnectionStore::empty();
        }
    };

    match ConnectionStore::load(&path) {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not load connections, using defaults");
            ConnectionStore::empty()
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

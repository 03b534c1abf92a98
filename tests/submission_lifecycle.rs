//! Submission lifecycle tests
//!
//! Drives full submissions against a scripted runner: launching
//! spark-submit, following its log, and polling standalone drivers.

use std::sync::Arc;
use std::time::Duration;

use spark_submit_hook::config::ConfigError;
use spark_submit_hook::mock::{ScriptedResponse, ScriptedRunner};
use spark_submit_hook::process::ProcessEnv;
use spark_submit_hook::{
    ConnectionStore, DeployMode, DriverState, ExecutionError, HookError, HookSettings,
    SparkSubmitHook, SubmissionPhase, SubmissionRequest,
};

const CONNECTIONS: &str = r#"
[[connection]]
conn_id = "spark_rest"
host = "spark://spark-master"
port = 6066

[connection.extra]
deploy-mode = "cluster"

[[connection]]
conn_id = "spark_k8s"
host = "k8s://https://k8s-master"
port = 443

[connection.extra]
deploy-mode = "cluster"
namespace = "spark-jobs"

[[connection]]
conn_id = "spark_yarn"
host = "yarn"

[connection.extra]
deploy-mode = "cluster"
queue = "root.etl"
"#;

const DRIVER_ID: &str = "driver-20171128111415-0001";
const CURL: &str = "/usr/bin/curl";

fn connections() -> ConnectionStore {
    ConnectionStore::parse(CONNECTIONS).unwrap()
}

fn request() -> SubmissionRequest {
    SubmissionRequest::new("/jobs/etl.jar").with_poll_interval(Duration::from_millis(1))
}

fn hook(conn_id: &str, request: SubmissionRequest, runner: &Arc<ScriptedRunner>) -> SparkSubmitHook {
    SparkSubmitHook::new(conn_id, request, &connections(), HookSettings::default())
        .unwrap()
        .with_runner(runner.clone())
        .with_env(ProcessEnv::new())
}

fn submitted_log() -> Vec<String> {
    vec![
        "Running Spark using the REST application submission protocol.".to_string(),
        format!("  \"submissionId\" : \"{}\",", DRIVER_ID),
    ]
}

fn driver_state(state: &str) -> ScriptedResponse {
    ScriptedResponse::success([
        "{".to_string(),
        "  \"action\" : \"SubmissionStatusResponse\",".to_string(),
        format!("  \"driverState\" : \"{}\",", state),
        format!("  \"submissionId\" : \"{}\",", DRIVER_ID),
        "  \"success\" : true".to_string(),
        "}".to_string(),
    ])
}

// =============================================================================
// Standalone cluster
// =============================================================================

#[test]
fn test_standalone_cluster_tracks_driver_to_finished() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    runner.script(CURL, driver_state("FINISHED"));

    let state = hook("spark_rest", request(), &runner).submit().unwrap();

    assert_eq!(state.phase, SubmissionPhase::Succeeded);
    assert_eq!(state.driver_id.as_deref(), Some(DRIVER_ID));
    assert_eq!(state.driver_status, Some(DriverState::Finished));
    assert_eq!(state.process_exit_code, Some(0));
    assert!(state.finished_at.is_some());

    let polls = runner.calls_to(CURL);
    assert_eq!(polls.len(), 1);
    assert_eq!(
        polls[0].tokens(),
        vec![
            CURL.to_string(),
            "--max-time".to_string(),
            "30".to_string(),
            format!("http://spark-master:6066/v1/submissions/status/{}", DRIVER_ID),
        ]
    );
}

#[test]
fn test_standalone_polls_until_terminal() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    runner.script(CURL, driver_state("SUBMITTED"));
    runner.script(CURL, driver_state("RUNNING"));
    runner.script(CURL, driver_state("RUNNING"));
    runner.script(CURL, driver_state("FINISHED"));

    let state = hook("spark_rest", request(), &runner).submit().unwrap();

    assert_eq!(state.driver_status, Some(DriverState::Finished));
    assert_eq!(runner.calls_to(CURL).len(), 4);
}

#[test]
fn test_killed_driver_fails_submission() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    runner.script(CURL, driver_state("KILLED"));

    let hook = hook("spark_rest", request(), &runner);
    let err = hook.submit().unwrap_err();

    match err {
        HookError::Execution(ExecutionError::DriverFailed { driver_id, status }) => {
            assert_eq!(driver_id, DRIVER_ID);
            assert_eq!(status, DriverState::Killed);
        }
        other => panic!("expected DriverFailed, got {:?}", other),
    }
    assert_eq!(hook.run_state().phase, SubmissionPhase::Failed);
}

#[test]
fn test_consecutive_poll_failures_exhaust_budget() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    runner.script(CURL, ScriptedResponse::exit(28, Vec::<String>::new()));

    let err = hook("spark_rest", request(), &runner).submit().unwrap_err();

    match err {
        HookError::Execution(ExecutionError::StatusPollExhausted { attempts, status }) => {
            assert_eq!(attempts, 10);
            assert_eq!(status, "28");
        }
        other => panic!("expected StatusPollExhausted, got {:?}", other),
    }
    assert_eq!(runner.calls_to(CURL).len(), 10);
}

#[test]
fn test_successful_poll_resets_failure_count() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    for _ in 0..9 {
        runner.script(CURL, ScriptedResponse::exit(28, Vec::<String>::new()));
    }
    runner.script(CURL, driver_state("RUNNING"));
    for _ in 0..9 {
        runner.script(CURL, ScriptedResponse::exit(28, Vec::<String>::new()));
    }
    runner.script(CURL, driver_state("FINISHED"));

    let state = hook("spark_rest", request(), &runner).submit().unwrap();

    assert_eq!(state.driver_status, Some(DriverState::Finished));
    assert_eq!(runner.calls_to(CURL).len(), 20);
}

#[test]
fn test_unreachable_status_binary_counts_as_missed() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));
    runner.script(CURL, ScriptedResponse::spawn_failure(std::io::ErrorKind::NotFound));

    let err = hook("spark_rest", request(), &runner).submit().unwrap_err();

    assert!(matches!(
        err,
        HookError::Execution(ExecutionError::StatusPollExhausted { attempts: 10, .. })
    ));
}

#[test]
fn test_missing_driver_id_is_an_error() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script(
        "spark-submit",
        ScriptedResponse::success(["Running Spark using the REST application submission protocol."]),
    );

    let err = hook("spark_rest", request(), &runner).submit().unwrap_err();

    assert!(matches!(err, HookError::Execution(ExecutionError::MissingDriverId)));
    assert!(runner.calls_to(CURL).is_empty());
}

#[test]
fn test_standalone_client_mode_does_not_track() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));

    let request = request().with_deploy_mode(DeployMode::Client);
    let state = hook("spark_rest", request, &runner).submit().unwrap();

    assert_eq!(state.phase, SubmissionPhase::Succeeded);
    assert_eq!(state.driver_id, None);
    assert!(runner.calls_to(CURL).is_empty());
}

#[test]
fn test_env_vars_rejected_for_standalone_cluster() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(submitted_log()));

    let request = request().with_env_var("PYSPARK_PYTHON", "python3");
    let hook = hook("spark_rest", request, &runner);
    let err = hook.submit().unwrap_err();

    assert!(matches!(
        err,
        HookError::Config(ConfigError::UnsupportedEnvInjection)
    ));
    assert_eq!(err.exit_code(), 2);
    assert!(runner.calls().is_empty());
    assert_eq!(hook.run_state().phase, SubmissionPhase::Failed);
}

// =============================================================================
// Submit process outcome
// =============================================================================

#[test]
fn test_nonzero_exit_fails_with_masked_command() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::exit(1, ["Exception in thread main"]));

    let request = SubmissionRequest::new("/jobs/etl.jar")
        .with_conf("spark.hadoop.fs.s3a.secret.key", "topsecret");
    let hook = hook("spark_yarn", request, &runner);
    let err = hook.submit().unwrap_err();

    match &err {
        HookError::Execution(ExecutionError::NonZeroExit { command, status }) => {
            assert_eq!(status.code, Some(1));
            assert!(!command.contains("topsecret"));
            assert!(command.contains("spark.hadoop.fs.s3a.secret.key=******"));
        }
        other => panic!("expected NonZeroExit, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert_eq!(hook.run_state().process_exit_code, Some(1));
}

#[test]
fn test_spawn_failure_reported() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script(
        "spark-submit",
        ScriptedResponse::spawn_failure(std::io::ErrorKind::PermissionDenied),
    );

    let err = hook("spark_yarn", request(), &runner).submit().unwrap_err();

    assert!(matches!(err, HookError::Execution(ExecutionError::Spawn { .. })));
}

#[test]
fn test_yarn_cluster_records_application_id() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script(
        "spark-submit",
        ScriptedResponse::success([
            "INFO Client: Submitting application application_1486558679801_1820 to ResourceManager",
            "INFO Client: Application report for application_1486558679801_1820 (state: FINISHED)",
        ]),
    );

    let request = request().with_env_var("HADOOP_USER_NAME", "etl");
    let state = hook("spark_yarn", request, &runner).submit().unwrap();

    assert_eq!(
        state.yarn_application_id.as_deref(),
        Some("application_1486558679801_1820")
    );

    let submit = &runner.calls_to("spark-submit")[0];
    let tokens = submit.tokens();
    assert!(tokens.contains(&"spark.yarn.appMasterEnv.HADOOP_USER_NAME=etl".to_string()));
    assert!(tokens.windows(2).any(|w| w == ["--queue", "root.etl"]));
    let env = submit.env.as_ref().unwrap();
    assert_eq!(env.get("HADOOP_USER_NAME"), Some("etl"));
}

#[test]
fn test_hook_is_single_use() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(Vec::<String>::new()));

    let hook = hook("spark_yarn", request(), &runner);
    let first = hook.submit().unwrap();

    let err = hook.submit().unwrap_err();
    assert!(matches!(err, HookError::Execution(ExecutionError::Phase(_))));

    // The finished run is left as it was
    let state = hook.run_state();
    assert_eq!(state.phase, SubmissionPhase::Succeeded);
    assert_eq!(state.finished_at, first.finished_at);
    assert_eq!(runner.calls_to("spark-submit").len(), 1);
}

// =============================================================================
// Kubernetes
// =============================================================================

#[test]
fn test_kubernetes_nonzero_spark_exit_code_fails() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script(
        "spark-submit",
        ScriptedResponse::success([
            "pod name: spark-pi-edf2ace37be7353a958b38733a12f8e6-driver",
            "Exit code: 1",
        ]),
    );

    let hook = hook("spark_k8s", request(), &runner);
    let err = hook.submit().unwrap_err();

    match err {
        HookError::Execution(ExecutionError::KubernetesExitCode {
            status,
            spark_exit_code,
            ..
        }) => {
            assert!(status.success());
            assert_eq!(spark_exit_code, Some(1));
        }
        other => panic!("expected KubernetesExitCode, got {:?}", other),
    }

    let state = hook.run_state();
    assert_eq!(
        state.kubernetes_driver_pod.as_deref(),
        Some("spark-pi-edf2ace37be7353a958b38733a12f8e6-driver")
    );
}

#[test]
fn test_kubernetes_cluster_without_exit_code_fails() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script(
        "spark-submit",
        ScriptedResponse::success(["pod name: spark-pi-edf2ace37be7353a958b38733a12f8e6-driver"]),
    );

    let err = hook("spark_k8s", request(), &runner).submit().unwrap_err();

    assert!(matches!(
        err,
        HookError::Execution(ExecutionError::KubernetesExitCode {
            spark_exit_code: None,
            ..
        })
    ));
}

#[test]
fn test_kubernetes_client_mode_succeeds_without_exit_code() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("spark-submit", ScriptedResponse::success(["Pi is roughly 3.14"]));

    let request = request().with_deploy_mode(DeployMode::Client);
    let state = hook("spark_k8s", request, &runner).submit().unwrap();

    assert_eq!(state.spark_exit_code, Some(0));
    assert_eq!(state.phase, SubmissionPhase::Succeeded);

    let tokens = runner.calls_to("spark-submit")[0].tokens();
    assert!(tokens.contains(&"spark.kubernetes.namespace=spark-jobs".to_string()));
}

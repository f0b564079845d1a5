//! Integration tests for the CLI binary.
//!
//! `verify` runs against a real API server backed by the in-memory store,
//! started on an ephemeral port for each test.

use assert_cmd::Command;
use predicates::prelude::*;
use tokio::runtime::Runtime;

use neoride_service::router;
use neoride_service_shared::test_utils::{test_state, unreachable_state};
use neoride_service_shared::{AppState, MetricsConfig};

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("neoride-cli").expect("binary exists");
    cmd.env("NO_COLOR", "1").env_remove("LANG").env_remove("LC_ALL");
    cmd
}

/// Serve the API on 127.0.0.1 until the returned runtime is dropped.
fn spawn_api(state: AppState) -> (Runtime, String) {
    let runtime = Runtime::new().expect("tokio runtime");
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = router(state, &MetricsConfig::default());
    runtime.spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (runtime, format!("http://{addr}"))
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("db-check"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn db_check_without_uri_names_the_variable() {
    cli()
        .env_remove("MONGODB_URI")
        .arg("db-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MONGODB_URI"));
}

#[test]
fn db_check_unreachable_server_prints_tips() {
    cli()
        .args([
            "db-check",
            "--uri",
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=300&connectTimeoutMS=300",
        ])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .failure()
        .stdout(predicate::str::contains("[FAIL] connect failed"))
        .stdout(predicate::str::contains("Troubleshooting tips:"))
        .stderr(predicate::str::contains("database check failed"));
}

#[test]
fn verify_passes_against_healthy_api() {
    let (_runtime, base_url) = spawn_api(test_state());

    cli()
        .args(["verify", "--base-url", &base_url, "--timeout", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] /api/health - Status: 200"))
        .stdout(predicate::str::contains("Database connection: connected"))
        .stdout(predicate::str::contains("Successful: 4/4"));
}

#[test]
fn verify_reports_database_outage() {
    let (_runtime, base_url) = spawn_api(unreachable_state());

    cli()
        .args(["verify", "--base-url", &base_url])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[FAIL] /api/health - Status: 500"))
        .stdout(predicate::str::contains("Database connection: not connected"))
        .stdout(predicate::str::contains("[OK] /api/debug - Status: 200"))
        .stdout(predicate::str::contains("Failed: 2/4"))
        .stderr(predicate::str::contains("2 of 4 endpoints failed"));
}

#[test]
fn verify_unreachable_base_url_fails_every_endpoint() {
    cli()
        .args(["verify", "--base-url", "http://127.0.0.1:1", "--timeout", "2"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed: 4/4"));
}

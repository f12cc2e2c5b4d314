use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn taskforge() -> Command {
    let mut cmd = Command::cargo_bin("taskforge").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    taskforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: taskforge [OPTIONS] <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("wizard"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("--provider <PROVIDER>"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_run_help() {
    taskforge()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: taskforge run"))
        .stdout(predicate::str::contains("--chain"))
        .stdout(predicate::str::contains("--analysis-file <ANALYSIS_FILE>"))
        .stdout(predicate::str::contains("--delay-ms <DELAY_MS>"));
}

#[test]
fn test_cli_serve_help() {
    taskforge()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: taskforge serve"))
        .stdout(predicate::str::contains("--port <PORT>"));
}

#[test]
fn test_cli_no_command() {
    taskforge()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: taskforge [OPTIONS] <COMMAND>"));
}

#[test]
fn test_cli_rejects_bad_template() {
    let mut template = tempfile::NamedTempFile::new().unwrap();
    write!(template, "no placeholders here").unwrap();

    taskforge()
        .args(["run", "--delay-ms", "0", "--template"])
        .arg(template.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("An error occurred"))
        .stderr(predicate::str::contains("missing the `history` placeholder"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_run_prints_generated_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Assistant: <function>def reset(): pass</function>" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut analysis = tempfile::NamedTempFile::new().unwrap();
    write!(analysis, "Login failures spiked last week.").unwrap();
    let uri = server.uri();
    let analysis_path = analysis.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        taskforge()
            .args(["--api-base", &uri, "--api-key", "test-key", "run", "--delay-ms", "0", "--analysis-file"])
            .arg(&analysis_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Login failures spiked last week."))
            .stdout(predicate::str::contains("Task definition generation complete."))
            .stdout(predicate::str::contains("Generated Output:"))
            .stdout(predicate::str::contains("Extracted function:\ndef reset(): pass"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_run_reports_remote_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || {
        taskforge()
            .args(["--api-base", &uri, "run", "--delay-ms", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("An error occurred"))
            .stderr(predicate::str::contains("invalid api key"));
    })
    .await
    .unwrap();
}

use std::process::{Command, Output};

use base64::Engine;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fixture(name: &str) -> String {
    let dir = env!("CARGO_MANIFEST_DIR");
    format!("{dir}/tests/fixtures/{name}")
}

fn run_lockscan(server: &MockServer, extra_args: &[&str]) -> Output {
    let uri = server.uri();
    let mut args = vec!["--org", "acme", "--team", "platform", "--api-base", uri.as_str()];
    args.extend_from_slice(extra_args);

    Command::new(env!("CARGO_BIN_EXE_lockscan"))
        .args(&args)
        .env("GITHUB_TOKEN", "test-token")
        .env_remove("ORG")
        .env_remove("TEAM_SLUG")
        .env_remove("GITHUB_API_URL")
        .output()
        .expect("failed to execute lockscan")
}

fn encode(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text)
}

async fn mount_team_repos(server: &MockServer, repos: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/orgs/acme/teams/platform/repos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repos))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/teams/platform/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_repo_with_lockfile(server: &MockServer, full_name: &str, lockfile: &str, text: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{full_name}/git/trees/main")))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tree": [{"path": lockfile, "type": "blob"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{full_name}/contents/{lockfile}")))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": encode(text),
            "encoding": "base64",
        })))
        .mount(server)
        .await;
}

fn web_repo() -> serde_json::Value {
    json!([{"full_name": "acme/web", "default_branch": "main"}])
}

const METAMODEL_LOCK: &str = r#"{
    "packages": {
        "node_modules/@accordproject/concerto-metamodel": {"version": "3.12.5"}
    }
}"#;

#[tokio::test(flavor = "multi_thread")]
async fn reports_match_grouped_by_repo_and_lockfile() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(&server, "acme/web", "package-lock.json", METAMODEL_LOCK).await;

    let output = run_lockscan(&server, &[]);

    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("=== Scan Result ==="));
    assert!(stdout.contains("acme/web"));
    assert!(stdout.contains("  package-lock.json"));
    assert!(stdout.contains("    - @accordproject/concerto-metamodel@3.12.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_team_prints_empty_result_message() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(
        &server,
        "acme/web",
        "package-lock.json",
        r#"{"packages": {"node_modules/lodash": {"version": "4.17.21"}}}"#,
    )
    .await;

    let output = run_lockscan(&server, &[]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("No repositories found using the target packages."));
}

#[tokio::test(flavor = "multi_thread")]
async fn enumeration_failure_exits_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/teams/platform/repos"))
        .respond_with(ResponseTemplate::new(403).set_body_string("token lacks team scope"))
        .mount(&server)
        .await;

    let output = run_lockscan(&server, &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("token lacks team scope"));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(
        !stdout.contains("=== Scan Result ==="),
        "no report should be printed when enumeration fails"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn json_flag_emits_json_report() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(&server, "acme/web", "package-lock.json", METAMODEL_LOCK).await;

    let output = run_lockscan(&server, &["--json"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["repo"], "acme/web");
    assert_eq!(
        arr[0]["lockfiles"][0]["matches"][0]["package"],
        "@accordproject/concerto-metamodel"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn json_flag_produces_json_tracing_on_stderr() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(&server, "acme/web", "package-lock.json", METAMODEL_LOCK).await;

    let output = run_lockscan(&server, &["--json"]);

    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(!lines.is_empty(), "progress logging should reach stderr");
    for line in &lines {
        assert!(
            serde_json::from_str::<serde_json::Value>(line).is_ok(),
            "stderr line should be valid JSON: {line}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn targets_file_replaces_builtin_set() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(
        &server,
        "acme/web",
        "package-lock.json",
        r#"{
            "packages": {
                "node_modules/left-pad": {"version": "1.3.0"},
                "node_modules/@accordproject/concerto-metamodel": {"version": "3.12.5"}
            }
        }"#,
    )
    .await;

    let output = run_lockscan(&server, &["--targets", &fixture("targets.json")]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("    - left-pad@1.3.0"));
    assert!(
        !stdout.contains("concerto-metamodel"),
        "builtin targets should not apply when a target file is given"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_targets_file_exits_with_error() {
    let server = MockServer::start().await;

    let output = run_lockscan(&server, &["--targets", "/nonexistent/targets.json"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("error:"));
}

#[test]
fn missing_org_and_team_exits_with_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_lockscan"))
        .env_remove("ORG")
        .env_remove("TEAM_SLUG")
        .output()
        .expect("failed to execute lockscan");

    assert!(!output.status.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn pnpm_lockfile_is_scanned_end_to_end() {
    let server = MockServer::start().await;
    mount_team_repos(&server, web_repo()).await;
    mount_repo_with_lockfile(
        &server,
        "acme/web",
        "pnpm-lock.yaml",
        "lockfileVersion: '6.0'\npackages:\n  /@accordproject/concerto-linter@3.24.1:\n    dev: false\n",
    )
    .await;

    let output = run_lockscan(&server, &[]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("  pnpm-lock.yaml"));
    assert!(stdout.contains("    - @accordproject/concerto-linter@3.24.1"));
}

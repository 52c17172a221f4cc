use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

// Nothing listens on the discard port, so any request fails fast.
const UNREACHABLE: &str = "http://127.0.0.1:9";

const ENV_VARS: [&str; 4] = [
    "DRONE_SERVER",
    "DRONE_TOKEN",
    "GITLAB_DRONE_SERVER",
    "GITLAB_DRONE_TOKEN",
];

#[allow(deprecated)]
fn cli(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("drone-deploy").expect("binary");
    cmd.current_dir(workdir).env("RUST_LOG", "error");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn cli_with_env(workdir: &Path) -> Command {
    let mut cmd = cli(workdir);
    cmd.env("DRONE_SERVER", UNREACHABLE)
        .env("DRONE_TOKEN", "t-other")
        .env("GITLAB_DRONE_SERVER", UNREACHABLE)
        .env("GITLAB_DRONE_TOKEN", "t-gitlab");
    cmd
}

const UNTAGGED: &str = "\
teamA:
  svc1:
    gitlab: false
    drone_repo: a/1
teamB:
  gitlab: true
  drone_repo: b/2
";

#[test]
fn missing_environment_is_fatal() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("blocal.yml"), UNTAGGED).unwrap();

    cli(temp.path())
        .args(["deploy", "--target", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DRONE_SERVER"));
}

#[test]
fn empty_environment_value_counts_as_missing() {
    let temp = tempdir().unwrap();

    cli_with_env(temp.path())
        .env("GITLAB_DRONE_TOKEN", "")
        .args(["report", "--repo", "org/x", "--store", "gitlab"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITLAB_DRONE_TOKEN"));
}

#[test]
fn repo_without_store_is_rejected() {
    let temp = tempdir().unwrap();

    cli_with_env(temp.path())
        .args(["report", "--repo", "org/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--store"));
}

#[test]
fn unknown_store_is_rejected() {
    let temp = tempdir().unwrap();

    cli_with_env(temp.path())
        .args(["report", "--repo", "org/x", "--store", "github"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("github"));
}

#[test]
fn invalid_leaf_is_fatal_before_any_request() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("bad.yml");
    fs::write(&config, "svc:\n  gitlab: maybe\n  drone_repo: org/svc\n").unwrap();

    cli_with_env(temp.path())
        .arg("populate")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"))
        .stderr(predicate::str::contains("gitlab"));
}

#[test]
fn missing_config_file_is_fatal() {
    let temp = tempdir().unwrap();

    cli_with_env(temp.path())
        .args(["populate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("blocal.yml"));
}

#[test]
fn blank_deploy_target_is_fatal() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("blocal.yml"), UNTAGGED).unwrap();

    cli_with_env(temp.path())
        .args(["deploy", "--target", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("deploy target must not be empty"));
}

#[test]
fn deploy_without_tags_prints_nothing() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("blocal.yml"), UNTAGGED).unwrap();

    cli_with_env(temp.path())
        .args(["deploy", "--target", "production"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn populate_with_unreachable_server_keeps_document_and_exits_zero() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("blocal.yml"), UNTAGGED).unwrap();

    cli_with_env(temp.path())
        .args(["populate", "--timeout-secs", "5"])
        .assert()
        .success()
        .stdout(UNTAGGED);
}

#[test]
fn populate_writes_output_file() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("blocal.yml"), UNTAGGED).unwrap();
    let output = temp.path().join("out.yml");

    cli_with_env(temp.path())
        .args(["populate", "--store", "other", "--repo", "nobody/uses-this"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(fs::read_to_string(&output).unwrap(), UNTAGGED);
}

#[test]
fn report_failure_is_inline_notice() {
    let temp = tempdir().unwrap();

    cli_with_env(temp.path())
        .args(["report", "--repo", "org/x", "--store", "other"])
        .args(["--timeout-secs", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("**ORG/X**"))
        .stdout(predicate::str::contains("skipped org/x:"));
}

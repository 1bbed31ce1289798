//! The `soldeploy` binary.

use predicates::prelude::*;
use solution_deploy::config::GlobalConfig;

use crate::common::TestEnv;

#[test]
fn test_help_lists_commands() {
    let env = TestEnv::new();
    env.soldeploy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_config_path_honours_flag() {
    let env = TestEnv::new();
    env.soldeploy()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(env.config_path().display().to_string()));
}

#[tokio::test]
async fn test_set_portal_then_show_masks_token() {
    let env = TestEnv::new();
    env.soldeploy()
        .args([
            "config",
            "set-portal",
            "dest",
            "--url",
            "https://dest.example.com/portal",
            "--username",
            "casey",
            "--token",
            "s3cret-token",
        ])
        .assert()
        .success();

    let config = GlobalConfig::load_from(&env.config_path()).await.unwrap();
    assert_eq!(config.portal("dest").unwrap().token.as_deref(), Some("s3cret-token"));

    env.soldeploy()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://dest.example.com/portal"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("s3cret-token").not());
}

#[test]
fn test_unknown_profile_is_reported() {
    let env = TestEnv::new();
    env.soldeploy()
        .args(["plan", "--source", "nowhere", "sol1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("portal profile 'nowhere' is not configured"))
        .stderr(predicate::str::contains("soldeploy config path"));
}

#[test]
fn test_create_requires_items() {
    let env = TestEnv::new();
    env.soldeploy().args(["create", "--source", "src", "--title", "T"]).assert().failure();
}

#[test]
fn test_invalid_set_is_rejected_by_parser() {
    let env = TestEnv::new();
    env.soldeploy()
        .args(["deploy", "--source", "a", "--dest", "b", "--set", "novalue", "sol1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

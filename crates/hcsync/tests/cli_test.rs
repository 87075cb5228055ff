#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

mod common;

use assert_cmd::Command;
use common::TestEnv;
use predicates::prelude::*;

const ACCOUNTS: &str = "  - id: az-prod\n    vendor: azure\n  - id: tc-prod\n    vendor: tcloud\n    profile: prod\n";

fn hcsync(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("hcsync").unwrap();
    cmd.current_dir(env.path())
        .env("HCSYNC_CONFIG_PATH", &env.config_path)
        .env_remove("HCSYNC_ACCOUNT")
        .env_remove("HCSYNC_REGION");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("hcsync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("status"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("hcsync").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hcsync"));
}

/// syncコマンドのヘルプにスコープ指定が並ぶことを確認
#[test]
fn test_sync_help() {
    let mut cmd = Command::cargo_bin("hcsync").unwrap();
    cmd.args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--account"))
        .stdout(predicate::str::contains("--region"))
        .stdout(predicate::str::contains("--resource-group"))
        .stdout(predicate::str::contains("--ids"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("hcsync").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// state が無い場合は全件 0 で表示される
#[test]
fn test_status_empty_state() {
    let env = TestEnv::new(ACCOUNTS);
    hcsync(&env)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("cvm"))
        .stdout(predicate::str::contains("cvm_eip"))
        .stdout(predicate::str::contains("az-prod"))
        .stdout(predicate::str::contains("profile: prod"));
}

/// Azure はリソースグループ無しでは検証で失敗し、ロックも残らない
#[test]
fn test_sync_azure_without_resource_group() {
    let env = TestEnv::new(ACCOUNTS);
    hcsync(&env)
        .args(["sync", "--account", "az-prod", "--region", "eastus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("resource group"));

    assert!(!env.state_dir().join("lock.json").exists());
}

/// 設定に無いアカウントは --vendor が必要
#[test]
fn test_sync_unknown_account_needs_vendor() {
    let env = TestEnv::new(ACCOUNTS);
    hcsync(&env)
        .args(["sync", "--account", "other", "--region", "us-east-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--vendor"));
}

/// 不明な資源種別は plan で拒否される
#[test]
fn test_plan_unknown_kind() {
    let env = TestEnv::new(ACCOUNTS);
    hcsync(&env)
        .args(["plan", "--account", "tc-prod", "--region", "ap-guangzhou", "--kind", "bucket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown resource kind"));
}

/// ID の上限を超える plan はベンダーCLIを呼ぶ前に失敗する
#[test]
fn test_plan_too_many_ids() {
    let env = TestEnv::new(ACCOUNTS);
    let ids: Vec<String> = (0..101).map(|i| format!("ins-{}", i)).collect();
    hcsync(&env)
        .args(["plan", "--account", "tc-prod", "--region", "ap-guangzhou", "--kind", "cvm"])
        .arg("--ids")
        .arg(ids.join(","))
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit is 100"));
}

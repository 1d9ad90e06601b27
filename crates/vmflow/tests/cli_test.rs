use predicates::prelude::*;

mod common;
use common::TestEnv;

#[test]
fn test_cli_help() {
    let env = TestEnv::new();
    env.vmflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Azure 仮想マシン"))
        .stdout(predicate::str::contains("mcp"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("vms"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_cli_version() {
    let env = TestEnv::new();
    env.vmflow()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("vmflow "));
}

#[test]
fn test_plan_without_credentials() {
    let env = TestEnv::new();
    env.vmflow()
        .args(["plan", "vm01", "-g", "rg-demo", "--admin-password", "Sup3r-Secret!pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vm01-vnet"))
        .stdout(predicate::str::contains("vm01-nic"))
        .stdout(predicate::str::contains("vm01-pip").not())
        .stdout(predicate::str::contains("Sup3r-Secret!pw").not());
}

#[test]
fn test_plan_json_with_public_ip() {
    let env = TestEnv::new();
    let output = env
        .vmflow()
        .args(["plan", "vm01", "-g", "rg-demo", "--public-ip", "--json"])
        .env("AZ_TEST_PASS", "Fallback!Pw1")
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["vm01-pip", "vm01-vnet", "vm01-nic", "vm01"]);
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Fallback!Pw1"));
}

#[test]
fn test_plan_requires_password() {
    let env = TestEnv::new();
    env.vmflow()
        .args(["plan", "vm01", "-g", "rg-demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("password"));
}

#[test]
fn test_plan_rejects_invalid_name() {
    let env = TestEnv::new();
    env.vmflow()
        .args(["plan", "bad name!", "-g", "rg-demo", "--admin-password", "pw"])
        .assert()
        .failure();
}

#[test]
fn test_missing_configuration_is_fatal() {
    let env = TestEnv::new();
    env.vmflow()
        .arg("vms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZ_TENANT_ID"))
        .stderr(predicate::str::contains("AZ_SUBSCRIPTION_ID"));
}

#[test]
fn test_env_file_is_read_before_validation() {
    let env = TestEnv::new();
    env.write_env_file("AZ_TENANT_ID=t\nAZ_CLIENT_ID=c\nAZ_CLIENT_SECRET=s\n");
    env.vmflow()
        .args(["status", "-g", "rg-demo", "vm01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZ_SUBSCRIPTION_ID"))
        .stderr(predicate::str::contains("AZ_TENANT_ID").not());
}

#[test]
fn test_status_requires_resource_group() {
    let env = TestEnv::new();
    env.vmflow()
        .args(["status", "vm01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--resource-group"));
}

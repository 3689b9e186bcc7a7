use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn kubeduo() -> Command {
    Command::cargo_bin("kubeduo").unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    kubeduo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_plan_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cluster.toml");
    fs::write(
        &config,
        r#"
kubernetes_channel = "v1.29"
pod_network_cidr = "192.168.0.0/16"

[control_plane]
name = "cp"
cpus = 4

[[workers]]
name = "w1"
"#,
    )
    .unwrap();

    kubeduo()
        .arg("plan")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("create_nodes"))
        .stdout(predicate::str::contains("join_worker"))
        .stdout(predicate::str::contains("cp, w1"));
}

#[test]
fn test_destroy_plan_ends_with_terminal_steps() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cluster.toml");
    fs::write(&config, "workers = []\n").unwrap();

    let output = kubeduo()
        .args(["plan", "--destroy"])
        .env("KUBEDUO_CONFIG", &config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();

    assert!(!text.contains("reset_worker"));
    let delete = text.find("delete_nodes").unwrap();
    let purge = text.find("purge_kubeconfig").unwrap();
    assert!(text.find("reset_control_plane").unwrap() < delete);
    assert!(delete < purge);
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cluster.toml");
    fs::write(&config, "pod_network_cidr = \"not-a-cidr\"\n").unwrap();

    kubeduo()
        .args(["plan", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-a-cidr"));
}

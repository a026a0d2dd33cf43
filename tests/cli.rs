use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn clinic_sync(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("clinic-sync").unwrap();
    cmd.env("CLINIC_SYNC_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("CLINIC_SYNC_LOG");
    cmd
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "command failed: {output:?}");
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn status_on_fresh_home() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync Status"))
        .stdout(predicate::str::contains("Pending:    0"));

    assert!(home.path().join("queue.db").exists());
}

#[test]
fn enqueue_then_run_drains_log() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "create", "patients/P1", "-p", r#"{"name":"Ada"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("patients/P1"));
    clinic_sync(&home)
        .args(["enqueue", "create", "patients/P2", "-p", r#"{"name":"Grace"}"#])
        .assert()
        .success();

    let status = json_output(clinic_sync(&home).args(["status", "-o", "json"]));
    assert_eq!(status["pending_operations"], 2);

    let summary = json_output(clinic_sync(&home).args(["run", "-o", "json"]));
    assert_eq!(summary["success"], true);
    assert_eq!(summary["synced"], 2);

    let status = json_output(clinic_sync(&home).args(["status", "-o", "json"]));
    assert_eq!(status["pending_operations"], 0);
    assert!(status["last_sync"].is_string());
}

#[test]
fn run_offline_leaves_log_untouched() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "delete", "inventory/SKU-9"])
        .assert()
        .success();

    clinic_sync(&home)
        .args(["run", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("offline"));

    let listed = json_output(clinic_sync(&home).args(["list", "-o", "json"]));
    assert_eq!(listed["count"], 1);
}

#[test]
fn conflicting_update_is_dead_lettered_then_discarded() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "update", "patients/P404", "-p", r#"{"phone":"555"}"#])
        .assert()
        .success();

    let summary = json_output(clinic_sync(&home).args(["run", "-o", "json"]));
    assert_eq!(summary["success"], false);
    assert_eq!(summary["synced"], 0);
    assert_eq!(summary["dead_lettered"], 1);

    let dead = json_output(clinic_sync(&home).args(["list", "--dead", "-o", "json"]));
    assert_eq!(dead["count"], 1);
    assert_eq!(dead["items"][0]["reason"], "conflict");
    let id = dead["items"][0]["id"].as_i64().unwrap();

    clinic_sync(&home)
        .args(["discard", &id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Discarded"));

    let status = json_output(clinic_sync(&home).args(["status", "-o", "json"]));
    assert_eq!(status["dead_letters"], 0);
    assert_eq!(status["pending_operations"], 0);
}

#[test]
fn retry_puts_dead_letter_back() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "delete", "patients/P1"])
        .assert()
        .success();
    clinic_sync(&home).arg("run").assert().success();

    clinic_sync(&home)
        .args(["retry", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset 1 dead letters"));

    let status = json_output(clinic_sync(&home).args(["status", "-o", "json"]));
    assert_eq!(status["pending_operations"], 1);
}

#[test]
fn enqueue_rejects_invalid_payload() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "create", "patients/P1", "-p", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn enqueue_requires_payload_for_create() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["enqueue", "create", "patients/P1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--payload is required"));
}

#[test]
fn discard_unknown_id_fails() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["discard", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn config_file_sets_default_output() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("config.yaml"),
        "general:\n  default_output: json\n",
    )
    .unwrap();

    let status = json_output(clinic_sync(&home).arg("status"));
    assert_eq!(status["pending_operations"], 0);
}

#[test]
fn invalid_config_is_reported() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("broken.yaml");
    std::fs::write(&config, "sync: [not, a, map]\n").unwrap();

    clinic_sync(&home)
        .args(["status", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn completions_generate_script() {
    let home = TempDir::new().unwrap();

    clinic_sync(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clinic-sync"));
}

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Every per-user root the binary looks at points inside `home`
fn idereset(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("idereset").unwrap();
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("APPDATA", home.join("AppData/Roaming"))
        .env("LOCALAPPDATA", home.join("AppData/Local"))
        .env("NO_COLOR", "1");
    cmd
}

fn config_root(home: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support")
    } else if cfg!(windows) {
        home.join("AppData/Roaming")
    } else {
        home.join(".config")
    }
}

fn install_cursor(home: &Path) -> PathBuf {
    let global = config_root(home).join("Cursor/User/globalStorage");
    fs::create_dir_all(&global).unwrap();
    let storage = global.join("storage.json");
    fs::write(&storage, r#"{"telemetry.machineId":"old-id"}"#).unwrap();
    storage
}

// ─── Help & version ──────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("telemetry"))
        .stdout(predicate::str::contains("database"))
        .stdout(predicate::str::contains("storage"))
        .stdout(predicate::str::contains("auto"))
        .stdout(predicate::str::contains("backups"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("idereset"));
}

// ─── Detect ──────────────────────────────────────────────────────────────────

#[test]
fn test_detect_empty_home_json() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["detect", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_detect_quiet_lists_slugs() {
    let home = TempDir::new().unwrap();
    install_cursor(home.path());
    idereset(home.path())
        .args(["detect", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cursor\tCursor"));
}

#[test]
fn test_first_run_shows_onboarding_once() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .arg("detect")
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome to idereset"));
    idereset(home.path())
        .arg("detect")
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome").not());
}

// ─── Operations ──────────────────────────────────────────────────────────────

#[test]
fn test_telemetry_rewrites_and_backs_up() {
    let home = TempDir::new().unwrap();
    let storage = install_cursor(home.path());

    idereset(home.path())
        .args(["telemetry", "-y", "--ide", "cursor", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new_machine_id"))
        .stdout(predicate::str::contains("\"operation\": \"telemetry\""));

    let contents = fs::read_to_string(&storage).unwrap();
    assert!(!contents.contains("old-id"));

    let backups: Vec<_> = fs::read_dir(storage.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_nothing_detected_fails_with_aborted_tree() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["database", "-y", "--quiet"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("aborted"));
}

#[test]
fn test_unknown_ide_selector() {
    let home = TempDir::new().unwrap();
    install_cursor(home.path());
    idereset(home.path())
        .args(["telemetry", "-y", "--ide", "goland", "--format", "json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No detected IDE matches 'goland'"));
}

#[test]
fn test_declined_confirmation_changes_nothing() {
    let home = TempDir::new().unwrap();
    let storage = install_cursor(home.path());
    idereset(home.path())
        .arg("telemetry")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancelled"));
    assert!(fs::read_to_string(&storage).unwrap().contains("old-id"));
}

#[test]
fn test_storage_flags_conflict() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["storage", "--workspace", "--global"])
        .assert()
        .failure();
}

#[test]
fn test_auto_with_every_step_disabled_is_an_error() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args([
            "auto",
            "-y",
            "--no-signout",
            "--no-cleaning",
            "--no-signin",
            "--no-restart",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to do"));
}

// ─── Backups & status ────────────────────────────────────────────────────────

#[test]
fn test_backups_list_after_reset() {
    let home = TempDir::new().unwrap();
    install_cursor(home.path());
    idereset(home.path())
        .args(["telemetry", "-y", "--quiet"])
        .assert()
        .success();

    idereset(home.path())
        .args(["backups", "list", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("storage.json.bak."));
}

#[test]
fn test_status_lists_recent_runs() {
    let home = TempDir::new().unwrap();
    install_cursor(home.path());
    idereset(home.path())
        .args(["telemetry", "-y", "--quiet"])
        .assert()
        .success();

    idereset(home.path())
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\": \"telemetry\""));
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn test_config_set_and_show() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["config", "set", "vendor_marker", "acme"])
        .assert()
        .success();
    idereset(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor_marker = \"acme\""));
}

#[test]
fn test_config_set_unknown_key() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["config", "set", "nope", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_blank_vendor_marker_in_config_file_cleans_nothing() {
    let home = TempDir::new().unwrap();
    let storage = install_cursor(home.path());
    let global = storage.parent().unwrap().to_path_buf();
    fs::create_dir_all(global.join("ms-python.python")).unwrap();
    fs::write(global.join("ms-python.python/state"), "keep").unwrap();

    let data_dir = home.path().join(".idereset");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("config.toml"), "vendor_marker = \"\"\n").unwrap();

    idereset(home.path())
        .args(["global-storage", "-y", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vendor_marker must not be empty"));

    assert!(storage.exists());
    assert!(global.join("ms-python.python/state").exists());
}

#[test]
fn test_excluded_ide_is_not_detected() {
    let home = TempDir::new().unwrap();
    install_cursor(home.path());
    idereset(home.path())
        .args(["config", "set", "exclude_ides", "cursor"])
        .assert()
        .success();
    idereset(home.path())
        .args(["detect", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();
    idereset(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("idereset"));
}

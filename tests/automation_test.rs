use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use idereset::api::{Api, Target};
use idereset::automation::{AutomationOptions, CleanSettings, Orchestrator, ProgressEvent};
use idereset::cleaner::{Backup, BackupManager, BackupRecord, RunManifest, RunStatus, Step};
use idereset::common::errors::ResetResult;
use idereset::common::config::Config;
use idereset::common::errors::ErrorKind;
use idereset::ides::{Detector, Environment, Platform};
use idereset::process::{Launcher, ProcessController, ProcessInfo, ProcessLister};
use rusqlite::Connection;
use tempfile::TempDir;

// ─── Fake processes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct World {
    procs: Vec<ProcessInfo>,
    launched: Vec<PathBuf>,
}

struct FakeLister(Arc<Mutex<World>>);

impl ProcessLister for FakeLister {
    fn list(&mut self) -> Vec<ProcessInfo> {
        self.0.lock().unwrap().procs.clone()
    }
    fn terminate(&mut self, pid: u32) -> bool {
        self.0.lock().unwrap().procs.retain(|p| p.pid != pid);
        true
    }
    fn kill(&mut self, pid: u32) -> bool {
        self.terminate(pid)
    }
    fn is_alive(&mut self, pid: u32) -> bool {
        self.0.lock().unwrap().procs.iter().any(|p| p.pid == pid)
    }
}

struct FakeLauncher(Arc<Mutex<World>>);

impl Launcher for FakeLauncher {
    fn launch(&mut self, exe: &Path) -> std::io::Result<u32> {
        self.0.lock().unwrap().launched.push(exe.to_path_buf());
        Ok(9000)
    }
}

// ─── Sandbox ─────────────────────────────────────────────────────────────────

struct Sandbox {
    home: TempDir,
    world: Arc<Mutex<World>>,
    api: Api,
}

fn editor_layout(root: &Path, dir: &str) {
    let global = root.join(dir).join("User/globalStorage");
    fs::create_dir_all(global.join("augment.vscode-augment")).unwrap();
    fs::write(global.join("augment.vscode-augment/state.json"), "{}").unwrap();
    fs::write(global.join("storage.json"), r#"{"telemetry.machineId":"old"}"#).unwrap();
    fs::create_dir_all(root.join(dir).join("User/workspaceStorage/abc")).unwrap();

    let conn = Connection::open(global.join("state.vscdb")).unwrap();
    conn.execute_batch(
        "CREATE TABLE ItemTable (key TEXT, value BLOB);
         INSERT INTO ItemTable VALUES ('augment.session', 'x');
         INSERT INTO ItemTable VALUES ('editor.fontSize', '14');",
    )
    .unwrap();
}

fn sandbox() -> Sandbox {
    let home = TempDir::new().unwrap();
    let env = Environment::rooted(Platform::Linux, home.path());
    editor_layout(&env.config_root(), "Code");
    editor_layout(&env.config_root(), "Cursor");

    let world = Arc::new(Mutex::new(World::default()));
    let processes = ProcessController::new(
        Box::new(FakeLister(world.clone())),
        Box::new(FakeLauncher(world.clone())),
    )
    .with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

    let api = Api::new(Config::default(), env)
        .with_process_controller(processes)
        .with_run_log(Some(home.path().join("logs")));

    Sandbox { home, world, api }
}

fn running_vscode(sb: &Sandbox) -> PathBuf {
    let exe = sb.home.path().join("bin/code");
    fs::create_dir_all(exe.parent().unwrap()).unwrap();
    fs::write(&exe, "#!/bin/sh\n").unwrap();
    sb.world.lock().unwrap().procs.push(ProcessInfo {
        pid: 101,
        name: "code".to_string(),
        exe: Some(exe.clone()),
    });
    exe
}

fn no_restart() -> AutomationOptions {
    AutomationOptions {
        include_restart: false,
        ..Default::default()
    }
}

// ─── Pipelines ───────────────────────────────────────────────────────────────

#[test]
fn test_signout_closes_only_running_ides() {
    let mut sb = sandbox();
    running_vscode(&sb);

    let tree = sb
        .api
        .run_full_automation(&Target::All, Some(&no_restart()), &mut |_| {});
    assert!(tree.success(), "{:#?}", tree);

    let vscode = tree.step("VS Code", Step::Signout).unwrap();
    let cursor = tree.step("Cursor", Step::Signout).unwrap();
    assert!(vscode.is_success());
    assert!(cursor.is_success());
    assert!(vscode.count("processes_closed") >= 1);
    assert_eq!(cursor.count("processes_closed"), 0);
    assert!(sb.world.lock().unwrap().procs.is_empty());
}

#[test]
fn test_restart_relaunches_the_stopped_executable() {
    let mut sb = sandbox();
    let exe = running_vscode(&sb);

    let tree = sb
        .api
        .run_full_automation(&Target::Named("vscode".into()), None, &mut |_| {});
    assert!(tree.success(), "{:#?}", tree);

    let restart = tree.step("VS Code", Step::Restart).unwrap();
    assert_eq!(restart.get("pid").unwrap(), 9000);
    assert_eq!(sb.world.lock().unwrap().launched, vec![exe]);
    assert!(tree.ide("Cursor").is_none());
}

#[test]
fn test_restart_without_executable_fails_but_cleaning_stands() {
    let mut sb = sandbox();

    let tree = sb
        .api
        .run_full_automation(&Target::Named("cursor".into()), None, &mut |_| {});
    let report = tree.ide("Cursor").unwrap();
    assert!(!report.success);
    assert_eq!(report.failed_steps(), vec![Step::Restart]);
    assert_eq!(
        report.get(Step::Restart).unwrap().error().unwrap().kind,
        ErrorKind::NotFound
    );
    assert!(report.get(Step::Database).unwrap().is_success());
    assert_eq!(report.get(Step::Database).unwrap().count("rows_deleted"), 1);
}

#[test]
fn test_one_failing_ide_does_not_stop_the_others() {
    let mut sb = sandbox();
    // Corrupt VS Code's database so its cleaning step fails
    let db = sb
        .home
        .path()
        .join(".config/Code/User/globalStorage/state.vscdb");
    fs::write(&db, b"definitely not sqlite").unwrap();

    let tree = sb
        .api
        .run_full_automation(&Target::All, Some(&no_restart()), &mut |_| {});

    assert_eq!(tree.status, RunStatus::Done);
    assert_eq!(tree.ides.len(), 2);
    assert_eq!(tree.succeeded_count(), 1);
    assert_eq!(tree.message, "1 of 2 IDEs completed successfully");

    let vscode = tree.ide("VS Code").unwrap();
    assert_eq!(vscode.failed_steps(), vec![Step::Database]);
    assert!(vscode.get(Step::Telemetry).unwrap().is_success());
    assert!(vscode.get(Step::GlobalStorage).unwrap().is_success());
    assert!(vscode.get(Step::SigninPrep).unwrap().is_success());

    assert!(tree.ide("Cursor").unwrap().success);
}

#[test]
fn test_cancel_between_ides() {
    let mut sb = sandbox();
    let token = sb.api.cancel_token();

    let mut finished = Vec::new();
    let tree = sb
        .api
        .run_full_automation(&Target::All, Some(&no_restart()), &mut |event| {
            if let ProgressEvent::IdeFinished { ide, .. } = event {
                finished.push(ide);
                token.cancel();
            }
        });

    assert_eq!(tree.status, RunStatus::Cancelled);
    assert_eq!(finished, vec!["VS Code".to_string()]);
    assert_eq!(tree.ides.len(), 1);
    assert!(tree.message.starts_with("Cancelled: "));
}

#[test]
fn test_run_all_touches_no_processes() {
    let mut sb = sandbox();
    running_vscode(&sb);

    let tree = sb.api.run_all_operations(&Target::All, &mut |_| {});
    assert!(tree.success(), "{:#?}", tree);
    assert_eq!(tree.operation, "all");

    let steps: Vec<Step> = tree.ide("VS Code").unwrap().steps.keys().copied().collect();
    assert_eq!(
        steps,
        vec![
            Step::Telemetry,
            Step::Database,
            Step::WorkspaceStorage,
            Step::GlobalStorage
        ]
    );
    let world = sb.world.lock().unwrap();
    assert_eq!(world.procs.len(), 1);
    assert!(world.launched.is_empty());
}

#[test]
fn test_runs_are_logged() {
    let mut sb = sandbox();
    sb.api.modify_telemetry(&Target::All);
    sb.api.clean_database(&Target::Named("nope".into()));

    let runs = RunManifest::recent(&sb.home.path().join("logs"), 10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].operation, "database");
    assert_eq!(runs[0].status, RunStatus::Aborted);
    assert_eq!(runs[1].operation, "telemetry");
    assert_eq!(runs[1].ides_succeeded, 2);
}

// ─── Panicking collaborators ─────────────────────────────────────────────────

/// Real backups, except that touching a state database blows up
struct ExplodingOnDatabase(BackupManager);

impl Backup for ExplodingOnDatabase {
    fn backup(&self, path: &Path) -> ResetResult<BackupRecord> {
        if path.ends_with("state.vscdb") {
            panic!("simulated crash while copying {}", path.display());
        }
        self.0.backup(path)
    }

    fn archive(&self, root: &Path, entries: &[PathBuf]) -> ResetResult<BackupRecord> {
        self.0.archive(root, entries)
    }
}

#[test]
fn test_panicking_step_fails_alone_and_later_ides_still_run() {
    let home = TempDir::new().unwrap();
    let env = Environment::rooted(Platform::Linux, home.path());
    editor_layout(&env.config_root(), "Code");
    editor_layout(&env.config_root(), "Cursor");
    let ides = Detector::new(env).scan();
    assert_eq!(ides.len(), 2);

    let world = Arc::new(Mutex::new(World::default()));
    let processes = ProcessController::new(
        Box::new(FakeLister(world.clone())),
        Box::new(FakeLauncher(world)),
    );
    let mut orchestrator = Orchestrator::new(
        Box::new(ExplodingOnDatabase(BackupManager::default())),
        processes,
        CleanSettings::default(),
    );
    let cleaning_only = AutomationOptions {
        include_signout: false,
        include_cleaning: true,
        include_signin: false,
        include_restart: false,
    };

    let tree = orchestrator.run_on(&ides, &cleaning_only, &mut |_| {});

    assert_eq!(tree.status, RunStatus::Done);
    assert_eq!(tree.ides.len(), 2);
    for name in ["VS Code", "Cursor"] {
        let report = tree.ide(name).unwrap();
        assert_eq!(report.failed_steps(), vec![Step::Database]);
        let error = report.get(Step::Database).unwrap().error().unwrap();
        assert_eq!(error.kind, ErrorKind::Unexpected);
        assert!(error.detail.contains("simulated crash"));
        assert!(report.get(Step::Telemetry).unwrap().is_success());
        assert!(report.get(Step::GlobalStorage).unwrap().is_success());
    }
}

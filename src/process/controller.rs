use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use super::lister::{DetachedLauncher, Launcher, ProcessInfo, ProcessLister, SysinfoLister};
use crate::cleaner::result::OperationResult;
use crate::common::errors::{ErrorKind, ResetError};
use crate::ides::IdeDescriptor;

pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);
pub const KILL_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Stops and restarts IDE processes
pub struct ProcessController {
    lister: Box<dyn ProcessLister>,
    launcher: Box<dyn Launcher>,
    graceful_timeout: Duration,
    kill_timeout: Duration,
    /// Executables of processes stopped by this controller, by IDE slug
    remembered: HashMap<String, PathBuf>,
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new(Box::new(SysinfoLister::new()), Box::new(DetachedLauncher))
    }
}

impl ProcessController {
    pub fn new(lister: Box<dyn ProcessLister>, launcher: Box<dyn Launcher>) -> Self {
        Self {
            lister,
            launcher,
            graceful_timeout: GRACEFUL_TIMEOUT,
            kill_timeout: KILL_TIMEOUT,
            remembered: HashMap::new(),
        }
    }

    /// Override the wait bounds (tests use short ones)
    pub fn with_timeouts(mut self, graceful: Duration, kill: Duration) -> Self {
        self.graceful_timeout = graceful;
        self.kill_timeout = kill;
        self
    }

    /// Running processes that belong to `ide`
    pub fn find(&mut self, ide: &IdeDescriptor) -> Vec<ProcessInfo> {
        let product = ide.product();
        let exe = ide.executable_path.as_deref();
        self.lister
            .list()
            .into_iter()
            .filter(|p| {
                product.is_some_and(|prod| prod.matches_process(&p.name))
                    || (exe.is_some() && p.exe.as_deref() == exe)
            })
            .collect()
    }

    /// Terminate every process of `ide`, escalating to a kill after the grace period
    pub fn stop(&mut self, ide: &IdeDescriptor) -> OperationResult {
        let procs = self.find(ide);
        if procs.is_empty() {
            return OperationResult::ok(format!("{} is not running", ide.display_name))
                .with("processes_closed", 0);
        }

        if let Some(exe) = procs.iter().find_map(|p| p.exe.clone()) {
            self.remembered.insert(ide.name.clone(), exe);
        }

        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        tracing::info!("Stopping {} ({} processes)", ide.display_name, pids.len());

        let mut undelivered = 0;
        for &pid in &pids {
            if !self.lister.terminate(pid) {
                undelivered += 1;
                tracing::debug!("Terminate request for pid {} was not delivered", pid);
            }
        }

        let mut alive = self.wait_for_exit(&pids, self.graceful_timeout);
        let mut forced = 0;
        if !alive.is_empty() {
            tracing::warn!(
                "{} still running after {:?}, forcing",
                ide.display_name,
                self.graceful_timeout
            );
            for &pid in &alive {
                if self.lister.kill(pid) {
                    forced += 1;
                }
            }
            alive = self.wait_for_exit(&alive, self.kill_timeout);
        }

        let closed = pids.len() - alive.len();
        let result = if alive.is_empty() {
            OperationResult::ok(format!(
                "Closed {} process(es) of {}",
                closed, ide.display_name
            ))
        } else {
            OperationResult::failed(
                format!(
                    "{} process(es) of {} could not be stopped",
                    alive.len(),
                    ide.display_name
                ),
                ErrorKind::PermissionDenied,
                format!("pids still running: {:?}", alive),
            )
        };

        result
            .with("processes_closed", closed)
            .with("processes_found", pids.len())
            .with("forced", forced)
            .with("signal_failures", undelivered)
    }

    /// Launch the IDE detached from this process
    pub fn start(&mut self, ide: &IdeDescriptor) -> OperationResult {
        let exe = self
            .remembered
            .get(&ide.name)
            .filter(|p| p.is_file())
            .cloned()
            .or_else(|| ide.executable_path.clone().filter(|p| p.is_file()));

        let Some(exe) = exe else {
            return OperationResult::failed(
                format!(
                    "Executable for {} not found; manual restart required",
                    ide.display_name
                ),
                ErrorKind::NotFound,
                "no executable path known",
            );
        };

        match self.launcher.launch(&exe) {
            Ok(pid) => {
                tracing::info!("Started {} (pid {})", ide.display_name, pid);
                OperationResult::ok(format!("Started {}", ide.display_name))
                    .with("pid", pid)
                    .with("executable", &exe)
            }
            Err(e) => OperationResult::from_error(
                format!(
                    "Could not start {}; manual restart required",
                    ide.display_name
                ),
                &ResetError::from_io(&exe, e),
            ),
        }
    }

    /// Poll until the given pids exit or the timeout passes; returns survivors
    fn wait_for_exit(&mut self, pids: &[u32], timeout: Duration) -> Vec<u32> {
        let deadline = Instant::now() + timeout;
        loop {
            let alive: Vec<u32> = pids
                .iter()
                .copied()
                .filter(|&pid| self.lister.is_alive(pid))
                .collect();
            if alive.is_empty() || Instant::now() >= deadline {
                return alive;
            }
            thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ides::Product;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        procs: Vec<ProcessInfo>,
        /// pids that ignore terminate
        stubborn: Vec<u32>,
        launched: Vec<PathBuf>,
    }

    struct FakeLister(Arc<Mutex<FakeState>>);

    impl ProcessLister for FakeLister {
        fn list(&mut self) -> Vec<ProcessInfo> {
            self.0.lock().unwrap().procs.clone()
        }
        fn terminate(&mut self, pid: u32) -> bool {
            let mut s = self.0.lock().unwrap();
            if !s.stubborn.contains(&pid) {
                s.procs.retain(|p| p.pid != pid);
            }
            true
        }
        fn kill(&mut self, pid: u32) -> bool {
            self.0.lock().unwrap().procs.retain(|p| p.pid != pid);
            true
        }
        fn is_alive(&mut self, pid: u32) -> bool {
            self.0.lock().unwrap().procs.iter().any(|p| p.pid == pid)
        }
    }

    struct FakeLauncher(Arc<Mutex<FakeState>>);

    impl Launcher for FakeLauncher {
        fn launch(&mut self, exe: &Path) -> std::io::Result<u32> {
            self.0.lock().unwrap().launched.push(exe.to_path_buf());
            Ok(4242)
        }
    }

    fn controller(state: &Arc<Mutex<FakeState>>) -> ProcessController {
        ProcessController::new(
            Box::new(FakeLister(state.clone())),
            Box::new(FakeLauncher(state.clone())),
        )
        .with_timeouts(Duration::from_millis(50), Duration::from_millis(50))
    }

    fn proc(pid: u32, name: &str, exe: Option<&Path>) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
            exe: exe.map(Path::to_path_buf),
        }
    }

    #[test]
    fn test_stop_when_not_running() {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let result = controller(&state).stop(&IdeDescriptor::new(Product::VsCode));
        assert!(result.is_success());
        assert_eq!(result.count("processes_closed"), 0);
    }

    #[test]
    fn test_stop_closes_only_matching_processes() {
        let state = Arc::new(Mutex::new(FakeState {
            procs: vec![
                proc(10, "code", None),
                proc(11, "code", None),
                proc(12, "cursor", None),
            ],
            ..Default::default()
        }));
        let result = controller(&state).stop(&IdeDescriptor::new(Product::VsCode));
        assert!(result.is_success());
        assert_eq!(result.count("processes_closed"), 2);
        assert_eq!(result.count("forced"), 0);
        assert_eq!(state.lock().unwrap().procs.len(), 1);
    }

    #[test]
    fn test_stubborn_process_is_killed() {
        let state = Arc::new(Mutex::new(FakeState {
            procs: vec![proc(20, "pycharm64.exe", None)],
            stubborn: vec![20],
            ..Default::default()
        }));
        let result = controller(&state).stop(&IdeDescriptor::new(Product::PyCharm));
        assert!(result.is_success());
        assert_eq!(result.count("processes_closed"), 1);
        assert_eq!(result.count("forced"), 1);
    }

    #[test]
    fn test_start_prefers_remembered_executable() {
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("cursor");
        std::fs::write(&exe, "").unwrap();

        let state = Arc::new(Mutex::new(FakeState {
            procs: vec![proc(30, "Cursor", Some(&exe))],
            ..Default::default()
        }));
        let mut ctl = controller(&state);
        let ide = IdeDescriptor::new(Product::Cursor);

        assert!(ctl.stop(&ide).is_success());
        let started = ctl.start(&ide);
        assert!(started.is_success(), "{:?}", started);
        assert_eq!(started.count("pid"), 4242);
        assert_eq!(state.lock().unwrap().launched, vec![exe]);
    }

    #[test]
    fn test_start_without_executable_needs_manual_restart() {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let result = controller(&state).start(&IdeDescriptor::new(Product::Rider));
        assert!(!result.is_success());
        assert!(result.message().contains("manual restart"));
        assert_eq!(result.error().unwrap().kind, ErrorKind::NotFound);
    }
}

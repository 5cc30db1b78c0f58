use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use sysinfo::{Pid, Signal, System};

/// A running process as seen by a lister
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
}

/// Platform seam for process enumeration and signalling
pub trait ProcessLister: Send {
    /// Every process except this one
    fn list(&mut self) -> Vec<ProcessInfo>;

    /// Ask a process to exit. Returns false if the request could not be delivered.
    fn terminate(&mut self, pid: u32) -> bool;

    /// Force a process to exit
    fn kill(&mut self, pid: u32) -> bool;

    fn is_alive(&mut self, pid: u32) -> bool;
}

/// `ProcessLister` backed by sysinfo
pub struct SysinfoLister {
    system: System,
    own_pid: Option<Pid>,
}

impl SysinfoLister {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            own_pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SysinfoLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLister for SysinfoLister {
    fn list(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes();
        let mut procs: Vec<ProcessInfo> = self
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != self.own_pid)
            .map(|(pid, p)| ProcessInfo {
                pid: pid.as_u32(),
                name: p.name().to_string(),
                exe: p.exe().map(Path::to_path_buf),
            })
            .collect();
        procs.sort_by_key(|p| p.pid);
        procs
    }

    fn terminate(&mut self, pid: u32) -> bool {
        if cfg!(windows) {
            // WM_CLOSE through taskkill lets the IDE save state
            return Command::new("taskkill")
                .args(["/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
        }
        match self.system.process(Pid::from_u32(pid)) {
            Some(p) => p.kill_with(Signal::Term).unwrap_or_else(|| p.kill()),
            None => false,
        }
    }

    fn kill(&mut self, pid: u32) -> bool {
        self.system.refresh_process(Pid::from_u32(pid));
        self.system
            .process(Pid::from_u32(pid))
            .map(|p| p.kill())
            .unwrap_or(false)
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        self.system.refresh_process(Pid::from_u32(pid))
    }
}

/// Starts an IDE executable
pub trait Launcher: Send {
    /// Spawn `exe` and return its pid
    fn launch(&mut self, exe: &Path) -> std::io::Result<u32>;
}

/// Spawns the IDE in its own process group with no inherited stdio,
/// so it outlives this tool.
#[derive(Debug, Default)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&mut self, exe: &Path) -> std::io::Result<u32> {
        let mut cmd = Command::new(exe);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn()?;
        Ok(child.id())
    }
}

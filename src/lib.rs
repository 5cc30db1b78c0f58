//! # idereset
//!
//! Reset the identity artifacts an IDE extension leaves behind in
//! VS Code-family editors and JetBrains IDEs.
//!
//! - **Detection**: finds installed IDEs and the state files each one keeps
//! - **Telemetry reset**: fresh machine, device and SQM identifiers
//! - **State cleaning**: purges extension rows from `state.vscdb` and
//!   extension entries from workspace and global storage
//! - **Backups first**: every file is copied or archived before it changes
//! - **Automation**: stop, clean, prepare sign-in and restart in one run
//! - **Surfaces**: a CLI and a C-ABI JSON bridge over the same [`api`]

pub mod api;
pub mod automation;
pub mod cleaner;
pub mod cli;
pub mod common;
pub mod ffi;
pub mod ides;
pub mod process;

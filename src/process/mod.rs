pub mod controller;
pub mod lister;

pub use controller::ProcessController;
pub use lister::{DetachedLauncher, Launcher, ProcessInfo, ProcessLister, SysinfoLister};

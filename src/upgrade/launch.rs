//! Starting the updated executable as an independent process.
//!
//! The child must outlive the updater: it gets no inherited console or
//! stdio, and on Windows it is created detached in its own process group.

use crate::core::LaunchError;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts an executable without waiting for it.
pub trait Launcher: Send + Sync {
    /// Start `path` and return its process id.
    fn launch(&self, path: &Path) -> Result<u32, LaunchError>;
}

/// [`Launcher`] that spawns a detached child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, path: &Path) -> Result<u32, LaunchError> {
        let mut command = Command::new(path);
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| LaunchError {
            path: path.to_path_buf(),
            source,
        })?;

        let pid = child.id();
        info!(pid, "Launched {}", path.display());
        Ok(pid)
    }
}

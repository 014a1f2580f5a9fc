//! Installation layout detection.
//!
//! YMU has shipped with two directory conventions:
//!
//! - **AppData** - log file under `%APPDATA%\YMU`, executable in the working
//!   directory
//! - **Legacy** - log directory `./ymu` next to the executable
//!
//! The layout is resolved once at startup and passed to everything that
//! needs a path. Nothing downstream looks up directories on its own.

use crate::constants::{
    APPDATA_DIR_NAME, BACKUP_DIR_NAME, CONFIG_FILE_NAME, LEGACY_LOG_DIR_NAME, LOG_FILE_NAME,
};
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which directory convention an installation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutConvention {
    /// Log directory under the per-user application data directory.
    AppData,
    /// Log directory next to the executable.
    Legacy,
}

impl fmt::Display for LayoutConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppData => f.write_str("appdata"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// Resolved paths for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationLayout {
    /// The executable being updated.
    pub target_exe: PathBuf,
    /// Directory holding the backup slot.
    pub backup_dir: PathBuf,
    /// Backup copy of the executable inside `backup_dir`.
    pub backup_exe: PathBuf,
    /// Directory holding the log file.
    pub log_dir: PathBuf,
    /// The updater's log file.
    pub log_file: PathBuf,
    /// Convention in effect.
    pub convention: LayoutConvention,
}

impl InstallationLayout {
    /// Detect the layout from the process working directory and `%APPDATA%`.
    pub fn detect(exe_name: &str) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine working directory")?;
        let appdata = dirs::config_dir();
        Ok(Self::detect_in(&cwd, appdata.as_deref(), exe_name))
    }

    /// Detect the layout for an explicit working directory and AppData root.
    ///
    /// Rules, in order:
    /// 1. no AppData directory → legacy
    /// 2. `<appdata>/YMU` is a directory and `<cwd>/<exe>` is a file → AppData
    /// 3. `<cwd>/ymu` is a directory → legacy
    /// 4. otherwise → AppData (fresh installation)
    pub fn detect_in(cwd: &Path, appdata: Option<&Path>, exe_name: &str) -> Self {
        let Some(appdata) = appdata else {
            return Self::legacy(cwd, exe_name);
        };

        let app_dir = appdata.join(APPDATA_DIR_NAME);
        let exe = cwd.join(exe_name);

        if app_dir.is_dir() && exe.is_file() {
            Self::appdata(cwd, &app_dir, exe_name)
        } else if cwd.join(LEGACY_LOG_DIR_NAME).is_dir() {
            Self::legacy(cwd, exe_name)
        } else {
            Self::appdata(cwd, &app_dir, exe_name)
        }
    }

    /// Layout for an explicitly chosen executable.
    ///
    /// Backup and log directories are placed beside the executable using the
    /// legacy convention.
    pub fn for_target(target_exe: PathBuf) -> Self {
        let dir = target_exe.parent().map(Path::to_path_buf).unwrap_or_default();
        let backup_dir = dir.join(BACKUP_DIR_NAME);
        let backup_exe = backup_dir.join(target_exe.file_name().unwrap_or_default());
        let log_dir = dir.join(LEGACY_LOG_DIR_NAME);

        Self {
            target_exe,
            backup_dir,
            backup_exe,
            log_file: log_dir.join(LOG_FILE_NAME),
            log_dir,
            convention: LayoutConvention::Legacy,
        }
    }

    fn appdata(cwd: &Path, app_dir: &Path, exe_name: &str) -> Self {
        let backup_dir = cwd.join(BACKUP_DIR_NAME);
        Self {
            target_exe: cwd.join(exe_name),
            backup_exe: backup_dir.join(exe_name),
            backup_dir,
            log_dir: app_dir.to_path_buf(),
            log_file: app_dir.join(LOG_FILE_NAME),
            convention: LayoutConvention::AppData,
        }
    }

    fn legacy(cwd: &Path, exe_name: &str) -> Self {
        let mut layout = Self::for_target(cwd.join(exe_name));
        layout.convention = LayoutConvention::Legacy;
        layout
    }

    /// File name of the target executable.
    pub fn target_name(&self) -> String {
        self.target_exe
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether the target is an existing regular file.
    pub fn target_exists(&self) -> bool {
        self.target_exe.is_file()
    }

    /// Default location of the optional updater configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.log_dir.join(CONFIG_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_appdata_uses_legacy() {
        let cwd = TempDir::new().unwrap();
        let layout = InstallationLayout::detect_in(cwd.path(), None, "ymu.exe");

        assert_eq!(layout.convention, LayoutConvention::Legacy);
        assert_eq!(layout.target_exe, cwd.path().join("ymu.exe"));
        assert_eq!(layout.log_file, cwd.path().join("ymu").join("ymu.log"));
        assert_eq!(layout.backup_exe, cwd.path().join("_backup").join("ymu.exe"));
    }

    #[test]
    fn test_appdata_dir_and_exe_present() {
        let cwd = TempDir::new().unwrap();
        let appdata = TempDir::new().unwrap();
        std::fs::create_dir(appdata.path().join("YMU")).unwrap();
        std::fs::write(cwd.path().join("ymu.exe"), b"exe").unwrap();
        // A legacy directory does not win over a complete AppData install.
        std::fs::create_dir(cwd.path().join("ymu")).unwrap();

        let layout = InstallationLayout::detect_in(cwd.path(), Some(appdata.path()), "ymu.exe");

        assert_eq!(layout.convention, LayoutConvention::AppData);
        assert_eq!(layout.log_dir, appdata.path().join("YMU"));
        assert_eq!(layout.log_file, appdata.path().join("YMU").join("ymu.log"));
        assert_eq!(layout.backup_dir, cwd.path().join("_backup"));
    }

    #[test]
    fn test_legacy_log_dir_detected() {
        let cwd = TempDir::new().unwrap();
        let appdata = TempDir::new().unwrap();
        std::fs::create_dir(cwd.path().join("ymu")).unwrap();

        let layout = InstallationLayout::detect_in(cwd.path(), Some(appdata.path()), "ymu.exe");

        assert_eq!(layout.convention, LayoutConvention::Legacy);
        assert_eq!(layout.log_dir, cwd.path().join("ymu"));
    }

    #[test]
    fn test_fresh_install_defaults_to_appdata() {
        let cwd = TempDir::new().unwrap();
        let appdata = TempDir::new().unwrap();

        let layout = InstallationLayout::detect_in(cwd.path(), Some(appdata.path()), "ymu.exe");

        assert_eq!(layout.convention, LayoutConvention::AppData);
        assert!(!layout.target_exists());
    }

    #[test]
    fn test_for_target_places_backup_beside_executable() {
        let dir = TempDir::new().unwrap();
        let layout = InstallationLayout::for_target(dir.path().join("app.exe"));

        assert_eq!(layout.backup_exe, dir.path().join("_backup").join("app.exe"));
        assert_eq!(layout.target_name(), "app.exe");
        assert_eq!(layout.config_file(), dir.path().join("ymu").join("updater.toml"));
    }
}

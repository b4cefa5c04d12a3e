use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::path::{Path, PathBuf};

pub trait PathResolver: Send + Sync {
    fn resolve_worker_executable(&self) -> AppResult<PathBuf>;
    fn resolve_worker_script(&self) -> AppResult<PathBuf>;
}

/// Resolves the worker from settings. Relative paths are anchored at `base_dir`,
/// which is normally the directory holding the running binary.
#[derive(Debug, Clone)]
pub struct SettingsPaths {
    executable: String,
    script: String,
    base_dir: PathBuf,
}

impl SettingsPaths {
    pub fn new(settings: &AppSettings, base_dir: PathBuf) -> Self {
        Self {
            executable: settings.worker_executable.clone(),
            script: settings.worker_script.clone(),
            base_dir,
        }
    }

    pub fn beside_current_exe(settings: &AppSettings) -> AppResult<Self> {
        let exe = std::env::current_exe()?;
        let base_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::NotFound(format!("no parent directory for {}", exe.display())))?;
        Ok(Self::new(settings, base_dir))
    }

    fn anchor(&self, candidate: &Path) -> PathBuf {
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

impl PathResolver for SettingsPaths {
    fn resolve_worker_executable(&self) -> AppResult<PathBuf> {
        let candidate = Path::new(&self.executable);
        if candidate.components().count() == 1 {
            return which::which(&self.executable).map_err(|error| {
                AppError::NotFound(format!("worker executable '{}' not found on PATH: {}", self.executable, error))
            });
        }

        let canonical = self.anchor(candidate).canonicalize().map_err(|error| {
            AppError::NotFound(format!("worker executable '{}' not found: {}", self.executable, error))
        })?;
        if !canonical.is_file() {
            return Err(AppError::NotFound(format!(
                "worker executable '{}' is not a file",
                self.executable
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(&canonical)?;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(AppError::NotFound(format!(
                    "worker executable '{}' is not executable",
                    self.executable
                )));
            }
        }

        Ok(canonical)
    }

    fn resolve_worker_script(&self) -> AppResult<PathBuf> {
        let candidate = self.anchor(Path::new(&self.script));
        let canonical = candidate.canonicalize().map_err(|error| {
            AppError::NotFound(format!("worker script '{}' not found: {}", candidate.display(), error))
        })?;
        if !canonical.is_file() {
            return Err(AppError::NotFound(format!(
                "worker script '{}' is not a file",
                candidate.display()
            )));
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::{PathResolver, SettingsPaths};
    use crate::errors::AppError;
    use crate::models::AppSettings;

    fn settings(executable: &str, script: &str) -> AppSettings {
        AppSettings {
            worker_executable: executable.to_string(),
            worker_script: script.to_string(),
            ..AppSettings::default()
        }
    }

    #[test]
    fn relative_script_is_anchored_at_base_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.py"), "print('hi')\n").expect("write script");

        let paths = SettingsPaths::new(&settings("python3", "main.py"), dir.path().to_path_buf());
        let script = paths.resolve_worker_script().expect("script");
        assert_eq!(script, dir.path().join("main.py").canonicalize().expect("canonical"));
    }

    #[test]
    fn missing_script_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SettingsPaths::new(&settings("python3", "main.py"), dir.path().to_path_buf());
        let error = paths.resolve_worker_script().expect_err("missing script");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[test]
    fn directory_is_not_accepted_as_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("main.py")).expect("mkdir");
        let paths = SettingsPaths::new(&settings("python3", "main.py"), dir.path().to_path_buf());
        assert!(paths.resolve_worker_script().is_err());
    }

    #[test]
    fn unknown_bare_executable_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SettingsPaths::new(
            &settings("vidcsv-no-such-interpreter-7f3a", "main.py"),
            dir.path().to_path_buf(),
        );
        let error = paths.resolve_worker_executable().expect_err("missing executable");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_executable_must_have_exec_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let interpreter = dir.path().join("python3");
        std::fs::write(&interpreter, "#!/bin/sh\n").expect("write interpreter");

        let configured = interpreter.to_string_lossy().to_string();
        let paths = SettingsPaths::new(&settings(&configured, "main.py"), dir.path().to_path_buf());
        assert!(paths.resolve_worker_executable().is_err());

        let mut permissions = std::fs::metadata(&interpreter).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&interpreter, permissions).expect("chmod");
        assert_eq!(
            paths.resolve_worker_executable().expect("executable"),
            interpreter.canonicalize().expect("canonical")
        );
    }
}

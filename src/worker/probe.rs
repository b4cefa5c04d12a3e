use crate::errors::{AppError, AppResult};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const PROBE_SNIPPET: &str = "import sys; print(sys.executable)";

/// Asks the worker interpreter which executable it really is. Only used for diagnostics.
pub fn probe_interpreter(executable: &Path, timeout: Duration) -> AppResult<String> {
    let mut child = Command::new(executable)
        .args(["-u", "-c", PROBE_SNIPPET])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|error| AppError::Spawn(format!("interpreter probe failed to start: {}", error)))?;

    match child.wait_timeout(timeout)? {
        Some(status) => {
            if !status.success() {
                return Err(AppError::Internal(format!("interpreter probe exited with {}", status)));
            }
            let mut output = String::new();
            if let Some(mut stdout) = child.stdout.take() {
                stdout.read_to_string(&mut output)?;
            }
            let reported = output.trim();
            if reported.is_empty() {
                return Err(AppError::Internal("interpreter probe printed nothing".to_string()));
            }
            Ok(reported.to_string())
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(AppError::Internal(format!(
                "interpreter probe timed out after {} ms",
                timeout.as_millis()
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::probe_interpreter;
    use crate::errors::AppError;
    use std::path::Path;
    use std::time::Duration;

    fn write_fake_interpreter(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-python");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("chmod");
        path
    }

    #[test]
    fn reports_trimmed_interpreter_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fake = write_fake_interpreter(dir.path(), "echo '  /opt/venv/bin/python3  '");
        let reported = probe_interpreter(&fake, Duration::from_secs(3)).expect("probe");
        assert_eq!(reported, "/opt/venv/bin/python3");
    }

    #[test]
    fn failing_interpreter_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fake = write_fake_interpreter(dir.path(), "exit 1");
        let error = probe_interpreter(&fake, Duration::from_secs(3)).expect_err("probe should fail");
        assert!(matches!(error, AppError::Internal(_)));
    }

    #[test]
    fn hung_interpreter_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fake = write_fake_interpreter(dir.path(), "exec sleep 10");
        let error = probe_interpreter(&fake, Duration::from_millis(200)).expect_err("probe should time out");
        assert!(error.to_string().contains("timed out"));
    }
}

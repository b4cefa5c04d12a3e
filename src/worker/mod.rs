pub mod probe;
pub mod process;

use crate::errors::AppResult;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const WORKER_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// `program [interpreter_args...] script input`; the input path is always last.
    pub fn for_input(program: &Path, interpreter_args: &[String], script: &Path, input: &Path) -> Self {
        let mut args: Vec<OsString> = interpreter_args.iter().map(OsString::from).collect();
        args.push(script.as_os_str().to_os_string());
        args.push(input.as_os_str().to_os_string());
        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    pub fn display(&self) -> String {
        let mut rendered = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Sent once, after both output streams reached EOF.
    Exited(Option<i32>),
}

#[async_trait]
pub trait WorkerLink: Send {
    fn pid(&self) -> Option<u32>;

    /// Writes `text` plus a newline terminator to the worker's stdin.
    async fn write_line(&mut self, text: &str) -> AppResult<()>;

    async fn close_input(&mut self) -> AppResult<()>;

    async fn terminate(&mut self) -> AppResult<()>;
}

pub struct SpawnedWorker {
    pub link: Box<dyn WorkerLink>,
    pub events: mpsc::Receiver<WorkerEvent>,
}

pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, command: &WorkerCommand) -> AppResult<SpawnedWorker>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, command: &WorkerCommand) -> AppResult<SpawnedWorker> {
        let (process, events) = process::WorkerProcess::spawn(command)?;
        Ok(SpawnedWorker {
            link: Box::new(process),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WorkerCommand;
    use std::ffi::OsString;
    use std::path::Path;

    #[test]
    fn input_path_is_the_final_argument() {
        let command = WorkerCommand::for_input(
            Path::new("/usr/bin/python3"),
            &["-u".to_string()],
            Path::new("/opt/app/main.py"),
            Path::new("/videos/clip one.mp4"),
        );
        assert_eq!(
            command.args,
            vec![
                OsString::from("-u"),
                OsString::from("/opt/app/main.py"),
                OsString::from("/videos/clip one.mp4"),
            ]
        );
        assert_eq!(command.display(), "/usr/bin/python3 -u /opt/app/main.py /videos/clip one.mp4");
    }
}

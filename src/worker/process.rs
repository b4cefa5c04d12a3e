use super::{WorkerCommand, WorkerEvent, WorkerLink, WORKER_EVENT_CAPACITY};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

const READ_CHUNK_BYTES: usize = 4096;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn event(self, bytes: Vec<u8>) -> WorkerEvent {
        match self {
            Self::Stdout => WorkerEvent::Stdout(bytes),
            Self::Stderr => WorkerEvent::Stderr(bytes),
        }
    }
}

/// One spawned worker. Output arrives on the receiver returned by [`WorkerProcess::spawn`].
pub struct WorkerProcess {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    child: Arc<Mutex<Child>>,
}

impl WorkerProcess {
    pub fn spawn(command: &WorkerCommand) -> AppResult<(Self, mpsc::Receiver<WorkerEvent>)> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                AppError::Spawn(format!("failed to launch {}: {}", command.program.display(), error))
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tracing::info!(pid = ?pid, command = %command.display(), "worker spawned");

        let (sender, receiver) = mpsc::channel(WORKER_EVENT_CAPACITY);
        let stdout_task = stdout.map(|stream| tokio::spawn(pump_stream(stream, StreamKind::Stdout, sender.clone())));
        let stderr_task = stderr.map(|stream| tokio::spawn(pump_stream(stream, StreamKind::Stderr, sender.clone())));

        let child = Arc::new(Mutex::new(child));
        tokio::spawn(watch_exit(child.clone(), pid, stdout_task, stderr_task, sender));

        Ok((Self { pid, stdin, child }, receiver))
    }
}

#[async_trait]
impl WorkerLink for WorkerProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn write_line(&mut self, text: &str) -> AppResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AppError::ChannelClosed("worker stdin is already closed".to_string()));
        };

        let mut payload = String::with_capacity(text.len() + 1);
        payload.push_str(text);
        payload.push('\n');

        let written = async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(error) = written {
            self.stdin = None;
            return Err(AppError::ChannelClosed(format!("failed to write worker stdin: {}", error)));
        }
        Ok(())
    }

    async fn close_input(&mut self) -> AppResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|error| AppError::ChannelClosed(format!("failed to close worker stdin: {}", error)))?;
        }
        Ok(())
    }

    async fn terminate(&mut self) -> AppResult<()> {
        self.stdin = None;
        let mut child = self.child.lock().await;
        terminate_then_kill(&mut child).await
    }
}

async fn pump_stream<R>(stream: R, kind: StreamKind, sender: mpsc::Sender<WorkerEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut stream = stream;
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(size) => {
                if sender.send(kind.event(chunk[..size].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(stream = kind.as_str(), error = %error, "worker stream read failed");
                break;
            }
        }
    }
}

async fn watch_exit(
    child: Arc<Mutex<Child>>,
    pid: Option<u32>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    sender: mpsc::Sender<WorkerEvent>,
) {
    let exit_code = loop {
        let status = {
            let mut child = child.lock().await;
            child.try_wait()
        };
        match status {
            Ok(Some(status)) => break status.code(),
            Ok(None) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Err(error) => {
                tracing::error!(pid = ?pid, error = %error, "failed to poll worker status");
                break None;
            }
        }
    };

    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
    tracing::info!(pid = ?pid, exit_code = ?exit_code, "worker exited");
    let _ = sender.send(WorkerEvent::Exited(exit_code)).await;
}

async fn terminate_then_kill(child: &mut Child) -> AppResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    if timeout(Duration::from_millis(1500), child.wait()).await.is_ok() {
        return Ok(());
    }

    let _ = child.start_kill();
    let _ = timeout(Duration::from_secs(2), child.wait()).await;
    Ok(())
}

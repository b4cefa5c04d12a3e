use super::UiAdapter;
use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};

type PromptInput = Box<dyn BufRead + Send>;
type RenderOutput = Box<dyn Write + Send>;
type AnswerLines = mpsc::Receiver<std::io::Result<String>>;

/// Terminal stand-in for the file dialogs: prompts are answered one line at a time,
/// and a blank line or end of input counts as cancel.
///
/// Input is read on its own OS thread. A blocking read that nobody waits for any more
/// cannot be cancelled, so it must never sit on the runtime's blocking pool.
pub struct ConsoleUi {
    answers: Mutex<AnswerLines>,
    output: StdMutex<RenderOutput>,
    preset_input: Mutex<Option<PathBuf>>,
    preset_output: Mutex<Option<PathBuf>>,
}

impl ConsoleUi {
    pub fn stdio() -> Self {
        Self::with_io(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    pub fn with_io(input: PromptInput, output: RenderOutput) -> Self {
        Self {
            answers: Mutex::new(spawn_line_reader(input)),
            output: StdMutex::new(output),
            preset_input: Mutex::new(None),
            preset_output: Mutex::new(None),
        }
    }

    /// Answers consumed by the first prompt of each kind, before asking interactively.
    pub fn with_presets(self, input: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            preset_input: Mutex::new(input),
            preset_output: Mutex::new(output),
            ..self
        }
    }

    fn write_out(&self, text: &str) {
        let Ok(mut output) = self.output.lock() else {
            return;
        };
        let _ = output.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = output.write_all(b"\n");
        }
        let _ = output.flush();
    }

    async fn ask(&self, question: &str) -> Option<String> {
        if let Ok(mut output) = self.output.lock() {
            let _ = write!(output, "{} ", question);
            let _ = output.flush();
        }

        let mut answers = self.answers.lock().await;
        match answers.recv().await {
            None => None,
            Some(Ok(line)) => {
                let answer = line.trim();
                if answer.is_empty() {
                    None
                } else {
                    Some(answer.to_string())
                }
            }
            Some(Err(error)) => {
                tracing::warn!(error = %error, "failed to read prompt answer");
                None
            }
        }
    }
}

/// Forwards one line at a time; the thread ends at EOF, on a read error,
/// or once the console is dropped.
fn spawn_line_reader(mut input: PromptInput) -> AnswerLines {
    let (sender, receiver) = mpsc::channel(1);
    std::thread::spawn(move || loop {
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if sender.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(error) => {
                let _ = sender.blocking_send(Err(error));
                break;
            }
        }
    });
    receiver
}

#[async_trait]
impl UiAdapter for ConsoleUi {
    async fn prompt_open_file(&self) -> Option<PathBuf> {
        if let Some(preset) = self.preset_input.lock().await.take() {
            return Some(preset);
        }
        self.ask("Input file (blank to cancel):").await.map(PathBuf::from)
    }

    async fn prompt_save_file(&self, suggested_name: &str) -> Option<PathBuf> {
        if let Some(preset) = self.preset_output.lock().await.take() {
            return Some(with_suggested_name(preset, suggested_name));
        }
        let question = format!("Save output as [{}] (file or directory, blank to cancel):", suggested_name);
        self.ask(&question)
            .await
            .map(|answer| with_suggested_name(PathBuf::from(answer), suggested_name))
    }

    fn render(&self, text: &str) {
        self.write_out(text);
    }

    fn set_busy_label(&self, text: &str) {
        self.write_out(&format!("[{}]", text));
    }
}

/// A directory answer behaves like a save dialog opened there with the suggested name.
fn with_suggested_name(answer: PathBuf, suggested_name: &str) -> PathBuf {
    if answer.is_dir() {
        answer.join(Path::new(suggested_name))
    } else {
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::ConsoleUi;
    use crate::ui::UiAdapter;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("buffer lock")).into_owned()
        }
    }

    fn console(input: &'static str) -> (ConsoleUi, SharedBuffer) {
        let output = SharedBuffer::default();
        let ui = ConsoleUi::with_io(Box::new(input.as_bytes()), Box::new(output.clone()));
        (ui, output)
    }

    #[tokio::test]
    async fn blank_line_and_eof_cancel() {
        let (ui, _) = console("\n");
        assert_eq!(ui.prompt_open_file().await, None);
        assert_eq!(ui.prompt_open_file().await, None);
    }

    #[tokio::test]
    async fn presets_are_used_once_then_prompts_read_input() {
        let (ui, output) = console("/videos/second.mp4\n");
        let ui = ui.with_presets(Some(PathBuf::from("/videos/first.mp4")), None);

        assert_eq!(ui.prompt_open_file().await, Some(PathBuf::from("/videos/first.mp4")));
        assert_eq!(ui.prompt_open_file().await, Some(PathBuf::from("/videos/second.mp4")));
        assert!(output.text().contains("Input file"));
    }

    #[tokio::test]
    async fn directory_answer_gets_suggested_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (ui, output) = console("");
        let ui = ui.with_presets(None, Some(dir.path().to_path_buf()));

        let chosen = ui.prompt_save_file("vid-42.csv").await;
        assert_eq!(chosen, Some(dir.path().join("vid-42.csv")));
        assert_eq!(ui.prompt_save_file("vid-43.csv").await, None);
        assert!(output.text().contains("[vid-43.csv]"));
    }

    #[cfg(unix)]
    #[test]
    fn abandoned_prompt_does_not_block_runtime_shutdown() {
        use std::os::unix::net::UnixStream;
        use std::sync::mpsc;
        use std::time::Duration;

        let (reader, _writer) = UnixStream::pair().expect("socket pair");
        let ui = Arc::new(ConsoleUi::with_io(
            Box::new(std::io::BufReader::new(reader)),
            Box::new(SharedBuffer::default()),
        ));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let prompt = tokio::spawn({
                let ui = ui.clone();
                async move { ui.prompt_save_file("vid-1.csv").await }
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
            prompt.abort();
        });

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn render_terminates_lines_and_labels_are_bracketed() {
        let (ui, output) = console("");
        ui.render("10% done\n");
        ui.render("Finished");
        ui.set_busy_label("Loading...");
        assert_eq!(output.text(), "10% done\nFinished\n[Loading...]\n");
    }
}

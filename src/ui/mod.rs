pub mod console;

use async_trait::async_trait;
use std::path::PathBuf;

pub const LABEL_READY: &str = "Open File";
pub const LABEL_SELECTING_INPUT: &str = "Selecting file...";
pub const LABEL_LOADING: &str = "Loading...";

pub const TEXT_SELECTING_OUTPUT: &str = "Selecting output file...";
pub const TEXT_NO_OUTPUT_SELECTED: &str = "No output file selected.";

/// Human-facing surface of a session. Prompts may suspend for as long as the
/// human takes; the session keeps draining worker output meanwhile.
#[async_trait]
pub trait UiAdapter: Send + Sync {
    /// `None` means the human cancelled.
    async fn prompt_open_file(&self) -> Option<PathBuf>;

    /// `None` means the human cancelled.
    async fn prompt_save_file(&self, suggested_name: &str) -> Option<PathBuf>;

    fn render(&self, text: &str);

    fn set_busy_label(&self, text: &str);
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    SelectingInput,
    Running,
    AwaitingOutputPath,
    Done,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SelectingInput => "selecting-input",
            Self::Running => "running",
            Self::AwaitingOutputPath => "awaiting-output-path",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// How the worker's stdout is cut into candidate control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Each delivered read is one candidate, matching the historical wire behavior.
    #[default]
    Chunk,
    /// Bytes are buffered and split on line terminators.
    Line,
}

impl Framing {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Line => "line",
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chunk" => Ok(Self::Chunk),
            "line" => Ok(Self::Line),
            other => Err(format!("unknown framing '{}', expected 'chunk' or 'line'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub worker_executable: String,
    pub worker_script: String,
    pub interpreter_args: Vec<String>,
    pub framing: Framing,
    pub output_name_prefix: String,
    pub output_extension: String,
    pub worker_timeout_seconds: Option<u64>,
    pub terminate_orphaned_worker: bool,
    pub replace_finishing_worker: bool,
    pub probe_interpreter: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            worker_executable: "python3".to_string(),
            worker_script: "main.py".to_string(),
            interpreter_args: Vec::new(),
            framing: Framing::Chunk,
            output_name_prefix: "vid-".to_string(),
            output_extension: "csv".to_string(),
            worker_timeout_seconds: None,
            terminate_orphaned_worker: false,
            replace_finishing_worker: true,
            probe_interpreter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppSettings, Framing, SessionState};

    #[test]
    fn settings_serialize_in_camel_case() {
        let value = serde_json::to_value(AppSettings::default()).expect("serialize");
        assert_eq!(value["workerExecutable"], "python3");
        assert_eq!(value["framing"], "chunk");
        assert!(value["workerTimeoutSeconds"].is_null());
    }

    #[test]
    fn framing_parses_case_insensitively() {
        assert_eq!("LINE".parse::<Framing>(), Ok(Framing::Line));
        assert!("lines".parse::<Framing>().is_err());
    }

    #[test]
    fn session_state_names_match_serde() {
        let value = serde_json::to_value(SessionState::AwaitingOutputPath).expect("serialize");
        assert_eq!(value, SessionState::AwaitingOutputPath.as_str());
    }
}

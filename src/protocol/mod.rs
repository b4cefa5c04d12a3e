pub mod chunk;
pub mod line_buffer;

use crate::models::Framing;
use chunk::ChunkDecoder;
use line_buffer::LineDecoder;

/// Literal the worker prints when it blocks waiting for an output path on stdin.
pub const REQUEST_OUTPUT_PATH: &str = "REQUEST_OUTPUT_PATH";

const MAX_LINE_BUFFER_BYTES: usize = 2_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    ProgressText(String),
    RequestOutputPath,
}

impl ControlMessage {
    /// Classifies one candidate message. Sentinel detection compares the trimmed
    /// text, while progress keeps the original formatting.
    pub fn classify(candidate: String) -> Self {
        if candidate.trim() == REQUEST_OUTPUT_PATH {
            Self::RequestOutputPath
        } else {
            Self::ProgressText(candidate)
        }
    }
}

pub trait ControlDecoder: Send {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ControlMessage>;

    /// Called once the stdout stream has ended.
    fn finish(&mut self) -> Vec<ControlMessage> {
        Vec::new()
    }
}

pub fn decoder_for(framing: Framing) -> Box<dyn ControlDecoder> {
    match framing {
        Framing::Chunk => Box::new(ChunkDecoder),
        Framing::Line => Box::new(LineDecoder::new(Some(MAX_LINE_BUFFER_BYTES))),
    }
}

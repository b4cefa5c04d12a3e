use super::{ControlDecoder, ControlMessage};

/// Treats every delivered read as exactly one candidate message.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkDecoder;

impl ControlDecoder for ChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ControlMessage> {
        if chunk.is_empty() {
            return Vec::new();
        }
        vec![ControlMessage::classify(String::from_utf8_lossy(chunk).into_owned())]
    }
}

use super::{ControlDecoder, ControlMessage};

/// Byte buffer that reassembles lines across arbitrarily split reads.
/// Splits on `\n`, `\r\n` and bare `\r`, including a `\r\n` pair cut between two reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_buffer_bytes: Option<usize>,
    overflowed_bytes: usize,
    skip_leading_lf: bool,
}

impl LineBuffer {
    pub fn new(max_buffer_bytes: Option<usize>) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer_bytes,
            overflowed_bytes: 0,
            skip_leading_lf: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.skip_leading_lf && !chunk.is_empty() {
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
            self.skip_leading_lf = false;
        }
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        loop {
            let Some(idx) = self.buffer.iter().position(|byte| *byte == b'\n' || *byte == b'\r') else {
                break;
            };

            let line = String::from_utf8_lossy(&self.buffer[..idx]).into_owned();
            let mut advance = 1;
            if self.buffer[idx] == b'\r' {
                match self.buffer.get(idx + 1) {
                    Some(b'\n') => advance = 2,
                    Some(_) => {}
                    None => self.skip_leading_lf = true,
                }
            }
            self.buffer.drain(..idx + advance);
            lines.push(line);
        }

        if let Some(max) = self.max_buffer_bytes {
            if self.buffer.len() > max {
                let excess = self.buffer.len() - max;
                self.buffer.drain(..excess);
                self.overflowed_bytes = self.overflowed_bytes.saturating_add(excess);
            }
        }

        lines
    }

    pub fn consume_overflowed_bytes(&mut self) -> usize {
        std::mem::take(&mut self.overflowed_bytes)
    }

    pub fn flush(&mut self) -> String {
        self.skip_leading_lf = false;
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}

/// Line-framed decoder: every complete line is one candidate message.
#[derive(Debug, Default)]
pub struct LineDecoder {
    lines: LineBuffer,
}

impl LineDecoder {
    pub fn new(max_buffer_bytes: Option<usize>) -> Self {
        Self {
            lines: LineBuffer::new(max_buffer_bytes),
        }
    }
}

impl ControlDecoder for LineDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ControlMessage> {
        let lines = self.lines.push(chunk);
        let overflowed = self.lines.consume_overflowed_bytes();
        if overflowed > 0 {
            tracing::warn!(bytes = overflowed, "worker stdout line exceeded buffer; oldest bytes dropped");
        }
        lines
            .into_iter()
            .filter(|line| !line.is_empty())
            .map(ControlMessage::classify)
            .collect()
    }

    fn finish(&mut self) -> Vec<ControlMessage> {
        let leftover = self.lines.flush();
        if leftover.is_empty() {
            return Vec::new();
        }
        vec![ControlMessage::classify(leftover)]
    }
}

#[cfg(test)]
mod tests {
    use super::{LineBuffer, LineDecoder};
    use crate::protocol::{ControlDecoder, ControlMessage};

    #[test]
    fn splits_mixed_newlines() {
        let mut buffer = LineBuffer::new(None);
        let lines = buffer.push(b"a\nb\r\nc\rd");
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(buffer.flush(), "d");
    }

    #[test]
    fn crlf_split_across_reads_is_one_terminator() {
        let mut buffer = LineBuffer::new(None);
        assert_eq!(buffer.push(b"first\r"), vec!["first"]);
        assert_eq!(buffer.push(b"\nsecond\n"), vec!["second"]);
    }

    #[test]
    fn trims_when_over_limit() {
        let mut buffer = LineBuffer::new(Some(4));
        let _ = buffer.push(b"abcdef");
        assert_eq!(buffer.consume_overflowed_bytes(), 2);
        assert_eq!(buffer.consume_overflowed_bytes(), 0);
        assert_eq!(buffer.flush(), "cdef");
    }

    #[test]
    fn sentinel_split_across_reads_is_reassembled() {
        let mut decoder = LineDecoder::new(None);
        assert!(decoder.decode(b"REQUEST_OUT").is_empty());
        assert_eq!(decoder.decode(b"PUT_PATH\n"), vec![ControlMessage::RequestOutputPath]);
    }

    #[test]
    fn trailing_partial_line_is_flushed_on_finish() {
        let mut decoder = LineDecoder::new(None);
        assert_eq!(
            decoder.decode(b"\n\n50%\nFinished"),
            vec![ControlMessage::ProgressText("50%".to_string())]
        );
        assert_eq!(decoder.finish(), vec![ControlMessage::ProgressText("Finished".to_string())]);
        assert!(decoder.finish().is_empty());
    }
}

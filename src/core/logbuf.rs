use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_LOG_CAPACITY: usize = 400;

/// Bounded transcript of the most recent log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    capacity: usize,
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.max(1)))),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push_back(line.into());
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    /// Splits `text` on newlines, dropping a trailing empty segment.
    pub fn push_text(&self, text: &str) {
        let mut parts: Vec<&str> = text.split('\n').collect();
        if parts.last() == Some(&"") {
            parts.pop();
        }
        for part in parts {
            self.push(part.trim_end_matches('\r'));
        }
    }

    pub fn tail(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// `io::Write` handle handed to a tracing `fmt` layer.
pub struct LogBufferWriter {
    buffer: LogBuffer,
}

impl io::Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_text(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn keeps_only_most_recent_lines() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.tail(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn default_capacity_is_four_hundred() {
        let buffer = LogBuffer::default();
        for i in 0..450 {
            buffer.push(i.to_string());
        }
        assert_eq!(buffer.len(), DEFAULT_LOG_CAPACITY);
        assert_eq!(buffer.tail().first().map(String::as_str), Some("50"));
    }

    #[test]
    fn writer_splits_lines_and_strips_carriage_returns() {
        let buffer = LogBuffer::default();
        let mut writer = buffer.make_writer();
        writer.write_all(b"first\r\nsecond\n").unwrap();
        writer.write_all(b"third").unwrap();
        assert_eq!(buffer.tail(), vec!["first", "second", "third"]);
    }
}

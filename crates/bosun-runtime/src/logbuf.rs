//! Bounded in-memory log buffer

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Lines kept when no size is configured
pub const DEFAULT_LOG_BUFFER_SIZE: usize = 1000;

/// A captured log line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogLine {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Level name
    pub level: String,
    /// Event target (module path)
    pub target: String,
    /// Rendered message and fields
    pub message: String,
}

impl LogLine {
    /// Create a line stamped now
    pub fn new(level: impl Into<String>, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Single-line rendering
    pub fn render(&self) -> String {
        format!(
            "{} - {} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Ring buffer of log lines; the oldest line is dropped when full
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    max_lines: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `max_lines`
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines.min(1024)))),
            max_lines: max_lines.max(1),
        }
    }

    /// Append a line
    pub fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock();
        if lines.len() >= self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Lines, oldest first
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Rendered lines, oldest first
    pub fn rendered(&self) -> Vec<String> {
        self.lines.lock().iter().map(LogLine::render).collect()
    }

    /// Drop every line
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Number of lines held
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Maximum number of lines
    pub fn capacity(&self) -> usize {
        self.max_lines
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(LogLine::new("INFO", "bosun", format!("line {i}")));
        }

        let messages: Vec<_> = buffer.lines().into_iter().map(|l| l.message).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_clones_share_lines() {
        let buffer = LogBuffer::new(10);
        let sink = buffer.clone();
        sink.push(LogLine::new("DEBUG", "bosun::drain", "polling"));

        assert_eq!(buffer.len(), 1);
        assert!(buffer.rendered()[0].ends_with("DEBUG - bosun::drain - polling"));

        buffer.clear();
        assert!(sink.is_empty());
    }
}

//! Bounded log of formatted console lines

use super::Severity;
use chrono::{Local, NaiveTime};
use std::collections::VecDeque;

/// Format one line as `[HH:MM:SS] [TAG] message`
pub fn format_line(time: NaiveTime, severity: Severity, message: &str) -> String {
    format!("[{}] [{}] {}", time.format("%H:%M:%S"), severity.tag(), message)
}

/// Keeps the newest `capacity` lines, evicting the oldest first
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Format with the current local time and append; returns the stored line
    pub fn push(&mut self, severity: Severity, message: &str) -> &str {
        let line = format_line(Local::now().time(), severity, message);
        self.push_line(line)
    }

    /// Append an already formatted line
    pub fn push_line(&mut self, line: String) -> &str {
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.lines.back().map(String::as_str).unwrap_or_default()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_timestamp_and_tag() {
        let time = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(
            format_line(time, Severity::Warning, "Low disk space"),
            "[09:05:07] [WARN] Low disk space"
        );
        assert_eq!(
            format_line(time, Severity::Success, "done"),
            "[09:05:07] [OK] done"
        );
    }

    #[test]
    fn one_past_the_cap_evicts_the_oldest() {
        let mut log = LogBuffer::new(3);
        for i in 0..4 {
            log.push_line(format!("line {}", i));
        }
        assert_eq!(log.len(), 3);
        let kept: Vec<&str> = log.lines().collect();
        assert_eq!(kept, vec!["line 1", "line 2", "line 3"]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut log = LogBuffer::new(1000);
        for i in 0..2500 {
            log.push(Severity::Info, &format!("message {}", i));
        }
        assert_eq!(log.len(), 1000);
        assert!(log.lines().next().unwrap().ends_with("message 1500"));
    }

    #[test]
    fn push_returns_stored_line() {
        let mut log = LogBuffer::new(10);
        let line = log.push(Severity::Error, "boom").to_string();
        assert!(line.ends_with("[ERROR] boom"));
        assert_eq!(line.len(), "[00:00:00] [ERROR] boom".len());
    }
}

//! Script output log.
//!
//! Collects what a script prints into timestamped lines. Blank writes are
//! dropped, and timestamps never go backwards even if the wall clock does.

use scriptgate_core::Timestamp;

/// Timestamped output collector for one execution
#[derive(Debug, Clone)]
pub struct OutputCollector {
    enabled: bool,
    lines: Vec<String>,
    last: Option<Timestamp>,
}

impl OutputCollector {
    /// Enabled collector with no lines
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            lines: Vec::new(),
            last: None,
        }
    }

    /// Record `text` at the current time
    ///
    /// Returns whether a line was appended.
    pub fn write(&mut self, text: &str) -> bool {
        self.write_at(text, Timestamp::now())
    }

    /// Record `text` at `at`, clamped to the previous line's time
    pub fn write_at(&mut self, text: &str, at: Timestamp) -> bool {
        if !self.enabled || text.trim().is_empty() {
            return false;
        }
        let at = match self.last {
            Some(last) if last > at => last,
            _ => at,
        };
        self.last = Some(at);
        self.lines.push(format!("[{}] {}", at.to_iso8601(), text));
        true
    }

    /// Stop recording
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Resume recording
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Whether writes are recorded
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lines so far
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Take the lines
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl Default for OutputCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_datetime(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn test_blank_writes_dropped() {
        let mut out = OutputCollector::new();
        assert!(!out.write(""));
        assert!(!out.write("   \n"));
        assert!(out.write("hello"));
        assert_eq!(out.lines().len(), 1);
        assert!(out.lines()[0].ends_with("] hello"));
        assert!(out.lines()[0].starts_with('['));
    }

    #[test]
    fn test_disable_enable() {
        let mut out = OutputCollector::new();
        out.write("a");
        out.disable();
        assert!(!out.write("b"));
        out.enable();
        out.write("c");
        let texts: Vec<_> = out.lines().iter().map(|l| l.rsplit("] ").next().unwrap().to_string()).collect();
        assert_eq!(texts, vec!["a", "c"]);
    }

    #[test]
    fn test_clock_going_backwards_is_clamped() {
        let mut out = OutputCollector::new();
        out.write_at("first", at(10));
        out.write_at("second", at(5));
        assert!(out.lines()[1].starts_with(&format!("[{}]", at(10).to_iso8601())));
    }

    proptest! {
        #[test]
        fn test_lines_are_ordered(offsets in prop::collection::vec(0i64..1000, 1..30)) {
            let mut out = OutputCollector::new();
            for (i, o) in offsets.iter().enumerate() {
                out.write_at(&format!("line {i}"), at(*o));
            }
            let lines = out.into_lines();
            prop_assert_eq!(lines.len(), offsets.len());
            for pair in lines.windows(2) {
                prop_assert!(pair[0][..29] <= pair[1][..29]);
            }
        }
    }
}

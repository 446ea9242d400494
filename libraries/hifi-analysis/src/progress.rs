//! Progress reporting to a caller-provided text sink
//!
//! The sink only receives human-readable status lines at coarse milestones.
//! It has no return value and cannot influence the measurement.

/// Accepts human-readable status messages
pub trait ProgressSink {
    fn send_message(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str),
{
    fn send_message(&self, message: &str) {
        self(message);
    }
}

/// Sink that drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn send_message(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink() {
        let log = RefCell::new(Vec::new());
        let sink = |m: &str| log.borrow_mut().push(m.to_string());
        sink.send_message("alignment started");
        NoProgress.send_message("ignored");
        assert_eq!(*log.borrow(), vec!["alignment started".to_string()]);
    }
}

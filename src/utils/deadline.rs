// src/utils/deadline.rs
use crate::core::{LimeError, Result};
use std::time::{Duration, Instant};

/// Wall-clock budget for one explanation, checked between stages.
///
/// A running classifier call is never interrupted; the check happens as soon
/// as it returns.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::start(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self, stage: &'static str) -> Result<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let elapsed = self.elapsed();
        if elapsed > limit {
            return Err(LimeError::Timeout {
                stage,
                elapsed,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_expires() {
        let deadline = Deadline::unlimited();
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.check("sampling").is_ok());
    }

    #[test]
    fn expired_deadline_reports_stage() {
        let deadline = Deadline::start(Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        match deadline.check("fitting") {
            Err(LimeError::Timeout { stage, limit, .. }) => {
                assert_eq!(stage, "fitting");
                assert_eq!(limit, Duration::from_millis(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}

use chrono::TimeDelta;

use crate::core::time::{Clock, TD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { elapsed: TimeDelta, iterations: usize },
    TimedOut { elapsed: TimeDelta, iterations: usize },
}

impl PollOutcome {
    pub fn elapsed(&self) -> TimeDelta {
        match self {
            PollOutcome::Completed { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        TD(self.elapsed()).seconds()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed { .. })
    }
}

/// Runs a step, then sleeps, until the step says it is done or the timeout
/// expires. The step always runs at least once.
#[derive(Debug, Clone, Copy)]
pub struct PollLoop {
    timeout: TimeDelta,
    interval: TimeDelta,
    report_every: Option<TimeDelta>,
}

impl PollLoop {
    pub fn new(timeout: TimeDelta, interval: TimeDelta) -> Self {
        Self {
            timeout,
            interval,
            report_every: None,
        }
    }

    /// Call the progress reporter once every `period` of elapsed time
    pub fn report_every(mut self, period: TimeDelta) -> Self {
        self.report_every = (period > TimeDelta::zero()).then_some(period);
        self
    }

    pub fn run<E>(
        &self,
        clock: &dyn Clock,
        mut step: impl FnMut() -> Result<Step, E>,
        mut report: impl FnMut(TimeDelta),
    ) -> Result<PollOutcome, E> {
        let start = clock.monotonic();
        let mut iterations = 0;
        let mut last_report = 0;

        loop {
            iterations += 1;
            let status = step()?;
            let elapsed = clock.monotonic().duration_since(&start);

            if status == Step::Done {
                return Ok(PollOutcome::Completed {
                    elapsed,
                    iterations,
                });
            }

            if elapsed >= self.timeout {
                return Ok(PollOutcome::TimedOut {
                    elapsed,
                    iterations,
                });
            }

            if let Some(period) = self.report_every {
                let bucket = elapsed.num_microseconds().unwrap_or(i64::MAX)
                    / period.num_microseconds().unwrap_or(i64::MAX).max(1);

                if bucket > last_report {
                    last_report = bucket;
                    report(elapsed);
                }
            }

            clock.sleep(self.interval);
        }
    }
}

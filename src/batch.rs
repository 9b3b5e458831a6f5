//! Resumable offset/limit batch driver.
//!
//! Every multi-pass job pages through the store with a `BatchCursor`: run `n`
//! reads rows `[n * size, (n + 1) * size)`, does its work and commits it
//! before run `n + 1` starts. Interrupting a job after run `n` leaves that
//! run's effects in place; restarting with [`BatchCursor::starting_at`]
//! resumes there. Units of work must therefore be idempotent.

use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::Result;

/// Outcome of one unit of work. Errors stop the loop and propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// No more rows.
    Stop,
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exhausted,
    RunLimit,
}

/// Position of the current run.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub run: usize,
    pub size: usize,
    pub offset: usize,
}

/// One fetched page and the offset it was read from.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub offset: usize,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// Units of work invoked.
    pub runs: usize,
    /// Run to resume from.
    pub next_run: usize,
    pub completion: Completion,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchCursor {
    size: usize,
    /// 0 means unlimited.
    run_limit: usize,
    start_run: usize,
}

impl BatchCursor {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            run_limit: 0,
            start_run: 0,
        }
    }

    pub fn with_run_limit(mut self, run_limit: usize) -> Self {
        self.run_limit = run_limit;
        self
    }

    pub fn starting_at(mut self, run: usize) -> Self {
        self.start_run = run;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self, run: usize) -> usize {
        run * self.size
    }

    fn context(&self, run: usize) -> RunContext {
        RunContext {
            run,
            size: self.size,
            offset: self.offset(run),
        }
    }

    /// Fetch the page for `run` with a `(limit, offset)` query.
    pub fn fetch<T, F>(&self, run: usize, query: F) -> Result<Page<T>>
    where
        F: FnOnce(usize, usize) -> Result<Vec<T>>,
    {
        let offset = self.offset(run);
        let rows = query(self.size, offset)?;
        Ok(Page { rows, offset })
    }

    /// Invoke `unit` with increasing run numbers until it returns
    /// [`Flow::Stop`], fails, or the run limit is reached.
    pub fn drive<S, F>(&self, state: &mut S, mut unit: F) -> Result<RunReport>
    where
        F: FnMut(&mut S, &RunContext) -> Result<Flow>,
    {
        let started = Instant::now();
        let mut run = self.start_run;
        let mut runs = 0usize;

        let completion = loop {
            if self.run_limit > 0 && runs >= self.run_limit {
                break Completion::RunLimit;
            }

            let ctx = self.context(run);
            debug!(run = ctx.run, offset = ctx.offset, size = ctx.size, "Starting run");

            let flow = match unit(state, &ctx) {
                Ok(flow) => flow,
                Err(e) => {
                    error!(run = ctx.run, offset = ctx.offset, "Run failed: {}", e);
                    return Err(e);
                }
            };
            runs += 1;

            match flow {
                Flow::Continue => run += 1,
                Flow::Stop => break Completion::Exhausted,
            }
        };

        let report = RunReport {
            runs,
            next_run: run,
            completion,
            elapsed: started.elapsed(),
        };
        info!(
            runs = report.runs,
            next_run = report.next_run,
            "Batch loop finished ({:?}) in {:.1}s",
            report.completion,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn rows(total: usize) -> Vec<usize> {
        (0..total).collect()
    }

    #[test]
    fn test_offsets() {
        let cursor = BatchCursor::new(25);
        assert_eq!(cursor.offset(0), 0);
        assert_eq!(cursor.offset(3), 75);
        let page = cursor
            .fetch(2, |limit, offset| {
                assert_eq!((limit, offset), (25, 50));
                Ok(vec![1])
            })
            .unwrap();
        assert_eq!(page.offset, 50);
    }

    #[test]
    fn test_drive_until_exhausted() {
        let data = rows(10);
        let cursor = BatchCursor::new(4);
        let mut seen = Vec::new();
        let report = cursor
            .drive(&mut seen, |seen, ctx| {
                let page = cursor.fetch(ctx.run, |limit, offset| {
                    Ok(data.iter().skip(offset).take(limit).copied().collect())
                })?;
                if page.is_empty() {
                    return Ok(Flow::Stop);
                }
                seen.extend(page.rows);
                Ok(Flow::Continue)
            })
            .unwrap();

        assert_eq!(seen, data);
        assert_eq!(report.completion, Completion::Exhausted);
        // three full or partial pages plus the empty one
        assert_eq!(report.runs, 4);
        assert_eq!(report.next_run, 3);
    }

    #[test]
    fn test_run_limit_and_resume() {
        let data = rows(10);
        let unit = |seen: &mut Vec<usize>, ctx: &RunContext| -> Result<Flow> {
            let page: Vec<usize> = data.iter().skip(ctx.offset).take(ctx.size).copied().collect();
            if page.is_empty() {
                return Ok(Flow::Stop);
            }
            seen.extend(page);
            Ok(Flow::Continue)
        };

        let mut seen = Vec::new();
        let first = BatchCursor::new(3)
            .with_run_limit(2)
            .drive(&mut seen, unit)
            .unwrap();
        assert_eq!(first.completion, Completion::RunLimit);
        assert_eq!(seen, rows(6));

        let second = BatchCursor::new(3)
            .starting_at(first.next_run)
            .drive(&mut seen, unit)
            .unwrap();
        assert_eq!(second.completion, Completion::Exhausted);
        assert_eq!(seen, data);
    }

    #[test]
    fn test_error_stops_loop() {
        let mut calls = 0;
        let err = BatchCursor::new(1)
            .drive(&mut calls, |calls, ctx| {
                *calls += 1;
                if ctx.run == 2 {
                    return Err(Error::Verify("boom".to_string()));
                }
                Ok(Flow::Continue)
            })
            .unwrap_err();
        assert!(matches!(err, Error::Verify(_)));
        assert_eq!(calls, 3);
    }
}

//! Run reporting and output generation.
//!
//! Reporters observe a run through the [`Reporter`] trait. The console
//! reporter draws a progress bar and a summary; the JUnit reporter writes a
//! JUnit XML file for CI systems. [`MultiReporter`] fans events out to
//! several reporters at once.

pub mod junit;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::orchestrator::{CaseOutcome, CaseResult, RunResult, TestCase};

pub use junit::JUnitReporter;

/// A reporter receives events during a regression run.
///
/// Case events arrive from concurrently running work items, in completion
/// order.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once the cases are known, before any is routed.
    async fn on_suite_start(&self, cases: &[TestCase]);

    /// Called when a case is admitted to the run queue.
    async fn on_case_start(&self, case: &TestCase);

    /// Called when a case has been routed and compared.
    async fn on_case_complete(&self, result: &CaseResult);

    /// Called when every case has completed.
    async fn on_run_complete(&self, result: &RunResult);
}

/// A reporter that does nothing (for testing or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_suite_start(&self, _cases: &[TestCase]) {}
    async fn on_case_start(&self, _case: &TestCase) {}
    async fn on_case_complete(&self, _result: &CaseResult) {}
    async fn on_run_complete(&self, _result: &RunResult) {}
}

/// A reporter that combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    /// Create a new multi-reporter.
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Add a reporter to the multi-reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Number of wrapped reporters.
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    /// Returns true if no reporter is wrapped.
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_suite_start(&self, cases: &[TestCase]) {
        for reporter in &self.reporters {
            reporter.on_suite_start(cases).await;
        }
    }

    async fn on_case_start(&self, case: &TestCase) {
        for reporter in &self.reporters {
            reporter.on_case_start(case).await;
        }
    }

    async fn on_case_complete(&self, result: &CaseResult) {
        for reporter in &self.reporters {
            reporter.on_case_complete(result).await;
        }
    }

    async fn on_run_complete(&self, result: &RunResult) {
        for reporter in &self.reporters {
            reporter.on_run_complete(result).await;
        }
    }
}

/// Console reporter that shows progress in the terminal.
pub struct ConsoleReporter {
    progress: Mutex<Option<indicatif::ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter.
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: Mutex::new(None),
            verbose,
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Option<indicatif::ProgressBar>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_suite_start(&self, cases: &[TestCase]) {
        println!("Running {} test cases", cases.len());

        let pb = indicatif::ProgressBar::new(cases.len() as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        *self.progress() = Some(pb);
    }

    async fn on_case_start(&self, case: &TestCase) {
        if self.verbose {
            let line = format!("Routing: {}", case.id());
            match self.progress().as_ref() {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            }
        }
    }

    async fn on_case_complete(&self, result: &CaseResult) {
        if let Some(pb) = self.progress().as_ref() {
            pb.inc(1);

            let outcome = result.outcome();
            if self.verbose || outcome != CaseOutcome::Passed {
                pb.println(format!("{} {}", status_label(outcome), result.case.id()));
            }
        }
    }

    async fn on_run_complete(&self, result: &RunResult) {
        if let Some(pb) = self.progress().take() {
            pb.finish_and_clear();
        }

        print_summary(result);
    }
}

fn status_label(outcome: CaseOutcome) -> console::StyledObject<&'static str> {
    match outcome {
        CaseOutcome::Passed => console::style("PASS").green(),
        CaseOutcome::Failed => console::style("FAIL").red(),
        CaseOutcome::Error => console::style("ERR ").red().bold(),
    }
}

/// Prints a summary of the run to the console.
///
/// Lists every non-passing case with its explanation.
pub fn print_summary(result: &RunResult) {
    println!();
    println!("Route Comparison Results:");
    println!("  Total:   {}", result.total_cases);
    println!("  Passed:  {}", console::style(result.passed).green());
    println!("  Failed:  {}", console::style(result.failed).red());

    if result.errors > 0 {
        println!("  Errors:  {}", console::style(result.errors).red().bold());
    }

    println!("  Duration: {:?}", result.duration);

    if result.success() {
        println!();
        println!("{}", console::style("All routes match!").green().bold());
        return;
    }

    println!();
    println!("{}", console::style("Some routes differ.").red().bold());
    println!();
    println!("Failing cases:");
    for r in result
        .results
        .iter()
        .filter(|r| r.outcome() != CaseOutcome::Passed)
    {
        println!("  {} {}", status_label(r.outcome()), r.case.id());
        if let Some(msg) = r.message() {
            println!("    {}", console::style(msg).dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::orchestrator::RouteComparison;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Reporter for Counting {
        async fn on_suite_start(&self, _cases: &[TestCase]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_case_start(&self, _case: &TestCase) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_case_complete(&self, _result: &CaseResult) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_run_complete(&self, _result: &RunResult) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_multi_reporter_fans_out() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let multi = MultiReporter::new()
            .with_reporter(Counting(Arc::clone(&first)))
            .with_reporter(Counting(Arc::clone(&second)));
        assert_eq!(multi.len(), 2);

        let case = TestCase::new([0.0, 0.0], [1.0, 1.0]);
        let result = CaseResult {
            case: case.clone(),
            comparison: RouteComparison {
                expected: Err("down".to_string()),
                actual: Err("down".to_string()),
            },
            duration: Duration::ZERO,
        };

        multi.on_suite_start(std::slice::from_ref(&case)).await;
        multi.on_case_start(&case).await;
        multi.on_case_complete(&result).await;
        multi
            .on_run_complete(&RunResult::from_results(vec![result], Duration::ZERO))
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 4);
        assert_eq!(second.load(Ordering::SeqCst), 4);
    }
}

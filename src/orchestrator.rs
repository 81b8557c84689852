//! Regression run orchestration.
//!
//! The orchestrator turns test cases into work items for a [`RunQueue`]:
//! each item routes one case with the expected and the actual profile and
//! compares the two geometries.
//!
//! # Architecture
//!
//! ```text
//!   Profiles ── resolve_profiles() ── upload profile text ──► profile ids
//!                                                               │
//!   Vec<TestCase> ──► RunQueue::add(run_case_item, ..) × N      │
//!                              │                                │
//!                              │ run() (≤ max_concurrency)      │
//!                              ▼                                ▼
//!                      run_case() ── RouteClient::route() × 2 (joined)
//!                              │
//!                              ▼
//!                      CaseResult ──► Reporter::on_case_complete()
//!                              │
//!                              ▼
//!           RunHandle ──► Vec<CaseResult> ──► RunResult ──► Reporter
//! ```
//!
//! A route request that fails is recorded on its test case as an error, so a
//! suite only aborts on infrastructure problems: a profile upload that is
//! refused, or a work item that panics.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use routecheck::orchestrator::{Orchestrator, Profiles, TestCase};
//! use routecheck::queue::QueueOptions;
//! use routecheck::report::ConsoleReporter;
//! use routecheck::routing::BrouterClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BrouterClient::new("http://localhost:17777", Duration::from_secs(60))?;
//!     let options = QueueOptions { max_concurrency: Some(4) };
//!     let orchestrator = Orchestrator::new(client, ConsoleReporter::new(false), &options);
//!
//!     let profiles = Profiles::new("trekking", "trekking-dev");
//!     let cases = vec![TestCase::new([13.38, 52.51], [13.40, 52.52])];
//!
//!     let result = orchestrator.run_suite(profiles, cases).await?;
//!     std::process::exit(result.exit_code());
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{RouteGeoJson, same_geometry};
use crate::queue::{QueueError, QueueOptions, RunQueue, WorkPanic};
use crate::report::Reporter;
use crate::routing::{Point, RouteClient, RouteRequest};

/// A pair of points to route between.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestCase {
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Route origin as `[lon, lat]`.
    pub start_point: Point,

    /// Route destination as `[lon, lat]`.
    pub end_point: Point,
}

impl TestCase {
    /// Creates an unnamed test case.
    pub fn new(start_point: Point, end_point: Point) -> Self {
        Self {
            name: None,
            start_point,
            end_point,
        }
    }

    /// Sets the case name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Identifier used in reports: the name, or the coordinates.
    ///
    /// ```
    /// use routecheck::orchestrator::TestCase;
    ///
    /// let case = TestCase::new([13.38, 52.51], [13.4, 52.52]);
    /// assert_eq!(case.id(), "13.38,52.51->13.4,52.52");
    /// assert_eq!(case.with_name("hop").id(), "hop");
    /// ```
    pub fn id(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "{},{}->{},{}",
                self.start_point[0], self.start_point[1], self.end_point[0], self.end_point[1]
            ),
        }
    }
}

/// The two profiles a suite is routed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
    /// Baseline profile name, id or text.
    pub expected: String,
    /// Profile under test.
    pub actual: String,
}

impl Profiles {
    /// Creates a profile pair.
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// One side's route, or why there is none.
pub type RouteOutcome = Result<RouteGeoJson, String>;

/// The expected and actual routes of one test case.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteComparison {
    /// Route computed with the expected profile.
    pub expected: RouteOutcome,
    /// Route computed with the actual profile.
    pub actual: RouteOutcome,
}

impl RouteComparison {
    /// The first routing error, expected side first.
    pub fn error(&self) -> Option<&str> {
        self.expected
            .as_ref()
            .err()
            .or_else(|| self.actual.as_ref().err())
            .map(String::as_str)
    }

    /// Returns `true` if both routes exist and their geometries match.
    pub fn ok(&self) -> bool {
        match (&self.expected, &self.actual) {
            (Ok(expected), Ok(actual)) => same_geometry(expected, actual),
            _ => false,
        }
    }
}

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseOutcome {
    /// Both profiles produced the same geometry.
    Passed,
    /// Both profiles produced a route but the geometries differ.
    Failed,
    /// At least one route request failed.
    Error,
}

/// Result of routing and comparing one test case.
#[derive(Debug, Clone)]
pub struct CaseResult {
    /// The case that was run.
    pub case: TestCase,
    /// Both routes.
    pub comparison: RouteComparison,
    /// Wall-clock time for both requests.
    pub duration: Duration,
}

impl CaseResult {
    /// Classifies the comparison.
    pub fn outcome(&self) -> CaseOutcome {
        if self.comparison.error().is_some() {
            CaseOutcome::Error
        } else if self.comparison.ok() {
            CaseOutcome::Passed
        } else {
            CaseOutcome::Failed
        }
    }

    /// Explanation for a non-passing case.
    pub fn message(&self) -> Option<String> {
        match self.outcome() {
            CaseOutcome::Passed => None,
            CaseOutcome::Error => self.comparison.error().map(str::to_string),
            CaseOutcome::Failed => {
                let (Ok(expected), Ok(actual)) =
                    (&self.comparison.expected, &self.comparison.actual)
                else {
                    return None;
                };
                Some(format!(
                    "geometry differs: expected {} points ({}), actual {} points ({})",
                    point_count(expected),
                    describe_length(expected),
                    point_count(actual),
                    describe_length(actual),
                ))
            }
        }
    }
}

fn point_count(route: &RouteGeoJson) -> usize {
    route.geometry().map_or(0, |g| g.coordinates.len())
}

fn describe_length(route: &RouteGeoJson) -> String {
    match route.track_length() {
        Some(meters) => format!("{} m", meters),
        None => "length unknown".to_string(),
    }
}

/// Errors that abort a whole suite.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SuiteError {
    /// Uploading inline profile text failed.
    #[error("Failed to upload {side} profile: {message}")]
    ProfileUpload {
        /// `"expected"` or `"actual"`.
        side: &'static str,
        /// Reason reported by the client.
        message: String,
    },

    /// A work item panicked, or the run was abandoned.
    #[error(transparent)]
    Panicked(#[from] WorkPanic),

    /// The run queue refused work.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Aggregated results of an entire regression run.
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | Every case produced identical geometry |
/// | 1 | Some case differed or could not be routed |
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Number of cases run.
    pub total_cases: usize,

    /// Cases whose geometries matched.
    pub passed: usize,

    /// Cases whose geometries differed.
    pub failed: usize,

    /// Cases where a route request failed.
    pub errors: usize,

    /// Wall-clock duration of the run, including profile uploads.
    pub duration: Duration,

    /// Per-case results, in completion order.
    pub results: Vec<CaseResult>,
}

impl RunResult {
    /// Builds the summary for `results`.
    pub fn from_results(results: Vec<CaseResult>, duration: Duration) -> Self {
        let count = |outcome: CaseOutcome| {
            results
                .iter()
                .filter(|r| r.outcome() == outcome)
                .count()
        };

        Self {
            total_cases: results.len(),
            passed: count(CaseOutcome::Passed),
            failed: count(CaseOutcome::Failed),
            errors: count(CaseOutcome::Error),
            duration,
            results,
        }
    }

    /// Returns `true` if every case passed.
    ///
    /// ```
    /// use routecheck::orchestrator::RunResult;
    /// use std::time::Duration;
    ///
    /// let result = RunResult::from_results(vec![], Duration::ZERO);
    /// assert!(result.success());
    /// assert_eq!(result.exit_code(), 0);
    /// ```
    pub fn success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// Returns an appropriate process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// Returns `true` if `profile` is profile source text rather than a name.
pub fn is_profile_text(profile: &str) -> bool {
    profile.contains(' ')
}

/// Uploads any profile given as source text and substitutes the returned id.
///
/// # Errors
///
/// Returns [`SuiteError::ProfileUpload`] if the service refuses a profile.
pub async fn resolve_profiles<C>(client: &C, profiles: Profiles) -> Result<Profiles, SuiteError>
where
    C: RouteClient + ?Sized,
{
    let expected = resolve_profile(client, "expected", profiles.expected).await?;
    let actual = resolve_profile(client, "actual", profiles.actual).await?;
    Ok(Profiles { expected, actual })
}

async fn resolve_profile<C>(
    client: &C,
    side: &'static str,
    profile: String,
) -> Result<String, SuiteError>
where
    C: RouteClient + ?Sized,
{
    if !is_profile_text(&profile) {
        return Ok(profile);
    }

    let id = client
        .upload_profile(&profile)
        .await
        .map_err(|e| SuiteError::ProfileUpload {
            side,
            message: e.to_string(),
        })?;

    info!("Uploaded {} profile as {}", side, id);
    Ok(id)
}

/// Routes `case` with both profiles concurrently and compares the results.
pub async fn run_case<C>(client: &C, profiles: &Profiles, case: TestCase) -> CaseResult
where
    C: RouteClient + ?Sized,
{
    let start = Instant::now();
    let expected_request = RouteRequest::new(case.start_point, case.end_point, &profiles.expected);
    let actual_request = RouteRequest::new(case.start_point, case.end_point, &profiles.actual);

    let (expected, actual) = tokio::join!(
        client.route(&expected_request),
        client.route(&actual_request)
    );

    let comparison = RouteComparison {
        expected: expected.map_err(|e| e.to_string()),
        actual: actual.map_err(|e| e.to_string()),
    };

    debug!("Case {} finished in {:?}", case.id(), start.elapsed());

    CaseResult {
        case,
        comparison,
        duration: start.elapsed(),
    }
}

type CaseArgs<C, R> = (Arc<C>, Arc<R>, Arc<Profiles>, TestCase);

async fn run_case_item<C, R>(
    (client, reporter, profiles, case): CaseArgs<C, R>,
) -> Result<CaseResult, SuiteError>
where
    C: RouteClient,
    R: Reporter,
{
    reporter.on_case_start(&case).await;
    let result = run_case(client.as_ref(), &profiles, case).await;
    reporter.on_case_complete(&result).await;
    Ok(result)
}

/// Runs regression suites against a routing service.
///
/// # Type Parameters
///
/// - `C`: The routing client type
/// - `R`: The reporter type
pub struct Orchestrator<C, R> {
    client: Arc<C>,
    reporter: Arc<R>,
    queue: QueueOptions,
}

impl<C, R> Orchestrator<C, R>
where
    C: RouteClient + 'static,
    R: Reporter + 'static,
{
    /// Creates a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `client` - Routing service client
    /// * `reporter` - Reporter for progress and results
    /// * `queue` - Run queue options (concurrency ceiling)
    pub fn new(client: C, reporter: R, queue: &QueueOptions) -> Self {
        Self {
            client: Arc::new(client),
            reporter: Arc::new(reporter),
            queue: queue.clone(),
        }
    }

    /// Runs every case and returns the aggregated result.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] if a profile upload fails or a work item
    /// panics. No partial results are returned in that case.
    pub async fn run_suite(
        &self,
        profiles: Profiles,
        cases: Vec<TestCase>,
    ) -> Result<RunResult, SuiteError> {
        let start = Instant::now();

        info!("Using routing client: {}", self.client.name());
        let profiles = Arc::new(resolve_profiles(self.client.as_ref(), profiles).await?);

        if cases.is_empty() {
            warn!("No test cases to run");
        }
        self.reporter.on_suite_start(&cases).await;

        let queue: RunQueue<CaseResult, SuiteError> = RunQueue::from_options(&self.queue);
        info!(
            "Queued {} cases (max {} concurrent)",
            cases.len(),
            queue.max_concurrency()
        );

        for case in cases {
            let args = (
                Arc::clone(&self.client),
                Arc::clone(&self.reporter),
                Arc::clone(&profiles),
                case,
            );
            queue.add(run_case_item::<C, R>, args)?;
        }

        let results = queue.run().await?;
        let run_result = RunResult::from_results(results, start.elapsed());

        self.reporter.on_run_complete(&run_result).await;

        Ok(run_result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::report::NullReporter;
    use crate::routing::{RoutingError, RoutingResult};

    fn line(coordinates: &[[f64; 2]], length: &str) -> RouteGeoJson {
        serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "track-length": length },
                "geometry": { "type": "LineString", "coordinates": coordinates }
            }]
        }))
        .unwrap()
    }

    /// Answers per profile name; unknown profiles get a 400.
    #[derive(Default)]
    struct FakeClient {
        routes: HashMap<String, RouteGeoJson>,
        uploads: Mutex<Vec<String>>,
        reject_uploads: bool,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeClient {
        fn with_route(mut self, profile: &str, route: RouteGeoJson) -> Self {
            self.routes.insert(profile.to_string(), route);
            self
        }
    }

    #[async_trait]
    impl RouteClient for FakeClient {
        async fn route(&self, request: &RouteRequest) -> RoutingResult<RouteGeoJson> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            self.routes
                .get(&request.profile)
                .cloned()
                .ok_or_else(|| RoutingError::Status {
                    status: 400,
                    body: format!("unknown profile {}", request.profile),
                })
        }

        async fn upload_profile(&self, profile: &str) -> RoutingResult<String> {
            if self.reject_uploads {
                return Err(RoutingError::Rejected("does not compile".to_string()));
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(profile.to_string());
            Ok(format!("custom_{}", uploads.len()))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn test_comparison_outcomes() {
        let a = line(&[[1.0, 2.0], [3.0, 4.0]], "10");
        let b = line(&[[1.0, 2.0], [3.0, 5.0]], "12");

        let same = RouteComparison {
            expected: Ok(a.clone()),
            actual: Ok(a.clone()),
        };
        assert!(same.ok());
        assert_eq!(same.error(), None);

        let differ = RouteComparison {
            expected: Ok(a.clone()),
            actual: Ok(b),
        };
        assert!(!differ.ok());

        let broken = RouteComparison {
            expected: Err("first".to_string()),
            actual: Err("second".to_string()),
        };
        assert!(!broken.ok());
        assert_eq!(broken.error(), Some("first"));

        let one_sided = RouteComparison {
            expected: Ok(a),
            actual: Err("no route".to_string()),
        };
        assert_eq!(one_sided.error(), Some("no route"));
    }

    #[test]
    fn test_failed_case_message() {
        let result = CaseResult {
            case: TestCase::new([0.0, 0.0], [1.0, 1.0]),
            comparison: RouteComparison {
                expected: Ok(line(&[[0.0, 0.0], [1.0, 1.0]], "150")),
                actual: Ok(line(&[[0.0, 0.0], [0.5, 0.5], [1.0, 1.0]], "162")),
            },
            duration: Duration::ZERO,
        };

        assert_eq!(result.outcome(), CaseOutcome::Failed);
        assert_eq!(
            result.message().unwrap(),
            "geometry differs: expected 2 points (150 m), actual 3 points (162 m)"
        );
    }

    #[test]
    fn test_profile_text_detection() {
        assert!(!is_profile_text("trekking"));
        assert!(is_profile_text("---context:global\nassign validForBikes = true"));
    }

    #[tokio::test]
    async fn test_resolve_profiles_uploads_text_only() {
        let client = FakeClient::default();
        let profiles = resolve_profiles(
            &client,
            Profiles::new("trekking", "assign turnInstructionMode = 1"),
        )
        .await
        .unwrap();

        assert_eq!(profiles.expected, "trekking");
        assert_eq!(profiles.actual, "custom_1");
        assert_eq!(
            *client.uploads.lock().unwrap(),
            vec!["assign turnInstructionMode = 1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_upload_aborts_suite() {
        let client = FakeClient {
            reject_uploads: true,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(client, NullReporter, &QueueOptions::default());

        let err = orchestrator
            .run_suite(
                Profiles::new("assign x = 1", "trekking"),
                vec![TestCase::new([0.0, 0.0], [1.0, 1.0])],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SuiteError::ProfileUpload { side: "expected", .. }));
        assert!(err.to_string().contains("does not compile"));
    }

    #[tokio::test]
    async fn test_run_suite_counts_outcomes() {
        let route = line(&[[1.0, 2.0], [3.0, 4.0]], "100");
        let client = FakeClient::default()
            .with_route("stable", route.clone())
            .with_route("same", route)
            .with_route("changed", line(&[[1.0, 2.0], [3.5, 4.0]], "101"));

        // One orchestrator serves several suites.
        let orchestrator = Orchestrator::new(client, NullReporter, &QueueOptions::default());
        let cases = vec![
            TestCase::new([1.0, 2.0], [3.0, 4.0]).with_name("one"),
            TestCase::new([1.0, 2.0], [3.0, 4.0]).with_name("two"),
        ];

        let passing = orchestrator
            .run_suite(Profiles::new("stable", "same"), cases.clone())
            .await
            .unwrap();
        assert_eq!(passing.total_cases, 2);
        assert_eq!(passing.passed, 2);
        assert!(passing.success());

        let failing = orchestrator
            .run_suite(Profiles::new("stable", "changed"), cases.clone())
            .await
            .unwrap();
        assert_eq!(failing.failed, 2);
        assert_eq!(failing.exit_code(), 1);

        let erroring = orchestrator
            .run_suite(Profiles::new("stable", "missing"), cases)
            .await
            .unwrap();
        assert_eq!(erroring.errors, 2);
        assert_eq!(
            erroring.results[0].message().unwrap(),
            "Routing service returned 400: unknown profile missing"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_suite_respects_ceiling() {
        let route = line(&[[0.0, 0.0], [1.0, 1.0]], "1");
        let client = FakeClient::default().with_route("p", route);
        let options = QueueOptions {
            max_concurrency: Some(3),
        };
        let orchestrator = Orchestrator::new(client, NullReporter, &options);

        let cases: Vec<_> = (0..12)
            .map(|i| TestCase::new([f64::from(i), 0.0], [0.0, 0.0]))
            .collect();
        let result = orchestrator
            .run_suite(Profiles::new("p", "p"), cases)
            .await
            .unwrap();

        assert_eq!(result.total_cases, 12);
        assert_eq!(result.passed, 12);
        // Each case issues two requests, so three cases mean at most six.
        assert!(orchestrator.client.peak.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn test_empty_suite_succeeds() {
        let orchestrator =
            Orchestrator::new(FakeClient::default(), NullReporter, &QueueOptions::default());
        let result = orchestrator
            .run_suite(Profiles::new("a", "b"), Vec::new())
            .await
            .unwrap();

        assert_eq!(result.total_cases, 0);
        assert!(result.success());
    }
}

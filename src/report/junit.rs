//! JUnit XML report generation.
//!
//! Writes one `<testcase>` per route comparison so CI systems can track
//! profile regressions like any other test suite.
//!
//! # Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites tests="3" failures="1" errors="1" time="2.031">
//!   <testsuite name="routecheck" tests="3" failures="1" errors="1" skipped="0" time="2.031" timestamp="2026-10-19T08:00:00Z">
//!     <testcase classname="routecheck" name="short hop" time="0.212"/>
//!     <testcase classname="routecheck" name="ferry" time="0.641">
//!       <failure message="geometry differs: ..." type="GeometryMismatch"/>
//!     </testcase>
//!     <testcase classname="routecheck" name="island" time="0.093">
//!       <error message="Routing service returned 400: ..." type="RoutingError"/>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```
//!
//! # Example
//!
//! ```
//! use routecheck::report::JUnitReporter;
//!
//! let reporter = JUnitReporter::new("test-results/junit.xml".into())
//!     .with_testsuite_name("trekking-profile");
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use super::Reporter;
use crate::orchestrator::{CaseOutcome, CaseResult, RunResult, TestCase};

/// Reporter that writes a JUnit XML report when the run completes.
///
/// Parent directories are created automatically if they don't exist.
pub struct JUnitReporter {
    output_path: PathBuf,
    testsuite_name: String,
}

impl JUnitReporter {
    /// Creates a new JUnit reporter that writes to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            testsuite_name: "routecheck".to_string(),
        }
    }

    /// Sets the test suite name in the XML output.
    ///
    /// The default name is `"routecheck"`.
    pub fn with_testsuite_name(mut self, name: impl Into<String>) -> Self {
        self.testsuite_name = name.into();
        self
    }

    /// Generate JUnit XML content from a run.
    fn generate_xml(&self, run_result: &RunResult) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let tests = run_result.total_cases.to_string();
        let failures = run_result.failed.to_string();
        let errors = run_result.errors.to_string();
        let time = format!("{:.3}", run_result.duration.as_secs_f64());

        let mut testsuites = BytesStart::new("testsuites");
        testsuites.push_attribute(("tests", tests.as_str()));
        testsuites.push_attribute(("failures", failures.as_str()));
        testsuites.push_attribute(("errors", errors.as_str()));
        testsuites.push_attribute(("time", time.as_str()));
        writer.write_event(Event::Start(testsuites))?;

        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut testsuite = BytesStart::new("testsuite");
        testsuite.push_attribute(("name", self.testsuite_name.as_str()));
        testsuite.push_attribute(("tests", tests.as_str()));
        testsuite.push_attribute(("failures", failures.as_str()));
        testsuite.push_attribute(("errors", errors.as_str()));
        testsuite.push_attribute(("skipped", "0"));
        testsuite.push_attribute(("time", time.as_str()));
        testsuite.push_attribute(("timestamp", timestamp.as_str()));
        writer.write_event(Event::Start(testsuite))?;

        for result in &run_result.results {
            self.write_testcase(&mut writer, result)?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
        writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

        let xml = String::from_utf8(writer.into_inner())?;
        Ok(xml)
    }

    /// Write a single test case element.
    fn write_testcase<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        result: &CaseResult,
    ) -> anyhow::Result<()> {
        let name = strip_invalid_chars(&result.case.id());
        let time = format!("{:.3}", result.duration.as_secs_f64());

        let mut testcase = BytesStart::new("testcase");
        testcase.push_attribute(("classname", self.testsuite_name.as_str()));
        testcase.push_attribute(("name", name.as_str()));
        testcase.push_attribute(("time", time.as_str()));

        let (element, kind) = match result.outcome() {
            CaseOutcome::Passed => {
                writer.write_event(Event::Empty(testcase))?;
                return Ok(());
            }
            CaseOutcome::Failed => ("failure", "GeometryMismatch"),
            CaseOutcome::Error => ("error", "RoutingError"),
        };

        writer.write_event(Event::Start(testcase))?;

        let mut detail = BytesStart::new(element);
        if let Some(msg) = result.message() {
            detail.push_attribute(("message", strip_invalid_chars(&msg).as_str()));
        }
        detail.push_attribute(("type", kind));
        writer.write_event(Event::Empty(detail))?;

        writer.write_event(Event::End(BytesEnd::new("testcase")))?;

        Ok(())
    }
}

#[async_trait]
impl Reporter for JUnitReporter {
    async fn on_suite_start(&self, _cases: &[TestCase]) {}

    async fn on_case_start(&self, _case: &TestCase) {}

    async fn on_case_complete(&self, _result: &CaseResult) {}

    async fn on_run_complete(&self, result: &RunResult) {
        match self.generate_xml(result) {
            Ok(xml) => {
                if let Some(parent) = self.output_path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                    && let Err(e) = std::fs::create_dir_all(parent)
                {
                    tracing::error!("Failed to create output directory: {}", e);
                    return;
                }

                if let Err(e) = std::fs::write(&self.output_path, xml) {
                    tracing::error!("Failed to write JUnit XML: {}", e);
                } else {
                    tracing::info!("JUnit XML written to: {}", self.output_path.display());
                }
            }
            Err(e) => {
                tracing::error!("Failed to generate JUnit XML: {}", e);
            }
        }
    }
}

/// Drops characters XML 1.0 cannot carry; quick-xml escapes the rest.
fn strip_invalid_chars(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::geometry::RouteGeoJson;
    use crate::orchestrator::RouteComparison;

    fn route(last: f64) -> RouteGeoJson {
        serde_json::from_value(serde_json::json!({
            "features": [{
                "properties": { "track-length": "10" },
                "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [last, 1.0]] }
            }]
        }))
        .unwrap()
    }

    fn case_result(
        name: &str,
        expected: Result<RouteGeoJson, String>,
        actual: Result<RouteGeoJson, String>,
    ) -> CaseResult {
        CaseResult {
            case: TestCase::new([0.0, 0.0], [1.0, 1.0]).with_name(name),
            comparison: RouteComparison { expected, actual },
            duration: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_generate_xml() {
        let run = RunResult::from_results(
            vec![
                case_result("same", Ok(route(1.0)), Ok(route(1.0))),
                case_result("moved <end>", Ok(route(1.0)), Ok(route(2.0))),
                case_result("island", Ok(route(1.0)), Err("no route & no luck".to_string())),
            ],
            Duration::from_millis(1500),
        );

        let xml = JUnitReporter::new(PathBuf::from("unused.xml"))
            .generate_xml(&run)
            .unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<testsuites tests="3" failures="1" errors="1" time="1.500">"#));
        assert!(xml.contains(r#"<testcase classname="routecheck" name="same" time="0.250"/>"#));
        assert!(xml.contains(r#"name="moved &lt;end&gt;""#));
        assert!(xml.contains(r#"type="GeometryMismatch""#));
        assert!(xml.contains(r#"<error message="no route &amp; no luck" type="RoutingError"/>"#));
    }

    #[tokio::test]
    async fn test_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("junit.xml");
        let reporter = JUnitReporter::new(path.clone()).with_testsuite_name("trekking");

        let run = RunResult::from_results(
            vec![case_result("same", Ok(route(1.0)), Ok(route(1.0)))],
            Duration::ZERO,
        );
        reporter.on_run_complete(&run).await;

        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.contains(r#"<testsuite name="trekking" tests="1""#));
    }

    #[test]
    fn test_strip_invalid_chars() {
        assert_eq!(strip_invalid_chars("a\u{0}b\tc"), "ab\tc");
    }
}

//! Configuration schema definitions for routecheck.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── suites              - JSON files holding more test cases
//! ├── RoutecheckConfig    - Routing service location and request timeout
//! ├── ProfilesConfig      - The expected and actual profiles
//! ├── QueueOptions        - Concurrency ceiling for route requests
//! ├── ReportConfig        - Output and reporting settings
//! └── cases               - Inline test cases
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{Profiles, TestCase};
use crate::queue::QueueOptions;

/// Root configuration structure for routecheck.
///
/// # TOML Structure
///
/// ```toml
/// suites = ["suites/berlin.json"]
///
/// [routecheck]
/// brouter_uri = "http://localhost:17777"
/// request_timeout_secs = 60
///
/// [queue]
/// max_concurrency = 4
///
/// [profiles]
/// expected = "trekking"
/// actual = { file = "profiles/trekking-new.brf" }
///
/// [report]
/// output_dir = "test-results"
/// junit = true
///
/// [[cases]]
/// name = "short hop"
/// start_point = [13.38, 52.51]
/// end_point = [13.40, 52.52]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Routing service settings.
    pub routecheck: RoutecheckConfig,

    /// Profiles under comparison.
    pub profiles: ProfilesConfig,

    /// Queue settings (optional, runs sequentially by default).
    #[serde(default)]
    pub queue: QueueOptions,

    /// Report configuration (optional, has defaults).
    #[serde(default)]
    pub report: ReportConfig,

    /// JSON suite files, relative to the config file's directory.
    ///
    /// Each file holds an array of test cases.
    #[serde(default)]
    pub suites: Vec<PathBuf>,

    /// Test cases defined inline.
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl Config {
    /// Collects inline cases followed by the cases of every suite file.
    ///
    /// Relative suite paths are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a suite file cannot be read or is not a JSON
    /// array of test cases.
    pub fn load_cases(&self, base_dir: &Path) -> Result<Vec<TestCase>> {
        let mut cases = self.cases.clone();

        for suite in &self.suites {
            let path = base_dir.join(suite);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
            let suite_cases: Vec<TestCase> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse suite file: {}", path.display()))?;

            tracing::debug!("Loaded {} cases from {}", suite_cases.len(), path.display());
            cases.extend(suite_cases);
        }

        Ok(cases)
    }
}

/// Routing service settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `request_timeout_secs` | 60 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutecheckConfig {
    /// Base URI of the routing service, e.g. `http://localhost:17777`.
    pub brouter_uri: String,

    /// Timeout for a single HTTP request in seconds.
    ///
    /// The run queue itself never times out work; this is the only bound
    /// on a hung route request.
    ///
    /// Default: 60
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}

/// The two profiles every test case is routed with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfilesConfig {
    /// Baseline profile.
    pub expected: ProfileSource,

    /// Profile under test.
    pub actual: ProfileSource,
}

impl ProfilesConfig {
    /// Resolves both sources to profile names or profile text.
    ///
    /// # Errors
    ///
    /// Returns an error if a profile file cannot be read.
    pub fn resolve(&self, base_dir: &Path) -> Result<Profiles> {
        Ok(Profiles {
            expected: self.expected.resolve(base_dir)?,
            actual: self.actual.resolve(base_dir)?,
        })
    }
}

/// Where a profile comes from.
///
/// A plain string is used as-is: a profile name known to the server, or
/// profile text (anything containing a space is uploaded before routing).
/// A `{ file = "..." }` table reads the profile text from disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProfileSource {
    /// A profile name or profile text.
    Inline(String),

    /// Profile text read from a file, relative to the config file.
    File {
        /// Path to the profile source.
        file: PathBuf,
    },
}

impl ProfileSource {
    /// Returns the profile name or profile text.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile file cannot be read.
    pub fn resolve(&self, base_dir: &Path) -> Result<String> {
        match self {
            ProfileSource::Inline(profile) => Ok(profile.clone()),
            ProfileSource::File { file } => {
                let path = base_dir.join(file);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read profile file: {}", path.display()))
            }
        }
    }
}

/// Configuration for test result reporting.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `output_dir` | `"test-results"` |
/// | `junit` | `false` |
/// | `junit_file` | `"junit.xml"` |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory where report files are written, relative to the config
    /// file's directory.
    ///
    /// Default: `"test-results"`
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// Whether to generate a JUnit XML report.
    ///
    /// Default: `false`
    #[serde(default)]
    pub junit: bool,

    /// Filename for the JUnit XML report, written to `{output_dir}/{junit_file}`.
    ///
    /// Default: `"junit.xml"`
    #[serde(default = "default_junit_file")]
    pub junit_file: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            junit: false,
            junit_file: default_junit_file(),
        }
    }
}

impl ReportConfig {
    /// Full path of the JUnit XML report.
    ///
    /// A relative `output_dir` is resolved against `base_dir`, like suite
    /// and profile files.
    pub fn junit_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.output_dir).join(&self.junit_file)
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("test-results")
}

fn default_junit_file() -> String {
    "junit.xml".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_str;

    const MINIMAL: &str = r#"
        [routecheck]
        brouter_uri = "http://localhost:17777"

        [profiles]
        expected = "trekking"
        actual = "trekking-dev"
    "#;

    #[test]
    fn test_defaults() {
        let config = load_config_str(MINIMAL).unwrap();
        assert_eq!(config.routecheck.request_timeout_secs, 60);
        assert_eq!(config.queue.ceiling(), 1);
        assert!(!config.report.junit);
        assert_eq!(
            config.report.junit_path(Path::new("ci")),
            PathBuf::from("ci/test-results/junit.xml")
        );
        assert!(config.cases.is_empty());
        assert!(config.suites.is_empty());
    }

    #[test]
    fn test_junit_path_follows_config_dir() {
        let report = ReportConfig {
            output_dir: PathBuf::from("results"),
            junit_file: "routes.xml".to_string(),
            ..Default::default()
        };
        assert_eq!(
            report.junit_path(Path::new("/etc/routecheck")),
            PathBuf::from("/etc/routecheck/results/routes.xml")
        );

        let absolute = ReportConfig {
            output_dir: PathBuf::from("/var/reports"),
            ..Default::default()
        };
        assert_eq!(
            absolute.junit_path(Path::new("/etc/routecheck")),
            PathBuf::from("/var/reports/junit.xml")
        );
    }

    #[test]
    fn test_unknown_queue_option_is_rejected() {
        let content = format!("{MINIMAL}\n[queue]\nmax_concurrency = 2\nretries = 3\n");
        assert!(load_config_str(&content).is_err());
    }

    #[test]
    fn test_profile_sources() {
        let config = load_config_str(
            r#"
            [routecheck]
            brouter_uri = "http://localhost:17777"

            [profiles]
            expected = "trekking"
            actual = { file = "profiles/new.brf" }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.profiles.expected,
            ProfileSource::Inline("trekking".to_string())
        );
        assert_eq!(
            config.profiles.actual,
            ProfileSource::File {
                file: PathBuf::from("profiles/new.brf")
            }
        );
    }

    #[test]
    fn test_resolve_profile_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("new.brf"), "assign downhillcost 60").unwrap();

        let profiles = ProfilesConfig {
            expected: ProfileSource::Inline("trekking".to_string()),
            actual: ProfileSource::File {
                file: PathBuf::from("new.brf"),
            },
        }
        .resolve(dir.path())
        .unwrap();

        assert_eq!(profiles.expected, "trekking");
        assert_eq!(profiles.actual, "assign downhillcost 60");
    }

    #[test]
    fn test_missing_profile_file() {
        let source = ProfileSource::File {
            file: PathBuf::from("nope.brf"),
        };
        let err = source.resolve(Path::new("/nonexistent")).unwrap_err();
        assert!(err.to_string().contains("Failed to read profile file"));
    }

    #[test]
    fn test_load_cases_inline_then_suites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("suite.json"),
            r#"[
                {"name": "from suite", "start_point": [8.0, 50.0], "end_point": [8.1, 50.1]},
                {"start_point": [9.0, 51.0], "end_point": [9.1, 51.1]}
            ]"#,
        )
        .unwrap();

        let content = format!(
            "suites = [\"suite.json\"]\n{MINIMAL}\n[[cases]]\nname = \"inline\"\nstart_point = [1.0, 2.0]\nend_point = [3.0, 4.0]\n"
        );
        let config = load_config_str(&content).unwrap();
        let cases = config.load_cases(dir.path()).unwrap();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].name.as_deref(), Some("inline"));
        assert_eq!(cases[1].name.as_deref(), Some("from suite"));
        assert_eq!(cases[2].name, None);
        assert_eq!(cases[2].start_point, [9.0, 51.0]);
    }

    #[test]
    fn test_load_cases_bad_suite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let content = format!("suites = [\"bad.json\"]\n{MINIMAL}");
        let config = load_config_str(&content).unwrap();
        let err = config.load_cases(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse suite file"));
    }
}

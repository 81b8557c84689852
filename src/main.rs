//! routecheck CLI - Regression testing for routing profiles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use routecheck::config::{self, ProfileSource};
use routecheck::orchestrator::{Orchestrator, is_profile_text};
use routecheck::report::{ConsoleReporter, JUnitReporter, MultiReporter};
use routecheck::routing::BrouterClient;

#[derive(Parser)]
#[command(name = "routecheck")]
#[command(about = "Regression tests for routing profiles", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "routecheck.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route every test case with both profiles and compare
    Run {
        /// Override the maximum number of concurrent cases
        #[arg(short, long)]
        parallel: Option<usize>,

        /// JUnit XML output path
        #[arg(long)]
        junit: Option<PathBuf>,
    },

    /// List the test cases without routing them
    Collect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Routing service URI
        #[arg(short, long, default_value = "http://localhost:17777")]
        uri: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { parallel, junit } => {
            run_cases(&cli.config, parallel, junit, cli.verbose).await
        }
        Commands::Collect { format } => collect_cases(&cli.config, &format),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init { uri } => init_config(&uri),
    }
}

/// Directory that relative paths in the config are resolved against.
fn base_dir(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

async fn run_cases(
    config_path: &Path,
    parallel_override: Option<usize>,
    junit_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let mut config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(parallel) = parallel_override {
        config.queue.max_concurrency = Some(parallel);
    }

    info!("Loaded configuration from {}", config_path.display());

    let base_dir = base_dir(config_path);
    let profiles = config.profiles.resolve(base_dir)?;
    let cases = config.load_cases(base_dir)?;

    let client = BrouterClient::new(
        &config.routecheck.brouter_uri,
        Duration::from_secs(config.routecheck.request_timeout_secs),
    )
    .context("Failed to create routing client")?;

    let reporter = create_reporter(&config, base_dir, junit_path, verbose);
    let orchestrator = Orchestrator::new(client, reporter, &config.queue);

    let result = orchestrator.run_suite(profiles, cases).await?;
    std::process::exit(result.exit_code());
}

fn collect_cases(config_path: &Path, format: &str) -> Result<()> {
    let config = config::load_config(config_path)?;
    let cases = config.load_cases(base_dir(config_path))?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&cases)?;
            println!("{}", json);
        }
        _ => {
            println!("Collected {} test cases:", cases.len());
            for case in &cases {
                println!(
                    "  {} ({},{} -> {},{})",
                    case.id(),
                    case.start_point[0],
                    case.start_point[1],
                    case.end_point[0],
                    case.end_point[1]
                );
            }
        }
    }

    Ok(())
}

fn describe_profile(source: &ProfileSource) -> String {
    match source {
        ProfileSource::Inline(profile) if is_profile_text(profile) => {
            format!("inline text ({} bytes)", profile.len())
        }
        ProfileSource::Inline(profile) => profile.clone(),
        ProfileSource::File { file } => format!("file {}", file.display()),
    }
}

fn validate_config(config_path: &Path) -> Result<()> {
    let checked = config::load_config(config_path).and_then(|config| {
        let base_dir = base_dir(config_path);
        config.profiles.resolve(base_dir)?;
        let cases = config.load_cases(base_dir)?;
        Ok((config, cases.len()))
    });

    match checked {
        Ok((config, case_count)) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Routing service: {}", config.routecheck.brouter_uri);
            println!(
                "  Request timeout: {}s",
                config.routecheck.request_timeout_secs
            );
            println!("  Max concurrency: {}", config.queue.ceiling());
            println!(
                "  Expected profile: {}",
                describe_profile(&config.profiles.expected)
            );
            println!(
                "  Actual profile: {}",
                describe_profile(&config.profiles.actual)
            );
            println!("  Test cases: {}", case_count);

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(uri: &str) -> Result<()> {
    let config = format!(
        r#"# routecheck configuration file

# JSON files with more test cases, relative to this file
suites = []

[routecheck]
brouter_uri = "{uri}"
request_timeout_secs = 60

[queue]
max_concurrency = 4

[profiles]
# A profile name known to the server, profile text, or {{ file = "..." }}
expected = "trekking"
actual = "trekking"

[report]
output_dir = "test-results"
junit = true
junit_file = "junit.xml"

[[cases]]
name = "example"
start_point = [13.3888, 52.5170]
end_point = [13.3976, 52.5291]
"#
    );

    let path = PathBuf::from("routecheck.toml");
    if path.exists() {
        eprintln!("routecheck.toml already exists. Remove it first or edit manually.");
        std::process::exit(1);
    }

    std::fs::write(&path, config)?;
    println!("Created routecheck.toml");
    println!();
    println!("Edit the profiles and cases, then run:");
    println!("  routecheck run");

    Ok(())
}

fn create_reporter(
    config: &config::Config,
    base_dir: &Path,
    junit_override: Option<PathBuf>,
    verbose: bool,
) -> MultiReporter {
    let mut multi = MultiReporter::new().with_reporter(ConsoleReporter::new(verbose));

    let junit_path = match junit_override {
        Some(path) => Some(path),
        None if config.report.junit => Some(config.report.junit_path(base_dir)),
        None => None,
    };

    if let Some(path) = junit_path {
        multi = multi.with_reporter(JUnitReporter::new(path));
    }

    multi
}

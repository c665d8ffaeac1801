use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about = "all-pairs shortest path regression harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the serial and parallel regression suites (default)
    Run {
        /// Only run tests whose name contains this filter
        #[arg(short, long)]
        filter: Option<String>,
        /// Print per-test execution details
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
        /// Directory holding the executables under test
        #[arg(long, default_value = ".")]
        bin_dir: PathBuf,
        /// Directory holding test_inputs/ and test_outputs/
        #[arg(long, default_value = "tests")]
        asset_dir: PathBuf,
    },
    /// Verify that every file the suites reference exists on disk
    CheckFixtures {
        /// Directory holding the executables under test
        #[arg(long, default_value = ".")]
        bin_dir: PathBuf,
        /// Directory holding test_inputs/ and test_outputs/
        #[arg(long, default_value = "tests")]
        asset_dir: PathBuf,
    },
}

static VERBOSE: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        filter: None,
        verbose: false,
        bin_dir: PathBuf::from("."),
        asset_dir: PathBuf::from("tests"),
    });

    match command {
        Commands::Run {
            filter,
            verbose,
            bin_dir,
            asset_dir,
        } => {
            VERBOSE.store(verbose, Ordering::Relaxed);
            let config = SuiteConfig::new(TargetPlatform::host(), bin_dir, asset_dir);
            run_suites(filter, &config)
        }
        Commands::CheckFixtures { bin_dir, asset_dir } => {
            let config = SuiteConfig::new(TargetPlatform::host(), bin_dir, asset_dir);
            check_fixtures(&config)
        }
    }
}

// --------------------- Shared harness --------------------------------------

/// Platform the executables under test were built for. Injected into suite
/// construction so the comparison core never sniffs the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TargetPlatform {
    Unix,
    Windows,
}

impl TargetPlatform {
    fn host() -> Self {
        if cfg!(windows) {
            TargetPlatform::Windows
        } else {
            TargetPlatform::Unix
        }
    }

    fn executable_name(self, stem: &str) -> String {
        match self {
            TargetPlatform::Windows => format!("{stem}.exe"),
            TargetPlatform::Unix => stem.to_string(),
        }
    }
}

struct SuiteConfig {
    platform: TargetPlatform,
    bin_dir: PathBuf,
    asset_dir: PathBuf,
}

impl SuiteConfig {
    fn new(platform: TargetPlatform, bin_dir: PathBuf, asset_dir: PathBuf) -> Self {
        Self {
            platform,
            bin_dir,
            asset_dir,
        }
    }

    fn executable(&self, stem: &str) -> PathBuf {
        self.bin_dir.join(self.platform.executable_name(stem))
    }

    fn input(&self, name: &str) -> PathBuf {
        self.asset_dir.join("test_inputs").join(name)
    }

    fn fixture(&self, name: &str) -> PathBuf {
        self.asset_dir.join("test_outputs").join(name)
    }
}

// --------------------- Test cases ------------------------------------------

/// One subprocess invocation plus the fixture it is checked against.
/// Immutable once built; the platform suffix is applied at construction.
struct TestCase {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    /// `None` marks a smoke check: the program is run and its output shown,
    /// but the case passes regardless of what it printed.
    expected_output: Option<PathBuf>,
    /// Segments at the end of captured stdout excluded from comparison;
    /// they carry timing text that differs run to run.
    trailing_lines: usize,
    show_full_output: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Pass,
    Fail,
    NotChecked,
}

impl Verdict {
    fn passed(self) -> bool {
        !matches!(self, Verdict::Fail)
    }
}

impl TestCase {
    fn smoke(name: &str, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            program,
            args,
            expected_output: None,
            trailing_lines: 0,
            show_full_output: true,
        }
    }

    fn integration(
        name: &str,
        program: PathBuf,
        args: Vec<String>,
        fixture: PathBuf,
        trailing_lines: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            program,
            args,
            expected_output: Some(fixture),
            trailing_lines,
            show_full_output: true,
        }
    }

    /// Show only the trailing timing lines instead of the full matrix.
    /// Display choice only, no effect on the verdict.
    fn summarized(mut self) -> Self {
        self.show_full_output = false;
        self
    }

    fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Every on-disk path this case depends on: the executable, any
    /// `--inputFile` argument, and the expected-output fixture.
    fn referenced_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.program.clone()];
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            if arg == "--inputFile" {
                if let Some(value) = args.next() {
                    paths.push(PathBuf::from(value));
                }
            }
        }
        if let Some(fixture) = &self.expected_output {
            paths.push(fixture.clone());
        }
        paths
    }

    fn execute_and_validate<W: WriteColor>(&self, reporter: &mut Reporter<W>) -> Result<Verdict> {
        let output = run_command(&self.program, &self.args)?;

        reporter.case_header(self);
        if self.show_full_output {
            reporter.case_output(&output.stdout);
        } else {
            reporter.case_output(&trailing_region(&output.stdout, self.trailing_lines));
        }

        let Some(fixture) = &self.expected_output else {
            return Ok(Verdict::NotChecked);
        };
        let actual = normalize(&comparable_region(&output.stdout, self.trailing_lines));
        let contents = fs::read_to_string(fixture)
            .with_context(|| format!("reading expected output {}", fixture.display()))?;
        if actual == normalize(&contents) {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Fail)
        }
    }
}

/// Drop every whitespace character so the comparison ignores formatting.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\r'))
        .collect()
}

/// Stdout with the last `trailing_lines` segments removed, concatenated for
/// normalization. A trailing newline yields a final empty segment, and the
/// suite's trailing counts include it.
fn comparable_region(stdout: &str, trailing_lines: usize) -> String {
    let segments: Vec<&str> = stdout.split('\n').collect();
    let keep = segments.len().saturating_sub(trailing_lines);
    segments[..keep].concat()
}

/// The last `trailing_lines` segments of stdout, for summarized display.
fn trailing_region(stdout: &str, trailing_lines: usize) -> String {
    let segments: Vec<&str> = stdout.split('\n').collect();
    let skip = segments.len().saturating_sub(trailing_lines);
    segments[skip..].join("\n")
}

// --------------------- Execution engine -------------------------------------

struct CapturedOutput {
    stdout: String,
    stderr: String,
    status: ExitStatus,
}

/// Spawn one child, block until it exits, return its decoded output. The exit
/// status is captured but never judged; a hanging child blocks the suite.
fn run_command(program: &Path, args: &[String]) -> Result<CapturedOutput> {
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("spawning {}", program.display()))?;
    let captured = CapturedOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status,
    };
    if VERBOSE.load(Ordering::Relaxed) {
        println!(
            "[CMD ] {} {:?} -> status {:?}, stdout {}B, stderr {}B",
            program.display(),
            args,
            captured.status.code(),
            captured.stdout.len(),
            captured.stderr.len()
        );
    }
    Ok(captured)
}

// --------------------- Suite runner -----------------------------------------

struct SuiteResult {
    total: usize,
    passed: usize,
    failed: Vec<usize>,
}

/// Run every case sequentially, never short-circuiting, so a single run always
/// yields a complete report. An infrastructure fault (missing binary, missing
/// fixture) is reported as ERROR and counted among the failed indices.
fn run_suite<W: WriteColor>(cases: &[TestCase], reporter: &mut Reporter<W>) -> SuiteResult {
    let mut passed = 0usize;
    let mut failed = Vec::new();
    for (index, case) in cases.iter().enumerate() {
        match case.execute_and_validate(reporter) {
            Ok(verdict) => {
                reporter.verdict(verdict);
                if verdict.passed() {
                    passed += 1;
                } else {
                    failed.push(index);
                }
            }
            Err(err) => {
                reporter.case_error(case, &err);
                failed.push(index);
            }
        }
    }
    SuiteResult {
        total: cases.len(),
        passed,
        failed,
    }
}

fn filter_cases(cases: Vec<TestCase>, filter: Option<&str>) -> Vec<TestCase> {
    match filter {
        Some(f) => cases.into_iter().filter(|c| c.name.contains(f)).collect(),
        None => cases,
    }
}

fn run_suites(filter: Option<String>, config: &SuiteConfig) -> Result<()> {
    let mut reporter = Reporter::stdout();
    let serial = filter_cases(serial_suite(config), filter.as_deref());
    let parallel = filter_cases(parallel_suite(config), filter.as_deref());

    let serial_result = run_suite(&serial, &mut reporter);
    let parallel_result = run_suite(&parallel, &mut reporter);

    reporter.blank_line();
    reporter.suite_summary("Serial", &serial_result);
    reporter.suite_summary("Parallel", &parallel_result);
    reporter.failed_listing("Serial", &serial_result);
    reporter.failed_listing("Parallel", &parallel_result);

    if !serial_result.failed.is_empty() || !parallel_result.failed.is_empty() {
        bail!("failures encountered");
    }
    Ok(())
}

// --------------------- Reporter ---------------------------------------------

/// Presentation only; verdict logic never lives here. Generic over the stream
/// so tests capture output in a buffer.
struct Reporter<W: WriteColor> {
    stream: W,
}

impl Reporter<StandardStream> {
    fn stdout() -> Self {
        Reporter::new(StandardStream::stdout(ColorChoice::Auto))
    }
}

impl<W: WriteColor> Reporter<W> {
    fn new(stream: W) -> Self {
        Reporter { stream }
    }

    fn blank_line(&mut self) {
        let _ = writeln!(self.stream);
    }

    fn case_header(&mut self, case: &TestCase) {
        let _ = writeln!(self.stream);
        let _ = writeln!(self.stream, "{}", case.name);
        let _ = writeln!(self.stream, "Command: {}", case.command_line());
    }

    fn case_output(&mut self, text: &str) {
        let _ = writeln!(self.stream, "{text}");
    }

    fn verdict(&mut self, verdict: Verdict) {
        let (color, label) = match verdict {
            Verdict::Fail => (Color::Red, "FAIL"),
            Verdict::Pass | Verdict::NotChecked => (Color::Green, "PASS"),
        };
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = writeln!(self.stream, "{label}");
        let _ = self.stream.reset();
    }

    fn case_error(&mut self, case: &TestCase, err: &anyhow::Error) {
        let _ = writeln!(self.stream);
        let _ = writeln!(self.stream, "{}", case.name);
        let _ = writeln!(self.stream, "Command: {}", case.command_line());
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
        let _ = writeln!(self.stream, "ERROR: {err:#}");
        let _ = self.stream.reset();
    }

    fn suite_summary(&mut self, label: &str, result: &SuiteResult) {
        let _ = writeln!(
            self.stream,
            "{label} results: {} / {}",
            result.passed, result.total
        );
    }

    fn failed_listing(&mut self, label: &str, result: &SuiteResult) {
        for index in &result.failed {
            let _ = self
                .stream
                .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
            let _ = writeln!(self.stream, "{label} {index}: FAIL");
            let _ = self.stream.reset();
        }
    }

    fn missing(&mut self, path: &Path) {
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(self.stream, "MISSING");
        let _ = self.stream.reset();
        let _ = writeln!(self.stream, " {}", path.display());
    }

    fn note(&mut self, text: &str) {
        let _ = writeln!(self.stream, "{text}");
    }
}

// --------------------- Suites -----------------------------------------------

const SERIAL_TRAILING_LINES: usize = 2;

fn input_args(config: &SuiteConfig, input: &str) -> Vec<String> {
    vec![
        "--inputFile".to_string(),
        config.input(input).display().to_string(),
    ]
}

fn threaded_args(config: &SuiteConfig, input: &str, threads: u32) -> Vec<String> {
    let mut args = input_args(config, input);
    args.push("--nThreads".to_string());
    args.push(threads.to_string());
    args
}

fn serial_suite(config: &SuiteConfig) -> Vec<TestCase> {
    let serial = |name: &str, input: &str| {
        TestCase::integration(
            name,
            config.executable("all_pairs_serial"),
            input_args(config, input),
            config.fixture(input),
            SERIAL_TRAILING_LINES,
        )
    };
    vec![
        TestCase::smoke(
            "Serial Test 0: serial_utils unit tests",
            config.executable("test_serial_utils"),
            Vec::new(),
        ),
        TestCase::smoke(
            "Serial Test 1: all_pairs_serial empty graph",
            config.executable("all_pairs_serial"),
            input_args(config, "empty_graph.txt"),
        ),
        serial("Serial Test 2: all_pairs_serial small graph", "small_graph.txt"),
        serial("Serial Test 3: all_pairs_serial medium graph", "medium_graph.txt"),
        serial("Serial Test 4: all_pairs_serial 100 graph", "100_graph.txt").summarized(),
        serial(
            "Serial Test 5: all_pairs_serial 1TH vertices, 50 edges graph",
            "1TH_vertices_50_edges_graph.txt",
        )
        .summarized(),
    ]
}

fn parallel_suite(config: &SuiteConfig) -> Vec<TestCase> {
    // (graph label, input file, nThreads, trailing timing segments, full output);
    // the trailing counts mirror the diagnostic format of the binary under test
    // and are opaque to the harness.
    let scenarios: [(&str, &str, u32, usize, bool); 13] = [
        ("small graph", "small_graph.txt", 1, 4, true),
        ("small graph", "small_graph.txt", 2, 5, true),
        ("small graph", "small_graph.txt", 4, 7, true),
        ("small graph", "small_graph.txt", 5, 8, true),
        ("medium graph", "medium_graph.txt", 1, 4, true),
        ("medium graph", "medium_graph.txt", 2, 5, true),
        ("medium graph", "medium_graph.txt", 9, 12, true),
        ("100 graph", "100_graph.txt", 1, 4, false),
        ("100 graph", "100_graph.txt", 2, 5, false),
        ("100 graph", "100_graph.txt", 5, 8, false),
        ("1TH vertices, 50 edges graph", "1TH_vertices_50_edges_graph.txt", 1, 4, false),
        ("1TH vertices, 50 edges graph", "1TH_vertices_50_edges_graph.txt", 2, 5, false),
        ("1TH vertices, 50 edges graph", "1TH_vertices_50_edges_graph.txt", 4, 7, false),
    ];

    scenarios
        .iter()
        .enumerate()
        .map(|(index, (label, input, threads, trailing, full))| {
            let name = format!(
                "Parallel Test {index}: all_pairs_parallel {label} with {threads} thread(s)"
            );
            let case = TestCase::integration(
                &name,
                config.executable("all_pairs_parallel"),
                threaded_args(config, input, *threads),
                config.fixture(input),
                *trailing,
            );
            if *full {
                case
            } else {
                case.summarized()
            }
        })
        .collect()
}

// --------------------- Fixture preflight ------------------------------------

/// Cross-check the suites against the asset tree before a run: report every
/// referenced file that is missing and every asset file nothing references.
fn check_fixtures(config: &SuiteConfig) -> Result<()> {
    let mut reporter = Reporter::stdout();
    let mut referenced = BTreeSet::new();
    for case in serial_suite(config).into_iter().chain(parallel_suite(config)) {
        referenced.extend(case.referenced_paths());
    }

    let missing: Vec<PathBuf> = referenced.iter().filter(|p| !p.exists()).cloned().collect();
    for path in &missing {
        reporter.missing(path);
    }
    for entry in WalkDir::new(&config.asset_dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_file() && !referenced.contains(entry.path()) {
            reporter.note(&format!("unreferenced: {}", entry.path().display()));
        }
    }

    if !missing.is_empty() {
        bail!("{} referenced file(s) missing", missing.len());
    }
    reporter.note("all referenced files present");
    Ok(())
}

// --------------------- Tests ------------------------------------------------

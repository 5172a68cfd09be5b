//! Command line surface

use crate::api::{HttpBackend, ScanBackend};
use crate::config::{ClientConfig, Overrides};
use crate::model::{ScanJob, TestResult, TestStatus};
use crate::presentation::{overall_token, status_token, StatusToken};
use crate::server;
use crate::session::ScanSession;
use crate::store::StoreSnapshot;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::future::Future;
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "scanwatch", version, about = "Submit website security scans and follow them to completion")]
pub struct Args {
    /// Base URL of the scan API (overrides SCANWATCH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Status poll interval in milliseconds (overrides SCANWATCH_POLL_INTERVAL_MS)
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Per-fetch timeout in milliseconds; follows the poll interval when omitted
    #[arg(long, global = true)]
    fetch_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a scan and follow it until it finishes
    Scan {
        /// Target URL (http:// or https://)
        url: String,

        /// Write the report here once the scan completes
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List the checks the backend runs
    Tests,
    /// Serve an in-memory stand-in for the scan API
    StubServer {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Milliseconds between scripted progress steps
        #[arg(long, default_value_t = 1000)]
        step_ms: u64,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            poll_interval_ms: self.poll_interval_ms,
            fetch_timeout_ms: self.fetch_timeout_ms,
        }
    }

    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        Ok(ClientConfig::load(&self.overrides())?)
    }
}

/// How a followed scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success,
    Failure,
    Interrupted,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::Failure => ExitCode::FAILURE,
            Exit::Interrupted => ExitCode::from(130),
        }
    }
}

pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    match &args.command {
        Command::StubServer { bind, step_ms } => {
            server::run(*bind, Duration::from_millis((*step_ms).max(1))).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Tests => {
            let config = args.client_config()?;
            let backend = Arc::new(HttpBackend::from_config(&config)?);
            list_tests(&ScanSession::new(backend, config.poll)).await
        }
        Command::Scan { url, report } => {
            let config = args.client_config()?;
            tracing::debug!(api_url = %config.api_url, "Using scan API");
            let backend = Arc::new(HttpBackend::from_config(&config)?);
            let session = ScanSession::new(backend, config.poll);
            let exit = follow_scan(session, url, report.as_deref(), ctrl_c()).await?;
            Ok(exit.into())
        }
    }
}

/// Resolves on the first Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn list_tests<B: ScanBackend>(session: &ScanSession<B>) -> anyhow::Result<ExitCode> {
    let tests = match session.list_tests().await {
        Ok(tests) => tests,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    for test in tests {
        println!("{:>3}  {}", test.id, test.name);
        if let Some(description) = test.description {
            println!("     {}", description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Submits `url` and renders progress until the scan finishes, fails or
/// `interrupt` resolves. Only a Completed scan counts as success.
async fn follow_scan<B: ScanBackend>(
    mut session: ScanSession<B>,
    url: &str,
    report: Option<&Path>,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Exit> {
    tokio::pin!(interrupt);
    let mut updates = session.subscribe();
    let mut render = Renderer::new();

    let submitted = tokio::select! {
        result = session.submit(url) => result,
        _ = &mut interrupt => return Ok(interrupted(session)),
    };
    let job = match submitted {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(Exit::Failure);
        }
    };
    println!("Scan {} started for {}", job.id, job.target_url());

    let last = loop {
        let snapshot = updates.borrow_and_update().clone();
        render.update(&snapshot);
        if snapshot.is_idle() {
            break snapshot;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break session.snapshot();
                }
            }
            _ = &mut interrupt => return Ok(interrupted(session)),
        }
    };

    if let Some(error) = &last.error {
        eprintln!("error: {}", error);
        session.shutdown();
        return Ok(Exit::Failure);
    }

    let Some(job) = last.job.as_deref() else {
        session.shutdown();
        return Ok(Exit::Failure);
    };
    print_summary(job);
    if job.overall_status != TestStatus::Completed {
        eprintln!("error: scan {} ended with status {}", job.id, job.overall_status);
        session.shutdown();
        return Ok(Exit::Failure);
    }

    let mut exit = Exit::Success;
    if let Some(path) = report {
        let written = tokio::select! {
            result = write_report(&session, path) => result,
            _ = &mut interrupt => return Ok(interrupted(session)),
        };
        if let Err(e) = written {
            eprintln!("error: {:#}", e);
            exit = Exit::Failure;
        }
    }

    session.shutdown();
    Ok(exit)
}

fn interrupted<B: ScanBackend>(mut session: ScanSession<B>) -> Exit {
    session.cancel();
    println!("Cancelled; the scan keeps running on the server.");
    session.shutdown();
    Exit::Interrupted
}

async fn write_report<B: ScanBackend>(session: &ScanSession<B>, path: &Path) -> anyhow::Result<()> {
    let bytes = session.download_report().await?;
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("writing report to {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}

/// Prints a line whenever the overall status or a check's status changes.
struct Renderer {
    color: bool,
    overall: Option<TestStatus>,
    checks: HashMap<i64, TestStatus>,
}

impl Renderer {
    fn new() -> Self {
        Self {
            color: std::io::stdout().is_terminal(),
            overall: None,
            checks: HashMap::new(),
        }
    }

    fn paint(&self, token: StatusToken) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", token.tone.ansi(), token.glyph)
        } else {
            token.glyph.to_string()
        }
    }

    fn update(&mut self, snapshot: &StoreSnapshot) {
        let Some(job) = snapshot.job.as_deref() else {
            return;
        };

        for outcome in &job.results {
            if self.checks.insert(outcome.id, outcome.status) == Some(outcome.status) {
                continue;
            }
            if outcome.status == TestStatus::Pending {
                continue;
            }
            let token = status_token(outcome.status, outcome.result);
            println!("  {} {:<45} {}", self.paint(token), outcome.name(), token.label);
        }

        if self.overall != Some(job.overall_status) {
            self.overall = Some(job.overall_status);
            let token = overall_token(job.overall_status);
            println!(
                "{} Scan {} {} ({}/{} checks done)",
                self.paint(token),
                job.id,
                token.label.to_lowercase(),
                job.count_completed(),
                job.results.len()
            );
        }
    }
}

fn print_summary(job: &ScanJob) {
    println!(
        "Scan {} {}: {} passed, {} vulnerable, {} info",
        job.id,
        job.overall_status,
        job.count_result(TestResult::Passed),
        job.count_result(TestResult::Vulnerable),
        job.count_result(TestResult::Info)
    );

    for outcome in job
        .results
        .iter()
        .filter(|o| o.verdict() == Some(TestResult::Vulnerable))
    {
        println!("  - {}", outcome.name());
        if let Some(summary) = &outcome.summary {
            println!("    {}", summary);
        }
        if let Some(recommendations) = &outcome.recommendations {
            println!("    {}", recommendations);
        }
    }
}

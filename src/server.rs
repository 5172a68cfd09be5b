//! Stub backend - Axum server speaking the scan API from memory
//!
//! No checks are executed. Each outcome follows a scripted timeline measured
//! from scan creation: outcome `i` starts at `(i + 1) * step` and completes at
//! `(i + 2) * step`, with results cycling through `RESULT_CYCLE`.

use crate::model::{ScanId, ScanJob, TestDefinition, TestOutcome, TestResult, TestStatus, Website};
use crate::submit::validate_target_url;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

const RESULT_CYCLE: [TestResult; 4] = [
    TestResult::Passed,
    TestResult::Passed,
    TestResult::Vulnerable,
    TestResult::Info,
];

const CATALOG: [(&str, &str); 10] = [
    ("Vulnerability Scanning", "General vulnerability checks (e.g., outdated software)."),
    ("Web Application Firewall (WAF) Testing", "Testing WAF detection and bypass."),
    ("Cross-Site Scripting (XSS) Testing", "Detecting XSS vulnerabilities."),
    ("SQL Injection Testing", "Detecting SQL Injection vulnerabilities."),
    ("Denial of Service (DoS) Testing", "Basic DoS resilience checks."),
    ("Directory Traversal", "Checking for directory traversal vulnerabilities."),
    ("API Security Testing", "Basic checks for common API vulnerabilities."),
    ("Session Management Testing", "Analyzing session handling security."),
    ("Cryptography and SSL/TLS Testing", "Checking SSL/TLS configuration and certificate validity."),
    ("Social Engineering Testing", "Placeholder for social engineering test info."),
];

/// Application state
pub struct AppState {
    scans: RwLock<HashMap<ScanId, StubScan>>,
    websites: RwLock<HashMap<String, Website>>,
    catalog: Vec<TestDefinition>,
    next_id: AtomicI64,
    step: Duration,
}

impl AppState {
    pub fn new(step: Duration) -> Self {
        let catalog = CATALOG
            .iter()
            .enumerate()
            .map(|(i, (name, description))| TestDefinition {
                id: i as i64 + 1,
                name: name.to_string(),
                description: Some(description.to_string()),
            })
            .collect();

        Self {
            scans: RwLock::new(HashMap::new()),
            websites: RwLock::new(HashMap::new()),
            catalog,
            next_id: AtomicI64::new(1),
            step,
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

struct StubScan {
    id: ScanId,
    website: Website,
    created_at: DateTime<Utc>,
    started: Instant,
    outcome_ids: Vec<i64>,
}

/// Run the stub server until the process is stopped
pub async fn run(addr: SocketAddr, step: Duration) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(step));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Stub scan API running at http://{} (step {}ms)",
        listener.local_addr()?,
        step.as_millis()
    );
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/tests", get(list_tests))
        .route("/scans", post(start_scan))
        .route("/scans/:id", get(get_scan))
        .route("/scans/:id/report", get(get_report))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ============================================
// HANDLERS
// ============================================

#[derive(Deserialize)]
struct ScanRequest {
    url: String,
}

#[derive(Serialize)]
struct Detail {
    detail: String,
}

#[derive(Serialize)]
struct ValidationIssue {
    loc: Vec<&'static str>,
    msg: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ValidationDetail {
    detail: Vec<ValidationIssue>,
}

#[derive(Serialize)]
struct ReportDocument {
    message: String,
    scan_details: ScanJob,
}

fn not_found(id: ScanId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Detail {
            detail: format!("Scan with ID {} not found", id),
        }),
    )
        .into_response()
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Scan stub API" }))
}

async fn list_tests(State(state): State<Arc<AppState>>) -> Json<Vec<TestDefinition>> {
    Json(state.catalog.clone())
}

async fn start_scan(State(state): State<Arc<AppState>>, Json(req): Json<ScanRequest>) -> Response {
    let url = match validate_target_url(&req.url) {
        Ok(url) if has_host(url) => url.to_string(),
        _ => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationDetail {
                    detail: vec![ValidationIssue {
                        loc: vec!["body", "url"],
                        msg: "Input should be a valid URL, relative URL without a base".into(),
                        kind: "url_parsing",
                    }],
                }),
            )
                .into_response()
        }
    };

    let now = Utc::now();
    let website = {
        let mut websites = state.websites.write().await;
        let website = websites.entry(url.clone()).or_insert_with(|| Website {
            id: state.next_id(),
            url: url.clone(),
            created_at: now,
            last_scan_at: None,
        });
        website.last_scan_at = Some(now);
        website.clone()
    };

    let scan = StubScan {
        id: state.next_id(),
        website,
        created_at: now,
        started: Instant::now(),
        outcome_ids: state.catalog.iter().map(|_| state.next_id()).collect(),
    };
    let job = render_scan(&scan, &state.catalog, state.step, Duration::ZERO);
    tracing::info!(scan_id = scan.id, "Accepted scan for {}", url);
    state.scans.write().await.insert(scan.id, scan);

    (StatusCode::ACCEPTED, Json(job)).into_response()
}

async fn get_scan(State(state): State<Arc<AppState>>, Path(id): Path<ScanId>) -> Response {
    let scans = state.scans.read().await;
    match scans.get(&id) {
        Some(scan) => {
            let job = render_scan(scan, &state.catalog, state.step, scan.started.elapsed());
            Json(job).into_response()
        }
        None => not_found(id),
    }
}

async fn get_report(State(state): State<Arc<AppState>>, Path(id): Path<ScanId>) -> Response {
    let scans = state.scans.read().await;
    let Some(scan) = scans.get(&id) else {
        return not_found(id);
    };

    let job = render_scan(scan, &state.catalog, state.step, scan.started.elapsed());
    if !matches!(job.overall_status, TestStatus::Completed | TestStatus::Error) {
        return (
            StatusCode::BAD_REQUEST,
            Json(Detail {
                detail: format!(
                    "Scan {} is not yet complete. Status: {}",
                    id, job.overall_status
                ),
            }),
        )
            .into_response();
    }

    Json(ReportDocument {
        message: format!("PDF report generation for scan {} is not yet implemented.", id),
        scan_details: job,
    })
    .into_response()
}

fn has_host(url: &str) -> bool {
    let rest = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    rest.split(['/', '?', '#'])
        .next()
        .is_some_and(|host| !host.is_empty())
}

/// Snapshot of `scan` after `elapsed` on its scripted timeline.
fn render_scan(
    scan: &StubScan,
    catalog: &[TestDefinition],
    step: Duration,
    elapsed: Duration,
) -> ScanJob {
    let step_ms = step.as_millis().max(1);
    let steps_done = elapsed.as_millis() / step_ms;
    let at = |n: usize| scan.created_at + chrono::Duration::milliseconds((n as u128 * step_ms) as i64);

    let results: Vec<TestOutcome> = catalog
        .iter()
        .zip(&scan.outcome_ids)
        .enumerate()
        .map(|(i, (definition, &outcome_id))| {
            let starts = i + 1;
            let finishes = i + 2;
            let (status, result) = if steps_done >= finishes as u128 {
                (TestStatus::Completed, RESULT_CYCLE[i % RESULT_CYCLE.len()])
            } else if steps_done >= starts as u128 {
                (TestStatus::InProgress, TestResult::NotRun)
            } else {
                (TestStatus::Pending, TestResult::NotRun)
            };
            let completed = status == TestStatus::Completed;

            TestOutcome {
                id: outcome_id,
                test_definition: definition.clone(),
                status,
                result,
                summary: completed.then(|| format!("{} completed (scripted).", definition.name)),
                details: None,
                recommendations: None,
                started_at: (status != TestStatus::Pending).then(|| at(starts)),
                completed_at: completed.then(|| at(finishes)),
            }
        })
        .collect();

    let overall = if !results.is_empty() && results.iter().all(|r| r.status == TestStatus::Completed) {
        TestStatus::Completed
    } else if results.iter().any(|r| r.status != TestStatus::Pending) {
        TestStatus::InProgress
    } else {
        TestStatus::Pending
    };

    ScanJob {
        id: scan.id,
        overall_status: overall,
        website: scan.website.clone(),
        created_at: scan.created_at,
        completed_at: (overall == TestStatus::Completed).then(|| at(results.len() + 1)),
        results,
    }
}

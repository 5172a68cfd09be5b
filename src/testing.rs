//! Fixtures and a scripted in-memory backend for tests

use crate::api::ScanBackend;
use crate::error::ScanError;
use crate::model::{ScanId, ScanJob, TestDefinition, TestOutcome, TestResult, TestStatus, Website};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

const NAMES: [&str; 4] = [
    "Vulnerability Scanning",
    "Cross-Site Scripting (XSS) Testing",
    "SQL Injection Testing",
    "Cryptography and SSL/TLS Testing",
];

pub fn definition(id: i64) -> TestDefinition {
    TestDefinition {
        id,
        name: NAMES[(id as usize - 1) % NAMES.len()].to_string(),
        description: None,
    }
}

/// A job whose outcomes carry `NotRun` unless completed.
pub fn job(id: ScanId, overall: TestStatus, outcomes: &[TestStatus]) -> ScanJob {
    let with_results: Vec<(TestStatus, TestResult)> = outcomes
        .iter()
        .map(|&status| {
            let result = if status == TestStatus::Completed {
                TestResult::Passed
            } else {
                TestResult::NotRun
            };
            (status, result)
        })
        .collect();
    job_with(id, overall, &with_results)
}

pub fn job_with(id: ScanId, overall: TestStatus, outcomes: &[(TestStatus, TestResult)]) -> ScanJob {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    ScanJob {
        id,
        overall_status: overall,
        website: Website {
            id: 1,
            url: "https://example.com/".to_string(),
            created_at: created,
            last_scan_at: None,
        },
        created_at: created,
        completed_at: None,
        results: outcomes
            .iter()
            .enumerate()
            .map(|(i, &(status, result))| TestOutcome {
                id: id * 100 + i as i64,
                test_definition: definition(i as i64 + 1),
                status,
                result,
                summary: None,
                details: None,
                recommendations: None,
                started_at: None,
                completed_at: None,
            })
            .collect(),
    }
}

struct Step {
    delay: Duration,
    reply: Result<ScanJob, ScanError>,
}

/// Backend answering from a per-job script. An exhausted script answers
/// with a network error so runaway polling shows up in assertions.
#[derive(Default)]
pub struct ScriptedBackend {
    create_replies: Mutex<VecDeque<Step>>,
    polls: Mutex<HashMap<ScanId, VecDeque<Step>>>,
    created: Mutex<Vec<String>>,
    polled: Mutex<Vec<ScanId>>,
    reports: Mutex<Vec<ScanId>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(self, reply: Result<ScanJob, ScanError>) -> Self {
        self.on_create_after(Duration::ZERO, reply)
    }

    pub fn on_create_after(self, delay: Duration, reply: Result<ScanJob, ScanError>) -> Self {
        self.create_replies
            .lock()
            .unwrap()
            .push_back(Step { delay, reply });
        self
    }

    pub fn on_poll(self, id: ScanId, reply: Result<ScanJob, ScanError>) -> Self {
        self.on_poll_after(id, Duration::ZERO, reply)
    }

    pub fn on_poll_after(
        self,
        id: ScanId,
        delay: Duration,
        reply: Result<ScanJob, ScanError>,
    ) -> Self {
        self.polls
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(Step { delay, reply });
        self
    }

    pub fn create_calls(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn created_urls(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn poll_calls(&self, id: ScanId) -> usize {
        self.polled.lock().unwrap().iter().filter(|&&p| p == id).count()
    }

    pub fn total_poll_calls(&self) -> usize {
        self.polled.lock().unwrap().len()
    }

    pub fn report_calls(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl ScanBackend for ScriptedBackend {
    async fn create_scan(&self, url: &str) -> Result<ScanJob, ScanError> {
        self.created.lock().unwrap().push(url.to_string());
        let step = self.create_replies.lock().unwrap().pop_front();
        let Some(step) = step else {
            return Err(ScanError::Network("no scripted create reply".into()));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.reply
    }

    async fn get_scan(&self, id: ScanId) -> Result<ScanJob, ScanError> {
        self.polled.lock().unwrap().push(id);
        let step = self
            .polls
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|steps| steps.pop_front());
        let Some(step) = step else {
            return Err(ScanError::Network(format!("no scripted poll reply for {}", id)));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.reply
    }

    async fn get_report(&self, id: ScanId) -> Result<Vec<u8>, ScanError> {
        self.reports.lock().unwrap().push(id);
        Ok(format!("report-{}", id).into_bytes())
    }

    async fn list_tests(&self) -> Result<Vec<TestDefinition>, ScanError> {
        Ok((1..=3).map(definition).collect())
    }
}

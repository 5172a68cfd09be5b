//! Status/result → display token lookup

use crate::model::{TestResult, TestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Muted,
    Active,
    Good,
    Bad,
    Warning,
    Notice,
}

impl Tone {
    /// ANSI SGR color code.
    pub fn ansi(&self) -> &'static str {
        match self {
            Tone::Muted => "90",
            Tone::Active => "34",
            Tone::Good => "32",
            Tone::Bad => "31",
            Tone::Warning => "33",
            Tone::Notice => "36",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusToken {
    pub glyph: &'static str,
    pub tone: Tone,
    pub label: &'static str,
}

const fn token(glyph: &'static str, tone: Tone, label: &'static str) -> StatusToken {
    StatusToken { glyph, tone, label }
}

const STATUS_TOKENS: [(TestStatus, StatusToken); 5] = [
    (TestStatus::Pending, token("○", Tone::Muted, "Pending")),
    (TestStatus::InProgress, token("◌", Tone::Active, "Running")),
    (TestStatus::Completed, token("●", Tone::Good, "Completed")),
    (TestStatus::Failed, token("✗", Tone::Bad, "Failed")),
    (TestStatus::Error, token("!", Tone::Warning, "Error")),
];

const RESULT_TOKENS: [(TestResult, StatusToken); 4] = [
    (TestResult::NotRun, token("–", Tone::Muted, "Not run")),
    (TestResult::Passed, token("✓", Tone::Good, "Passed")),
    (TestResult::Vulnerable, token("✗", Tone::Bad, "Vulnerable")),
    (TestResult::Info, token("i", Tone::Notice, "Info")),
];

/// Display token for one outcome. The result decides only once the check completed.
pub fn status_token(status: TestStatus, result: TestResult) -> StatusToken {
    let table: Option<StatusToken> = if status == TestStatus::Completed {
        RESULT_TOKENS
            .iter()
            .find(|(r, _)| *r == result)
            .map(|(_, t)| *t)
    } else {
        None
    };
    table.unwrap_or_else(|| overall_token(status))
}

/// Display token for a scan's aggregate status.
pub fn overall_token(status: TestStatus) -> StatusToken {
    STATUS_TOKENS
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, t)| *t)
        .unwrap_or(token("?", Tone::Muted, "Unknown"))
}

//! Terminal status detection

use crate::model::TestStatus;

/// Whether a job in `status` can no longer change.
#[inline]
pub fn is_terminal(status: TestStatus) -> bool {
    matches!(
        status,
        TestStatus::Completed | TestStatus::Failed | TestStatus::Error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_set() {
        assert!(is_terminal(TestStatus::Completed));
        assert!(is_terminal(TestStatus::Failed));
        assert!(is_terminal(TestStatus::Error));
    }

    #[test]
    fn test_active_statuses() {
        assert!(!is_terminal(TestStatus::Pending));
        assert!(!is_terminal(TestStatus::InProgress));
    }
}

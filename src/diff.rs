use crate::app::{AppState, CaseId, TestCase, TestStatus};

/// Compares a fresh case list with the previous snapshot, pushes a
/// notification for every status transition, and returns the ids of cases
/// whose run just finished.
pub fn detect_changes(state: &mut AppState, new_cases: &[TestCase]) -> Vec<CaseId> {
    let mut finished = Vec::new();

    for (idx, case) in new_cases.iter().enumerate() {
        let Some(&old_status) = state.previous_snapshot.get(&case.id) else {
            continue;
        };
        if old_status == case.status {
            continue;
        }
        let ordinal = idx + 1;
        let msg = match case.status {
            TestStatus::InProgress => format!("Case #{ordinal} started"),
            TestStatus::Success => format!("Case #{ordinal} passed"),
            TestStatus::Failed => format!("Case #{ordinal} failed"),
            TestStatus::Todo => format!("Case #{ordinal} reset"),
            TestStatus::Unknown => format!("Case #{ordinal} changed state"),
        };
        if old_status == TestStatus::InProgress && case.status.has_result() {
            finished.push(case.id);
        }
        state.push_notification(Some(case.id), msg);
    }

    // Cases are never removed by the client, so entries are only overwritten.
    for case in new_cases {
        state.previous_snapshot.insert(case.id, case.status);
    }

    finished
}

use crate::app::{TestCase, TestStatus};
use notify_rust::{Notification, Urgency};

pub fn send_desktop(case: &TestCase) {
    let (summary, icon, urgency) = match case.status {
        TestStatus::Success => ("Test Passed", "dialog-information", Urgency::Normal),
        TestStatus::Failed => ("Test Failed", "dialog-error", Urgency::Critical),
        _ => ("Test Finished", "dialog-information", Urgency::Normal),
    };

    if let Err(e) = Notification::new()
        .summary(summary)
        .body(&case.description)
        .icon(icon)
        .urgency(urgency)
        .show()
    {
        tracing::debug!("desktop notification failed: {e}");
    }
}

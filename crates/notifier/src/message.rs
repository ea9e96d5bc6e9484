//! Subject/body formatting for the one email a run sends.

use serde::Serialize;

use htb_common::error::truncate_body;
use htb_common::types::{AttemptRecord, ExamCode, PollOutcome};

/// Service prefix used in every subject line.
pub const SERVICE_NAME: &str = "HTB";

/// Body text used when the reviewer left no feedback.
pub const NO_FEEDBACK: &str = "No feedback provided.";

/// Human-readable notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Result mail for a terminal attempt.
    ///
    /// Unrecognized statuses also get the full record dumped, since nothing
    /// about them has been interpreted.
    pub fn result(exam: ExamCode, record: &AttemptRecord) -> Self {
        let subject = format!("{} {} result: {}", SERVICE_NAME, exam, record.status);

        let mut body = format!(
            "Exam: {}\nStatus: {}\n\nFeedback:\n{}\n",
            exam,
            record.status,
            record.feedback().unwrap_or(NO_FEEDBACK)
        );

        if !record.classify().is_recognized() {
            let raw = serde_json::to_string_pretty(record)
                .unwrap_or_else(|_| format!("{:?}", record));
            body.push_str("\nRaw attempt data:\n");
            body.push_str(&raw);
            body.push('\n');
        }

        Self { subject, body }
    }

    /// The poll budget ran out before a final status appeared.
    pub fn timeout(exam: ExamCode, polls: u32, last_status: Option<&str>) -> Self {
        let subject = format!("{} {} polling timeout", SERVICE_NAME, exam);
        let last = last_status.unwrap_or("none (no attempt data received)");
        let body = format!(
            "Exam: {}\n\
             Polling stopped after {} checks without a final result.\n\
             Last observed status: {}\n\n\
             The attempt is probably still being graded. Run the watcher again later.\n",
            exam, polls, last
        );
        Self { subject, body }
    }

    /// The attempts endpoint answered with an HTTP error and polling stopped.
    pub fn error(exam: ExamCode, status: u16, response_body: &str) -> Self {
        let subject = format!(
            "{} {} status check error (HTTP {})",
            SERVICE_NAME, exam, status
        );

        let mut body = format!(
            "Exam: {}\nThe attempts endpoint answered HTTP {}; polling was aborted.\n",
            exam, status
        );
        if status == 401 || status == 403 {
            body.push_str("Check HTB_EMAIL/HTB_PASSWORD or refresh HTB_COOKIE.\n");
        }
        body.push_str("\nResponse body:\n");
        body.push_str(&truncate_body(response_body));
        body.push('\n');

        Self { subject, body }
    }

    /// Pick the notification matching how the poll loop ended.
    pub fn for_outcome(exam: ExamCode, outcome: &PollOutcome) -> Self {
        match outcome {
            PollOutcome::Terminal(record) => Self::result(exam, record),
            PollOutcome::Timeout { polls, last_status } => {
                Self::timeout(exam, *polls, last_status.as_deref())
            }
            PollOutcome::Aborted { status, body } => Self::error(exam, *status, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> AttemptRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_result_with_feedback() {
        let n = Notification::result(
            ExamCode::Cbbh,
            &record(json!({"status": "Certified", "review": {"feedback": "Great job"}})),
        );
        assert_eq!(n.subject, "HTB CBBH result: Certified");
        assert_eq!(
            n.body,
            "Exam: CBBH\nStatus: Certified\n\nFeedback:\nGreat job\n"
        );
    }

    #[test]
    fn test_result_without_feedback_uses_placeholder() {
        let n = Notification::result(ExamCode::Cdsa, &record(json!({"status": "Failed"})));
        assert_eq!(n.subject, "HTB CDSA result: Failed");
        assert!(n.body.contains(NO_FEEDBACK));
        assert!(!n.body.contains("Raw attempt data"));
    }

    #[test]
    fn test_unrecognized_status_dumps_record() {
        let n = Notification::result(
            ExamCode::Cbbh,
            &record(json!({"status": "Voided", "id": 77, "review": null})),
        );
        assert_eq!(n.subject, "HTB CBBH result: Voided");
        assert!(n.body.contains("Raw attempt data:"));
        assert!(n.body.contains("\"id\": 77"));
    }

    #[test]
    fn test_timeout_message() {
        let n = Notification::timeout(ExamCode::Cbbh, 40, Some("In Review"));
        assert_eq!(n.subject, "HTB CBBH polling timeout");
        assert!(n.body.contains("after 40 checks"));
        assert!(n.body.contains("Last observed status: In Review"));
        assert!(!n.body.contains("Raw attempt data"));

        let n = Notification::timeout(ExamCode::Cbbh, 3, None);
        assert!(n.body.contains("no attempt data received"));
    }

    #[test]
    fn test_error_message() {
        let n = Notification::error(ExamCode::Cdsa, 401, "{\"message\":\"Unauthenticated.\"}");
        assert_eq!(n.subject, "HTB CDSA status check error (HTTP 401)");
        assert!(n.body.contains("HTB_COOKIE"));
        assert!(n.body.contains("Unauthenticated."));

        let n = Notification::error(ExamCode::Cdsa, 502, "bad gateway");
        assert!(!n.body.contains("HTB_COOKIE"));
    }

    #[test]
    fn test_for_outcome_dispatch() {
        let outcome = PollOutcome::Aborted {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(
            Notification::for_outcome(ExamCode::Cbbh, &outcome).subject,
            "HTB CBBH status check error (HTTP 500)"
        );

        let outcome = PollOutcome::Timeout {
            polls: 40,
            last_status: None,
        };
        assert_eq!(
            Notification::for_outcome(ExamCode::Cbbh, &outcome).subject,
            "HTB CBBH polling timeout"
        );
    }
}

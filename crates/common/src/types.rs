use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Status string the Academy reports while a human reviewer is grading.
pub const IN_REVIEW: &str = "In Review";

/// Certification exams whose attempts can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamCode {
    /// Certified Bug Bounty Hunter
    Cbbh,
    /// Certified Defensive Security Analyst
    Cdsa,
}

impl ExamCode {
    /// Exam watched when none (or an unknown one) is configured.
    pub const DEFAULT: ExamCode = ExamCode::Cbbh;

    /// Numeric exam id used in the Academy API paths.
    pub fn exam_id(self) -> u32 {
        match self {
            ExamCode::Cbbh => 2,
            ExamCode::Cdsa => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExamCode::Cbbh => "CBBH",
            ExamCode::Cdsa => "CDSA",
        }
    }
}

impl std::fmt::Display for ExamCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExamCode {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CBBH" => Ok(ExamCode::Cbbh),
            "CDSA" => Ok(ExamCode::Cdsa),
            other => Err(format!("unknown exam code '{}'", other)),
        }
    }
}

/// Classification of the open-ended `status` string of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    InReview,
    Failed,
    Certified,
    /// Anything else the service reports. Terminal, but unrecognized.
    Other(String),
}

impl AttemptStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            IN_REVIEW => AttemptStatus::InReview,
            "Failed" => AttemptStatus::Failed,
            "Certified" => AttemptStatus::Certified,
            other => AttemptStatus::Other(other.to_string()),
        }
    }

    /// Only `In Review` keeps the poll loop going.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InReview)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AttemptStatus::Other(_))
    }
}

/// Reviewer output attached to a graded attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The latest exam attempt as reported by the attempts endpoint.
///
/// Only `status` and `review.feedback` are interpreted; every other field is
/// kept verbatim so the record can be dumped into a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttemptRecord {
    pub fn classify(&self) -> AttemptStatus {
        AttemptStatus::from_raw(&self.status)
    }

    /// Reviewer feedback, if present and not blank.
    pub fn feedback(&self) -> Option<&str> {
        self.review
            .as_ref()
            .and_then(|r| r.feedback.as_deref())
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// Null becomes an empty status, other non-strings their JSON text.
fn lenient_status<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(status) => status,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Result of one logical "get current attempt" call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// First element of the response's `data` list.
    Attempt(AttemptRecord),
    /// The service answered successfully but lists no attempts.
    Empty,
    /// Every network try failed; nothing was received.
    NetworkExhausted,
    /// The service answered with a 4xx/5xx status.
    HttpError { status: u16, body: String },
}

/// Final state of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A status other than `In Review` was observed.
    Terminal(AttemptRecord),
    /// The poll budget ran out without a terminal status.
    Timeout {
        polls: u32,
        last_status: Option<String>,
    },
    /// An HTTP-level error stopped polling.
    Aborted { status: u16, body: String },
}

impl std::fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollOutcome::Terminal(record) => write!(f, "terminal ({})", record.status),
            PollOutcome::Timeout { polls, .. } => write!(f, "timeout after {} polls", polls),
            PollOutcome::Aborted { status, .. } => write!(f, "aborted (HTTP {})", status),
        }
    }
}

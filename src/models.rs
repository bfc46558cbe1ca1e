use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const UNKNOWN_POSITION: &str = "Unknown Position";

/// A single incoming email, exactly as handed to us by the mail client.
/// No identity beyond the supplied values; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmail {
    pub sender: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl RawEmail {
    /// True when there is nothing to parse at all. Callers treat this as a
    /// contract violation rather than a parse result.
    pub fn is_empty(&self) -> bool {
        self.sender.trim().is_empty()
            && self.subject.trim().is_empty()
            && self.html_body.trim().is_empty()
            && self.text_body.as_deref().is_none_or(|t| t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Ai,
    EnhancedHeuristic,
    QuickHeuristic,
}

/// Output of one extraction tier. `method` always names the tier that
/// actually produced the values — a failed AI call never reads `Ai`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEntities {
    pub company: String,
    pub position: String,
    pub job_url: Option<String>,
    pub applied_at: Option<String>,
    pub method: ExtractionMethod,
    pub confidence: u8,
    pub reasoning: String,
}

impl ParsedEntities {
    pub fn company_found(&self) -> bool {
        self.company != UNKNOWN_COMPANY
    }

    pub fn position_found(&self) -> bool {
        self.position != UNKNOWN_POSITION
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    InterviewScheduled,
    OfferReceived,
    Rejected,
    NotJobRelated,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::InterviewScheduled => "interview_scheduled",
            ApplicationStatus::OfferReceived => "offer_received",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::NotJobRelated => "not_job_related",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: ApplicationStatus,
    pub confidence: u8,
    pub is_job_related: bool,
    /// Every matched indicator phrase, in match order, not just the winning
    /// category's. Kept for explainability.
    pub indicators: Vec<String>,
    pub reasoning: String,
    pub urgency: Urgency,
}

/// Final combined record handed to the ingestion collaborator. Constructed
/// once per call; persistence and dedup are the collaborator's problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEmail {
    pub email: RawEmail,
    #[serde(flatten)]
    pub entities: ParsedEntities,
    pub status: StatusResult,
    pub industry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_email_detection() {
        let empty = RawEmail {
            sender: "  ".to_string(),
            subject: String::new(),
            html_body: String::new(),
            text_body: None,
            received_at: None,
        };
        assert!(empty.is_empty());

        let subject_only = RawEmail {
            sender: String::new(),
            subject: "Thank you for applying".to_string(),
            html_body: String::new(),
            text_body: None,
            received_at: None,
        };
        assert!(!subject_only.is_empty());

        let text_only = RawEmail {
            sender: String::new(),
            subject: String::new(),
            html_body: String::new(),
            text_body: Some("We received your application".to_string()),
            received_at: None,
        };
        assert!(!text_only.is_empty());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ApplicationStatus::InterviewScheduled).unwrap();
        assert_eq!(json, "\"interview_scheduled\"");
        let json = serde_json::to_string(&ExtractionMethod::EnhancedHeuristic).unwrap();
        assert_eq!(json, "\"enhanced_heuristic\"");
    }

    #[test]
    fn test_sentinel_helpers() {
        let entities = ParsedEntities {
            company: UNKNOWN_COMPANY.to_string(),
            position: "Software Engineer".to_string(),
            job_url: None,
            applied_at: None,
            method: ExtractionMethod::QuickHeuristic,
            confidence: 70,
            reasoning: String::new(),
        };
        assert!(!entities.company_found());
        assert!(entities.position_found());
    }
}

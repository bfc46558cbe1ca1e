use crate::heuristics::searchable_text;
use crate::models::{ApplicationStatus, RawEmail, StatusResult, Urgency};
use crate::rules::RuleSet;

/// Classify an email into a lifecycle status by scanning the priority-ordered
/// indicator groups. Highest-priority group with at least one phrase hit
/// wins; rejection sits first because rejection emails routinely quote
/// interview and offer vocabulary from earlier in the thread.
///
/// Pure text matching, no I/O, never fails.
pub fn detect_status(
    rules: &RuleSet,
    email: &RawEmail,
    company: &str,
    position: &str,
) -> StatusResult {
    let text = searchable_text(email).to_lowercase();

    let mut indicators = Vec::new();
    let mut winner: Option<(ApplicationStatus, usize)> = None;

    for group in &rules.indicators {
        let mut hits = 0;
        for phrase in &group.phrases {
            if text.contains(&phrase.to_lowercase()) {
                indicators.push(phrase.clone());
                hits += 1;
            }
        }
        // Groups are ordered by priority, so only the first group with hits
        // decides the status. Later groups still contribute to `indicators`.
        if hits > 0 && winner.is_none() {
            winner = Some((group.status, hits));
        }
    }

    match winner {
        Some((status, hits)) => {
            let confidence = if hits >= 2 { 90 } else { 75 };
            StatusResult {
                status,
                confidence,
                is_job_related: true,
                reasoning: describe(status, hits, company, position),
                indicators,
                urgency: urgency_for(status),
            }
        }
        None => StatusResult {
            status: ApplicationStatus::NotJobRelated,
            confidence: 30,
            is_job_related: false,
            indicators,
            reasoning: "No application lifecycle indicators found in subject or body"
                .to_string(),
            urgency: Urgency::Low,
        },
    }
}

/// Urgency is a pure function of status: stages that need a reply soon are
/// high, everything else is low.
pub fn urgency_for(status: ApplicationStatus) -> Urgency {
    match status {
        ApplicationStatus::InterviewScheduled | ApplicationStatus::OfferReceived => Urgency::High,
        ApplicationStatus::Applied
        | ApplicationStatus::Rejected
        | ApplicationStatus::NotJobRelated => Urgency::Low,
    }
}

fn describe(status: ApplicationStatus, hits: usize, company: &str, position: &str) -> String {
    let category = match status {
        ApplicationStatus::Rejected => "rejection",
        ApplicationStatus::OfferReceived => "offer",
        ApplicationStatus::InterviewScheduled => "interview scheduling",
        ApplicationStatus::Applied => "application confirmation",
        ApplicationStatus::NotJobRelated => "no",
    };
    format!(
        "Matched {} {} indicator{} for {} ({})",
        hits,
        category,
        if hits == 1 { "" } else { "s" },
        company,
        position,
    )
}

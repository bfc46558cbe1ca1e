use regex::Regex;
use scraper::Html;

use crate::error::TierFailure;
use crate::models::{
    ExtractionMethod, ParsedEntities, RawEmail, UNKNOWN_COMPANY, UNKNOWN_POSITION,
};
use crate::rules::RuleSet;

/// Subject + plain body, with the HTML body flattened to text when no plain
/// part exists. Everything downstream (entity rules, status indicators)
/// matches against this one string.
pub fn searchable_text(email: &RawEmail) -> String {
    format!("{} {}", email.subject, body_text(email))
}

/// The body alone: the plain part when present, else the HTML part
/// flattened to text.
pub fn body_text(email: &RawEmail) -> String {
    match email.text_body.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => html_to_text(&email.html_body),
    }
}

fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// The enhanced tier: ordered rule tables for company, position, date and
/// job URL. Fails only when the rule tables themselves are unusable; a
/// low-information result (both sentinels) is a legitimate answer, not a
/// failure.
pub fn extract_enhanced(
    rules: &RuleSet,
    email: &RawEmail,
) -> Result<ParsedEntities, TierFailure> {
    if !rules.is_usable() {
        return Err(TierFailure::RulesUnavailable(
            "indicator or entity tables are empty".to_string(),
        ));
    }

    let text = searchable_text(email);
    let company = resolve_company(rules, email, &text);
    let position = resolve_position(rules, &text);
    let job_url = resolve_job_url(email);
    let applied_at = resolve_applied_date(&text);

    let confidence = score_confidence(&company, &position, &job_url, 90);
    let reasoning = describe_match(&company, &position, "rule tables");

    Ok(ParsedEntities {
        company: company.unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
        position: position.unwrap_or_else(|| UNKNOWN_POSITION.to_string()),
        job_url,
        applied_at,
        method: ExtractionMethod::EnhancedHeuristic,
        confidence,
        reasoning,
    })
}

/// The quick tier: subject and sender only, compiled-in patterns, no rule
/// tables. Terminal tier of the cascade; defined to never fail.
pub fn extract_quick(email: &RawEmail) -> ParsedEntities {
    let company = company_from_subject(&email.subject)
        .or_else(|| company_from_domain(&email.sender, BUILTIN_GENERIC_DOMAINS));
    let position = position_from_pattern(&email.subject);

    let confidence = score_confidence(&company, &position, &None, 70);
    let reasoning = describe_match(&company, &position, "subject and sender");

    ParsedEntities {
        company: company.unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
        position: position.unwrap_or_else(|| UNKNOWN_POSITION.to_string()),
        job_url: None,
        applied_at: None,
        method: ExtractionMethod::QuickHeuristic,
        confidence,
        reasoning,
    }
}

// Domains the quick tier ignores even without a loaded ruleset.
const BUILTIN_GENERIC_DOMAINS: &[&str] = &[
    "gmail", "outlook", "yahoo", "noreply", "greenhouse", "lever", "workday",
    "indeed", "linkedin",
];

/// Confidence from signal strength: 50 base, +15 company, +15 position,
/// +10 URL, clamped to the tier's cap. An all-sentinel result scores 50.
fn score_confidence(
    company: &Option<String>,
    position: &Option<String>,
    job_url: &Option<String>,
    cap: u8,
) -> u8 {
    let mut score: u8 = 50;
    if company.is_some() {
        score += 15;
    }
    if position.is_some() {
        score += 15;
    }
    if job_url.is_some() {
        score += 10;
    }
    score.min(cap)
}

fn describe_match(company: &Option<String>, position: &Option<String>, source: &str) -> String {
    match (company, position) {
        (Some(c), Some(p)) => format!("Matched company '{}' and position '{}' from {}", c, p, source),
        (Some(c), None) => format!("Matched company '{}' from {}; no position found", c, source),
        (None, Some(p)) => format!("Matched position '{}' from {}; no company found", p, source),
        (None, None) => format!("No company or position matched in {}", source),
    }
}

// --- company resolution ---

fn resolve_company(rules: &RuleSet, email: &RawEmail, text: &str) -> Option<String> {
    company_from_subject(&email.subject)
        .or_else(|| company_from_known_list(rules, text))
        .or_else(|| company_from_display_name(&email.sender))
        .or_else(|| {
            let generic: Vec<&str> = rules.generic_domains.iter().map(|s| s.as_str()).collect();
            company_from_domain(&email.sender, &generic)
        })
}

/// "thank you for applying to/at/for <name>" in the subject line. The name
/// runs to the end of the subject or to a " for ..."/" - ..." tail naming
/// the role.
fn company_from_subject(subject: &str) -> Option<String> {
    let re = Regex::new(r"(?i)thank you for applying (?:to|at|for)\s+(.+)").ok()?;
    let captured = re.captures(subject)?.get(1)?.as_str();
    let mut name = captured;
    for sep in [" for ", " - ", " – "] {
        if let Some(idx) = name.find(sep) {
            name = &name[..idx];
        }
    }
    let name = name.trim().trim_end_matches(['!', '.', ',']).trim();
    if name.is_empty() || looks_like_role_phrase(name) {
        None
    } else {
        Some(name.to_string())
    }
}

/// "applying for the Software Engineer position" captures a title, not a
/// company; such captures are rejected so resolution falls through to the
/// later sender-based steps.
fn looks_like_role_phrase(name: &str) -> bool {
    let lower = name.to_lowercase();
    let first = name.split_whitespace().next().unwrap_or("");
    ["the", "a", "an", "our", "your", "this"].contains(&first)
        || lower.ends_with(" position")
        || lower.ends_with(" role")
        || lower.ends_with(" opening")
        || position_from_pattern(name).is_some_and(|p| p == name)
}

/// Membership test against the curated company list. A closed list by
/// design; first table entry found in the text wins.
fn company_from_known_list(rules: &RuleSet, text: &str) -> Option<String> {
    let haystack = text.to_lowercase();
    rules
        .known_companies
        .iter()
        .find(|name| haystack.contains(&name.to_lowercase()))
        .cloned()
}

/// Display names like "Acme Recruiting Team <no-reply@acme.com>": keep the
/// name once the hiring-context words are stripped out.
fn company_from_display_name(sender: &str) -> Option<String> {
    let display = sender.split('<').next()?.trim().trim_matches('"').trim();
    if display.is_empty() || display.contains('@') {
        return None;
    }

    const CONTEXT_WORDS: &[&str] = &[
        "recruiting", "recruitment", "talent", "hiring", "careers", "hr",
        "people", "team", "acquisition", "staffing",
    ];
    let has_context = display
        .split_whitespace()
        .any(|w| CONTEXT_WORDS.contains(&w.to_lowercase().as_str()));
    if !has_context {
        return None;
    }

    let name: Vec<&str> = display
        .split_whitespace()
        .filter(|w| !CONTEXT_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name.join(" "))
    }
}

/// Second-level domain of the sender address, skipped when it is a mail
/// provider or ATS platform. "jobs@acme.com" resolves to "Acme".
fn company_from_domain(sender: &str, generic: &[&str]) -> Option<String> {
    let domain = sender.rsplit('@').next()?.trim().trim_end_matches('>');
    let mut labels: Vec<&str> = domain.split('.').collect();
    // Drop the TLD; the label before it names the organization.
    labels.pop()?;
    let token = labels.pop()?.to_lowercase();

    if token.is_empty() || generic.iter().any(|g| *g == token) {
        return None;
    }

    let mut chars = token.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

// --- position resolution ---

fn resolve_position(rules: &RuleSet, text: &str) -> Option<String> {
    let haystack = text.to_lowercase();
    // Literal known titles first, most specific entries earlier in the table.
    if let Some(title) = rules
        .known_positions
        .iter()
        .find(|title| haystack.contains(&title.to_lowercase()))
    {
        return Some(title.clone());
    }
    position_from_pattern(text)
}

/// Generic "<Words> engineer / analyst / ..." suffix fallback. The leading
/// words must be capitalized so filler like "the" or "your" stays out of
/// the title.
fn position_from_pattern(text: &str) -> Option<String> {
    let re = Regex::new(
        r"\b((?:[A-Z][A-Za-z/+.-]*\s+){1,4}(?i:engineer|developer|analyst|manager|designer|scientist|architect|administrator|specialist|coordinator|consultant|intern))\b",
    )
    .ok()?;
    let matched = re.captures(text)?.get(1)?.as_str().trim();
    if matched.len() < 5 {
        return None;
    }
    Some(matched.to_string())
}

// --- job URL resolution ---

const URL_JOB_KEYWORDS: &[&str] = &["job", "career", "apply", "position", "opportunity"];

/// All URLs from both bodies, preferring the first one that looks like a
/// posting link; otherwise the first URL at all.
fn resolve_job_url(email: &RawEmail) -> Option<String> {
    let re = Regex::new(r#"https?://[^\s<>"')\]]+"#).ok()?;
    let mut first: Option<String> = None;

    let bodies = [
        email.html_body.as_str(),
        email.text_body.as_deref().unwrap_or(""),
    ];
    for body in bodies {
        for m in re.find_iter(body) {
            let url = m.as_str().trim_end_matches(['.', ',']).to_string();
            let lower = url.to_lowercase();
            if URL_JOB_KEYWORDS.iter().any(|k| lower.contains(k)) {
                return Some(url);
            }
            if first.is_none() {
                first = Some(url);
            }
        }
    }
    first
}

// --- application date ---

/// Raw date text from phrases like "applied on January 5, 2026" or
/// "application submitted 01/05/2026". Not normalized; the ingestion
/// collaborator owns date semantics.
fn resolve_applied_date(text: &str) -> Option<String> {
    let re = Regex::new(
        r"(?i)(?:applied|application (?:was )?submitted|submitted your application)(?: on)?\s+((?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},?\s+\d{4}|\d{1,2}/\d{1,2}/\d{2,4})",
    )
    .ok()?;
    Some(re.captures(text)?.get(1)?.as_str().to_string())
}

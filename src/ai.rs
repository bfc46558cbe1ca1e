use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::error::TierFailure;
use crate::models::{
    ApplicationStatus, ExtractionMethod, ParsedEntities, RawEmail, UNKNOWN_COMPANY,
    UNKNOWN_POSITION,
};
use crate::rules::RuleSet;

/// Fixed ceiling on the provider round trip. A timeout is handled exactly
/// like any other provider failure: fall through to the next tier.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// --- Provider trait ---

pub trait Provider: Send + Sync {
    /// One completion round trip.
    fn complete(&self, prompt: &str) -> Result<String, TierFailure>;
    /// Lightweight capability probe (list-models style) proving the
    /// credential works before a paid extraction call is spent on it.
    fn validate(&self) -> Result<(), TierFailure>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

pub fn create_provider(
    kind: ProviderKind,
    api_key: Option<String>,
    model_id: String,
) -> Result<Box<dyn Provider>, TierFailure> {
    let api_key = match api_key {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => return Err(TierFailure::CredentialMissing),
    };
    match kind {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(api_key, model_id)?)),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(api_key, model_id)?)),
    }
}

/// Cached result of the credential probe. Read concurrently by every parse;
/// overwritten wholesale, never incrementally mutated.
#[derive(Debug, Default)]
pub struct CredentialCache {
    valid: RwLock<Option<bool>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the probe at most once per configuration; later calls answer from
    /// the cache. Only definitive verdicts are cached: a rejected credential
    /// stays rejected, but an unreachable provider leaves the cache empty so
    /// the next parse re-probes once the outage clears.
    pub fn ensure_valid(&self, provider: &dyn Provider) -> Result<(), TierFailure> {
        match *self
            .valid
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(TierFailure::CredentialInvalid(
                    "credential previously failed validation".to_string(),
                ));
            }
            None => {}
        }

        let outcome = provider.validate();
        let verdict = match &outcome {
            Ok(()) => Some(true),
            Err(TierFailure::CredentialInvalid(_)) => Some(false),
            // Transient: the probe never answered, so there is no verdict.
            Err(_) => None,
        };
        if let Some(verdict) = verdict {
            let mut guard = self
                .valid
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Some(verdict);
        }
        outcome
    }

    /// Forget the cached verdict, e.g. after the credential is reconfigured.
    pub fn reset(&self) {
        let mut guard = self
            .valid
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}

// --- extraction ---

/// The model must answer with exactly this object, nothing else.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelExtraction {
    company: String,
    position: String,
    status: ApplicationStatus,
    job_url: Option<String>,
    confidence: i64,
}

/// The AI tier. Probes the credential, sends one structured extraction
/// request, and strictly parses the reply. Every failure mode maps to a
/// `TierFailure` so the cascade can fall back.
pub fn try_ai(
    provider: &dyn Provider,
    cache: &CredentialCache,
    rules: &RuleSet,
    email: &RawEmail,
) -> Result<ParsedEntities, TierFailure> {
    cache.ensure_valid(provider)?;

    let prompt = build_prompt(rules, email);
    let raw = provider.complete(&prompt)?;
    debug!(model = provider.model_name(), bytes = raw.len(), "model reply received");
    let extraction = parse_model_reply(&raw)?;

    let company = non_empty_or(extraction.company, UNKNOWN_COMPANY);
    let position = non_empty_or(extraction.position, UNKNOWN_POSITION);
    let confidence = extraction.confidence.clamp(0, 100) as u8;

    Ok(ParsedEntities {
        reasoning: format!(
            "Model {} extracted company '{}', position '{}', classified as {}",
            provider.model_name(),
            company,
            position,
            extraction.status.as_str(),
        ),
        company,
        position,
        job_url: extraction.job_url.filter(|u| !u.trim().is_empty()),
        applied_at: None,
        method: ExtractionMethod::Ai,
        confidence,
    })
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// The extraction instruction. The status priority table is rendered from
/// the same `RuleSet` the heuristic detector matches against, so the two
/// tiers cannot drift apart.
pub fn build_prompt(rules: &RuleSet, email: &RawEmail) -> String {
    let mut priority_table = String::new();
    for (i, group) in rules.indicators.iter().enumerate() {
        priority_table.push_str(&format!(
            "{}. {} — indicator phrases: {}\n",
            i + 1,
            group.status.as_str(),
            group
                .phrases
                .iter()
                .map(|p| format!("\"{}\"", p))
                .collect::<Vec<_>>()
                .join(", "),
        ));
    }

    format!(
        "You extract job application data from emails.\n\
         Reply with a single JSON object containing exactly these five fields and no others:\n\
         - \"company\": employer name, or \"{unknown_company}\"\n\
         - \"position\": job title, or \"{unknown_position}\"\n\
         - \"status\": one of \"applied\", \"interview_scheduled\", \"offer_received\", \"rejected\", \"not_job_related\"\n\
         - \"job_url\": job posting URL or null\n\
         - \"confidence\": integer 0-100\n\n\
         Classification priority, highest first. When phrases from several \
         categories appear, the highest-priority category wins:\n\
         {priority_table}\n\
         If none of the above match, status is \"not_job_related\".\n\n\
         Subject: {subject}\n\
         Sender: {sender}\n\
         Body:\n{body}",
        unknown_company = UNKNOWN_COMPANY,
        unknown_position = UNKNOWN_POSITION,
        priority_table = priority_table,
        subject = email.subject,
        sender = email.sender,
        body = crate::heuristics::body_text(email),
    )
}

/// Strict parse of the model reply: a lone JSON object with the five
/// expected fields. A markdown code fence around the object is tolerated;
/// any other deviation is a hard failure.
fn parse_model_reply(raw: &str) -> Result<ModelExtraction, TierFailure> {
    let mut text = raw.trim();
    if let Some(stripped) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    {
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }
    serde_json::from_str(text)
        .map_err(|e| TierFailure::ProviderResponseMalformed(e.to_string()))
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_MODELS_URL: &str = "https://api.anthropic.com/v1/models";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model_id: String) -> Result<Self, TierFailure> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            api_key,
            model_id,
            client,
        })
    }
}

impl Provider for AnthropicProvider {
    fn complete(&self, prompt: &str) -> Result<String, TierFailure> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: 1024,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;

        let response = check_status(response)?;
        let api_response: AnthropicResponse = response
            .json()
            .map_err(|e| TierFailure::ProviderResponseMalformed(e.to_string()))?;

        api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| {
                TierFailure::ProviderResponseMalformed("no content blocks in reply".to_string())
            })
    }

    fn validate(&self) -> Result<(), TierFailure> {
        let response = self
            .client
            .get(ANTHROPIC_MODELS_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;
        check_status(response).map(|_| ())
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAiMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

pub struct OpenAiProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model_id: String) -> Result<Self, TierFailure> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            api_key,
            model_id,
            client,
        })
    }
}

impl Provider for OpenAiProvider {
    fn complete(&self, prompt: &str) -> Result<String, TierFailure> {
        let request = OpenAiRequest {
            model: self.model_id.clone(),
            max_tokens: 1024,
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;

        let response = check_status(response)?;
        let api_response: OpenAiResponse = response
            .json()
            .map_err(|e| TierFailure::ProviderResponseMalformed(e.to_string()))?;

        api_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                TierFailure::ProviderResponseMalformed("no choices in reply".to_string())
            })
    }

    fn validate(&self) -> Result<(), TierFailure> {
        let response = self
            .client
            .get(OPENAI_MODELS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .map_err(|e| TierFailure::ProviderUnavailable(e.to_string()))?;
        check_status(response).map(|_| ())
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// 401/403 means the credential is bad; any other non-2xx means the
/// provider is unavailable for this call.
fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, TierFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(TierFailure::CredentialInvalid(format!("{}: {}", status, body)))
    } else {
        Err(TierFailure::ProviderUnavailable(format!("{}: {}", status, body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        reply: String,
        validations: AtomicUsize,
        valid: bool,
    }

    impl StubProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                validations: AtomicUsize::new(0),
                valid: true,
            }
        }

        fn invalid_credential() -> Self {
            Self {
                reply: String::new(),
                validations: AtomicUsize::new(0),
                valid: false,
            }
        }
    }

    impl Provider for StubProvider {
        fn complete(&self, _prompt: &str) -> Result<String, TierFailure> {
            Ok(self.reply.clone())
        }

        fn validate(&self) -> Result<(), TierFailure> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            if self.valid {
                Ok(())
            } else {
                Err(TierFailure::CredentialInvalid("401".to_string()))
            }
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    fn email() -> RawEmail {
        RawEmail {
            sender: "jobs@acme.com".to_string(),
            subject: "Thank you for applying to Acme".to_string(),
            html_body: String::new(),
            text_body: Some("We received your Software Engineer application.".to_string()),
            received_at: None,
        }
    }

    #[test]
    fn test_parse_model_reply_valid() {
        let reply = r#"{"company": "Acme", "position": "Software Engineer", "status": "applied", "job_url": null, "confidence": 85}"#;
        let parsed = parse_model_reply(reply).unwrap();
        assert_eq!(parsed.company, "Acme");
        assert_eq!(parsed.status, ApplicationStatus::Applied);
        assert_eq!(parsed.confidence, 85);
    }

    #[test]
    fn test_parse_model_reply_tolerates_code_fence() {
        let reply = "```json\n{\"company\": \"Acme\", \"position\": \"SWE\", \"status\": \"rejected\", \"job_url\": null, \"confidence\": 90}\n```";
        let parsed = parse_model_reply(reply).unwrap();
        assert_eq!(parsed.status, ApplicationStatus::Rejected);
    }

    #[test]
    fn test_parse_model_reply_rejects_non_json() {
        assert!(matches!(
            parse_model_reply("Sure! The company is Acme."),
            Err(TierFailure::ProviderResponseMalformed(_))
        ));
    }

    #[test]
    fn test_parse_model_reply_rejects_extra_fields() {
        let reply = r#"{"company": "Acme", "position": "SWE", "status": "applied", "job_url": null, "confidence": 85, "extra": 1}"#;
        assert!(parse_model_reply(reply).is_err());
    }

    #[test]
    fn test_parse_model_reply_rejects_missing_fields() {
        let reply = r#"{"company": "Acme", "position": "SWE"}"#;
        assert!(parse_model_reply(reply).is_err());
    }

    #[test]
    fn test_parse_model_reply_rejects_unknown_status() {
        let reply = r#"{"company": "Acme", "position": "SWE", "status": "ghosted", "job_url": null, "confidence": 85}"#;
        assert!(parse_model_reply(reply).is_err());
    }

    #[test]
    fn test_try_ai_success() {
        let provider = StubProvider::replying(
            r#"{"company": "Acme", "position": "Software Engineer", "status": "applied", "job_url": "https://acme.com/jobs/1", "confidence": 130}"#,
        );
        let cache = CredentialCache::new();
        let result = try_ai(&provider, &cache, &RuleSet::builtin(), &email()).unwrap();
        assert_eq!(result.method, ExtractionMethod::Ai);
        assert_eq!(result.company, "Acme");
        // Self-reported confidence is clamped, not trusted blindly.
        assert_eq!(result.confidence, 100);
        assert_eq!(result.job_url.as_deref(), Some("https://acme.com/jobs/1"));
    }

    #[test]
    fn test_try_ai_empty_fields_become_sentinels() {
        let provider = StubProvider::replying(
            r#"{"company": "", "position": "  ", "status": "not_job_related", "job_url": "", "confidence": 20}"#,
        );
        let cache = CredentialCache::new();
        let result = try_ai(&provider, &cache, &RuleSet::builtin(), &email()).unwrap();
        assert_eq!(result.company, UNKNOWN_COMPANY);
        assert_eq!(result.position, UNKNOWN_POSITION);
        assert_eq!(result.job_url, None);
    }

    #[test]
    fn test_try_ai_invalid_credential_short_circuits() {
        let provider = StubProvider::invalid_credential();
        let cache = CredentialCache::new();
        assert!(matches!(
            try_ai(&provider, &cache, &RuleSet::builtin(), &email()),
            Err(TierFailure::CredentialInvalid(_))
        ));
        // The verdict is cached; the probe is not repeated.
        let _ = try_ai(&provider, &cache, &RuleSet::builtin(), &email());
        assert_eq!(provider.validations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_outage_does_not_poison_credential_cache() {
        // First probe times out, later probes succeed. The outage must not
        // be remembered as an invalid credential.
        struct FlakyProvider {
            validations: AtomicUsize,
        }

        impl Provider for FlakyProvider {
            fn complete(&self, _prompt: &str) -> Result<String, TierFailure> {
                Ok(r#"{"company": "Acme", "position": "SWE", "status": "applied", "job_url": null, "confidence": 80}"#
                    .to_string())
            }

            fn validate(&self) -> Result<(), TierFailure> {
                if self.validations.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TierFailure::ProviderUnavailable(
                        "connection timed out".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }

            fn model_name(&self) -> &str {
                "flaky-model"
            }
        }

        let provider = FlakyProvider {
            validations: AtomicUsize::new(0),
        };
        let cache = CredentialCache::new();
        let rules = RuleSet::builtin();

        // The outage surfaces as unavailable, not as a bad credential.
        assert!(matches!(
            try_ai(&provider, &cache, &rules, &email()),
            Err(TierFailure::ProviderUnavailable(_))
        ));

        // Next parse re-probes and the tier works again.
        let result = try_ai(&provider, &cache, &rules, &email()).unwrap();
        assert_eq!(result.method, ExtractionMethod::Ai);
        assert_eq!(provider.validations.load(Ordering::SeqCst), 2);

        // The successful verdict is now cached.
        try_ai(&provider, &cache, &rules, &email()).unwrap();
        assert_eq!(provider.validations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_credential_cache_probes_once_when_valid() {
        let provider = StubProvider::replying(
            r#"{"company": "Acme", "position": "SWE", "status": "applied", "job_url": null, "confidence": 80}"#,
        );
        let cache = CredentialCache::new();
        let rules = RuleSet::builtin();
        try_ai(&provider, &cache, &rules, &email()).unwrap();
        try_ai(&provider, &cache, &rules, &email()).unwrap();
        assert_eq!(provider.validations.load(Ordering::SeqCst), 1);

        cache.reset();
        try_ai(&provider, &cache, &rules, &email()).unwrap();
        assert_eq!(provider.validations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prompt_contains_priority_table_and_email() {
        let rules = RuleSet::builtin();
        let prompt = build_prompt(&rules, &email());
        assert!(prompt.contains("rejected"));
        assert!(prompt.contains("decided to pursue another candidate"));
        assert!(prompt.contains("Thank you for applying to Acme"));
        // Rejection is listed before offer: same priority order as the
        // heuristic detector.
        let rej = prompt.find("1. rejected").unwrap();
        let offer = prompt.find("2. offer_received").unwrap();
        assert!(rej < offer);
    }

    #[test]
    fn test_prompt_includes_subject_once() {
        let mail = email();
        let prompt = build_prompt(&RuleSet::builtin(), &mail);
        assert_eq!(prompt.matches(mail.subject.as_str()).count(), 1);
    }

    #[test]
    fn test_create_provider_requires_credential() {
        assert!(matches!(
            create_provider(ProviderKind::OpenAi, None, "gpt-4o".to_string()),
            Err(TierFailure::CredentialMissing)
        ));
        assert!(matches!(
            create_provider(ProviderKind::Anthropic, Some("  ".to_string()), "m".to_string()),
            Err(TierFailure::CredentialMissing)
        ));
        assert!(create_provider(
            ProviderKind::Anthropic,
            Some("test-key".to_string()),
            "claude-sonnet-4-5-20250929".to_string()
        )
        .is_ok());
    }
}

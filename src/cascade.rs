use std::sync::Arc;
use tracing::{debug, warn};

use crate::ai::{self, CredentialCache, Provider, ProviderKind};
use crate::error::{InputError, TierFailure};
use crate::heuristics;
use crate::models::{ParsedEmail, ParsedEntities, RawEmail};
use crate::profession;
use crate::rules::RuleStore;
use crate::status::detect_status;

/// Everything the cascade needs, passed in at construction. No ambient or
/// global state; the credential lives here and nowhere else.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model_id: String,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            api_key: None,
            model_id: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

/// The tier sequencer. Tries AI, then the enhanced heuristics, then the
/// quick heuristics, advancing only on a hard failure. A tier that answers
/// "I don't know" (sentinels everywhere) has still answered; its result is
/// returned as-is rather than second-guessed by a less capable tier.
pub struct Cascade {
    provider: Option<Box<dyn Provider>>,
    credential_cache: CredentialCache,
    rules: Arc<RuleStore>,
}

impl Cascade {
    pub fn new(config: CascadeConfig, rules: Arc<RuleStore>) -> Self {
        let provider =
            match ai::create_provider(config.provider, config.api_key, config.model_id) {
                Ok(p) => Some(p),
                Err(failure) => {
                    debug!(%failure, "AI tier disabled");
                    None
                }
            };
        Self {
            provider,
            credential_cache: CredentialCache::new(),
            rules,
        }
    }

    /// Test seam: run the cascade against an arbitrary provider.
    pub fn with_provider(provider: Box<dyn Provider>, rules: Arc<RuleStore>) -> Self {
        Self {
            provider: Some(provider),
            credential_cache: CredentialCache::new(),
            rules,
        }
    }

    /// No provider configured at all; heuristic tiers only.
    pub fn heuristic_only(rules: Arc<RuleStore>) -> Self {
        Self {
            provider: None,
            credential_cache: CredentialCache::new(),
            rules,
        }
    }

    /// Extract entities from one email. The only error a caller can see is
    /// a contract violation (an email with no content at all); every tier
    /// failure is absorbed by falling through to the next tier, and the
    /// quick tier cannot fail.
    pub fn parse(&self, email: &RawEmail) -> Result<ParsedEntities, InputError> {
        if email.is_empty() {
            return Err(InputError::InvalidInput(
                "email has no sender, subject, or body".to_string(),
            ));
        }

        let rules = self.rules.current();

        if let Some(provider) = &self.provider {
            match ai::try_ai(provider.as_ref(), &self.credential_cache, &rules, email) {
                Ok(entities) => return Ok(entities),
                Err(failure) => match failure {
                    TierFailure::CredentialMissing | TierFailure::CredentialInvalid(_) => {
                        debug!(%failure, "skipping AI tier");
                    }
                    other => warn!(failure = %other, "AI tier failed, falling back"),
                },
            }
        } else {
            debug!("no provider configured, starting at heuristic tier");
        }

        match heuristics::extract_enhanced(&rules, email) {
            Ok(entities) => Ok(entities),
            Err(failure) => {
                warn!(%failure, "enhanced tier failed, falling back to quick tier");
                Ok(heuristics::extract_quick(email))
            }
        }
    }

    /// Full pipeline: entities, then lifecycle status, then the industry
    /// tag. Produces the combined record handed to the ingestion
    /// collaborator.
    pub fn parse_email(&self, email: &RawEmail) -> Result<ParsedEmail, InputError> {
        let entities = self.parse(email)?;
        let rules = self.rules.current();
        let status = detect_status(&rules, email, &entities.company, &entities.position);
        let industry = if entities.position_found() {
            profession::classify(&rules, &entities.position)
        } else {
            None
        };

        Ok(ParsedEmail {
            email: email.clone(),
            entities,
            status,
            industry,
        })
    }

    /// Probe the configured credential. Used by the CLI `check` command.
    pub fn check_credential(&self) -> Result<(), TierFailure> {
        let provider = self
            .provider
            .as_deref()
            .ok_or(TierFailure::CredentialMissing)?;
        self.credential_cache.ensure_valid(provider)
    }

    /// Drop the cached credential verdict so the next parse re-probes.
    pub fn reset_credential_cache(&self) {
        self.credential_cache.reset();
    }
}

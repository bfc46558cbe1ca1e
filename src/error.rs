use thiserror::Error;

/// Hard failures inside a single extraction tier. Every variant is recovered
/// by the cascade via fallback to the next tier; none of them escape
/// `Cascade::parse`.
#[derive(Debug, Error)]
pub enum TierFailure {
    #[error("no API credential configured")]
    CredentialMissing,

    #[error("API credential failed validation probe: {0}")]
    CredentialInvalid(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider response malformed: {0}")]
    ProviderResponseMalformed(String),

    #[error("rule tables unavailable: {0}")]
    RulesUnavailable(String),
}

/// Caller contract violations. Unlike `TierFailure` these propagate, since a
/// well-formed-but-unparseable email is a result while a null email is a bug
/// in the caller.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

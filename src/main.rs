use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use mailtrail::ai::ProviderKind;
use mailtrail::cascade::{Cascade, CascadeConfig};
use mailtrail::mail;
use mailtrail::models::RawEmail;
use mailtrail::profession;
use mailtrail::rules::{RuleSet, RuleStore};

#[derive(Parser)]
#[command(name = "mailtrail")]
#[command(about = "Extract job application data and lifecycle status from emails")]
struct Cli {
    /// Directory of JSON rule tables (defaults to the platform config dir)
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Anthropic,
    Openai,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one email and print the combined record as JSON
    Parse {
        /// JSON file with sender/subject/html_body fields (- for stdin)
        #[arg(short, long, conflicts_with = "eml")]
        file: Option<String>,

        /// RFC822 .eml file
        #[arg(long)]
        eml: Option<PathBuf>,

        /// Completion provider for the AI tier
        #[arg(long, value_enum, default_value = "anthropic")]
        provider: ProviderArg,

        /// Model to request from the provider
        #[arg(long, default_value = "claude-sonnet-4-5-20250929")]
        model: String,

        /// Skip the AI tier even when a credential is configured
        #[arg(long)]
        no_ai: bool,
    },

    /// Map a job title to an industry bucket
    Classify {
        /// Job title or text mentioning one
        title: String,
    },

    /// Probe the configured API credential without spending an extraction call
    Check {
        #[arg(long, value_enum, default_value = "anthropic")]
        provider: ProviderArg,

        #[arg(long, default_value = "claude-sonnet-4-5-20250929")]
        model: String,
    },

    /// Load and summarize the rule tables, reporting any malformed file
    Rules,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let rules = open_rules(cli.rules_dir.clone())?;

    match cli.command {
        Commands::Parse {
            file,
            eml,
            provider,
            model,
            no_ai,
        } => {
            let email = read_email(file, eml)?;
            let cascade = if no_ai {
                Cascade::heuristic_only(rules)
            } else {
                let kind = provider_kind(provider);
                Cascade::new(
                    CascadeConfig {
                        provider: kind,
                        api_key: credential_from_env(kind),
                        model_id: model,
                    },
                    rules,
                )
            };
            let parsed = cascade.parse_email(&email)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }

        Commands::Classify { title } => {
            let current = rules.current();
            match profession::classify(&current, &title) {
                Some(industry) => println!("{}", industry),
                None => println!("(unclassified)"),
            }
        }

        Commands::Check { provider, model } => {
            let kind = provider_kind(provider);
            let cascade = Cascade::new(
                CascadeConfig {
                    provider: kind,
                    api_key: credential_from_env(kind),
                    model_id: model,
                },
                rules,
            );
            match cascade.check_credential() {
                Ok(()) => println!("credential ok"),
                Err(failure) => return Err(anyhow!("credential check failed: {}", failure)),
            }
        }

        Commands::Rules => {
            let current = rules.current();
            println!("companies:       {}", current.known_companies.len());
            println!("positions:       {}", current.known_positions.len());
            println!(
                "indicators:      {} groups / {} phrases",
                current.indicators.len(),
                current.indicators.iter().map(|g| g.phrases.len()).sum::<usize>()
            );
            println!("professions:     {}", current.professions.len());
            println!("generic domains: {}", current.generic_domains.len());
        }
    }

    Ok(())
}

fn provider_kind(arg: ProviderArg) -> ProviderKind {
    match arg {
        ProviderArg::Anthropic => ProviderKind::Anthropic,
        ProviderArg::Openai => ProviderKind::OpenAi,
    }
}

fn credential_from_env(kind: ProviderKind) -> Option<String> {
    let var = match kind {
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::OpenAi => "OPENAI_API_KEY",
    };
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn open_rules(dir: Option<PathBuf>) -> Result<Arc<RuleStore>> {
    let store = match dir.or_else(RuleSet::default_dir) {
        Some(dir) if dir.exists() => RuleStore::from_dir(dir)?,
        _ => RuleStore::builtin(),
    };
    Ok(Arc::new(store))
}

fn read_email(file: Option<String>, eml: Option<PathBuf>) -> Result<RawEmail> {
    if let Some(path) = eml {
        return mail::read_eml(&path);
    }
    let text = match file.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read email JSON from stdin")?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read email file {}", path))?,
    };
    serde_json::from_str(&text).context("Email JSON did not match the expected shape")
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::models::ApplicationStatus;

/// One priority level of the status classifier: every phrase in `phrases` is
/// evidence for `status`. Groups are stored highest-priority first, and both
/// the heuristic detector and the AI prompt are rendered from the same
/// groups so the two tiers cannot drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorGroup {
    pub status: ApplicationStatus,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionEntry {
    pub title: String,
    pub industry: String,
}

/// The complete set of reference tables the heuristic tiers match against.
/// Loaded once at startup, replaceable wholesale at runtime; never mutated
/// in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Closed list of company names matched against subject+body text.
    /// A coverage fallback, not a general solution.
    pub known_companies: Vec<String>,
    /// Literal position phrases, most specific first.
    pub known_positions: Vec<String>,
    /// Status indicator groups in priority order (rejection first).
    pub indicators: Vec<IndicatorGroup>,
    /// Title-to-industry table; first satisfying entry wins in table order.
    pub professions: Vec<ProfessionEntry>,
    /// Second-level domains that never identify an employer (mail providers,
    /// ATS platforms, job boards).
    pub generic_domains: Vec<String>,
}

impl RuleSet {
    /// Compiled-in tables, used when no rules directory is configured or a
    /// table file is absent.
    pub fn builtin() -> Self {
        Self {
            known_companies: [
                "Old Mission Capital",
                "Old Mission",
                "GoFundMe",
                "Stripe",
                "Datadog",
                "Cloudflare",
                "Palantir",
                "Epic Systems",
                "Jane Street",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            known_positions: [
                "Summer 2026 Information Technology Intern - Remote",
                "Summer 2026 Information Technology Intern",
                "IT Administrator Intern",
                "Information Technology Intern",
                "Software Engineering Intern",
                "Software Development Engineer",
                "Senior Software Engineer",
                "Software Engineer",
                "Data Analyst Intern",
                "Data Analyst",
                "Product Manager",
                "IT Intern",
                "Intern",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            indicators: vec![
                IndicatorGroup {
                    status: ApplicationStatus::Rejected,
                    phrases: [
                        "decided to pursue another candidate",
                        "not selected to move forward",
                        "will not be moving your application forward",
                        "moved forward with other candidates",
                        "not moving forward",
                        "haven't been selected",
                        "unfortunately",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                IndicatorGroup {
                    status: ApplicationStatus::OfferReceived,
                    phrases: [
                        "pleased to offer",
                        "welcome to the team",
                        "congratulations",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                IndicatorGroup {
                    status: ApplicationStatus::InterviewScheduled,
                    phrases: [
                        "we'd like to schedule",
                        "interview invitation",
                        "we'd like to invite you",
                        "next steps",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
                IndicatorGroup {
                    status: ApplicationStatus::Applied,
                    phrases: [
                        "thank you for applying",
                        "application received",
                        "we've received your application",
                        "thank you for your interest",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                },
            ],
            professions: builtin_professions(),
            generic_domains: [
                "gmail", "outlook", "yahoo", "hotmail", "icloud", "noreply",
                "greenhouse", "lever", "workday", "taleo", "smartrecruiters",
                "myworkday", "icims", "ashbyhq", "indeed", "linkedin",
                "glassdoor", "monster", "ziprecruiter",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    /// Load tables from a directory of JSON files, falling back to the
    /// builtin table for any file that is absent. A present-but-malformed
    /// file is an error; silently ignoring it would hide a bad deploy.
    pub fn load(dir: &Path) -> Result<Self> {
        let builtin = Self::builtin();
        Ok(Self {
            known_companies: load_table(dir, "companies.json", builtin.known_companies)?,
            known_positions: load_table(dir, "positions.json", builtin.known_positions)?,
            indicators: load_table(dir, "indicators.json", builtin.indicators)?,
            professions: load_table(dir, "professions.json", builtin.professions)?,
            generic_domains: load_table(dir, "generic_domains.json", builtin.generic_domains)?,
        })
    }

    /// Default rules directory under the platform config dir.
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mailtrail")
            .map(|dirs| dirs.config_dir().join("rules"))
    }

    /// A ruleset with no indicator groups cannot classify anything; the
    /// enhanced tier treats that as a hard failure so the cascade can still
    /// fall through to the quick tier's compiled-in logic.
    pub fn is_usable(&self) -> bool {
        !self.indicators.is_empty()
            && !self.generic_domains.is_empty()
            && !self.known_positions.is_empty()
    }
}

fn load_table<T: serde::de::DeserializeOwned>(
    dir: &Path,
    file: &str,
    fallback: T,
) -> Result<T> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(fallback);
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read rule table {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed rule table {:?}", path))
}

/// Shared handle over the current ruleset. Readers clone the inner `Arc`;
/// `reload` swaps the whole set at once, so a parse in flight keeps the
/// tables it started with.
#[derive(Debug)]
pub struct RuleStore {
    inner: RwLock<Arc<RuleSet>>,
    dir: Option<PathBuf>,
}

impl RuleStore {
    pub fn builtin() -> Self {
        Self {
            inner: RwLock::new(Arc::new(RuleSet::builtin())),
            dir: None,
        }
    }

    pub fn from_dir(dir: PathBuf) -> Result<Self> {
        let rules = RuleSet::load(&dir)?;
        Ok(Self {
            inner: RwLock::new(Arc::new(rules)),
            dir: Some(dir),
        })
    }

    pub fn current(&self) -> Arc<RuleSet> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read the rules directory and swap the tables wholesale. A no-op
    /// for builtin-only stores.
    pub fn reload(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let rules = Arc::new(RuleSet::load(dir)?);
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = rules;
        Ok(())
    }
}

fn builtin_professions() -> Vec<ProfessionEntry> {
    let table: &[(&str, &[&str])] = &[
        (
            "Technology",
            &[
                "Software Engineer",
                "Software Developer",
                "Data Scientist",
                "Data Engineer",
                "DevOps Engineer",
                "Site Reliability Engineer",
                "IT Administrator",
                "Information Technology Intern",
                "Systems Administrator",
                "Security Engineer",
                "Machine Learning Engineer",
                "QA Engineer",
                "Web Developer",
            ],
        ),
        (
            "Finance",
            &[
                "Financial Analyst",
                "Investment Banker",
                "Accountant",
                "Auditor",
                "Quantitative Analyst",
                "Quantitative Trader",
                "Portfolio Manager",
            ],
        ),
        (
            "Healthcare",
            &[
                "Registered Nurse",
                "Physician",
                "Medical Assistant",
                "Pharmacist",
                "Physical Therapist",
            ],
        ),
        (
            "Marketing",
            &[
                "Marketing Manager",
                "Content Strategist",
                "SEO Specialist",
                "Brand Manager",
                "Social Media Manager",
            ],
        ),
        (
            "Sales",
            &[
                "Sales Representative",
                "Account Executive",
                "Sales Development Representative",
                "Account Manager",
            ],
        ),
        (
            "Engineering",
            &[
                "Mechanical Engineer",
                "Civil Engineer",
                "Electrical Engineer",
                "Chemical Engineer",
                "Aerospace Engineer",
            ],
        ),
        (
            "Education",
            &["Teacher", "Professor", "Instructional Designer", "Tutor"],
        ),
        (
            "Legal",
            &["Attorney", "Paralegal", "Legal Assistant", "Compliance Officer"],
        ),
        (
            "Human Resources",
            &["HR Manager", "Recruiter", "Talent Acquisition Specialist"],
        ),
        (
            "Design",
            &["Product Designer", "UX Designer", "Graphic Designer", "UI Designer"],
        ),
        (
            "Operations",
            &[
                "Operations Manager",
                "Supply Chain Analyst",
                "Logistics Coordinator",
                "Project Manager",
            ],
        ),
        (
            "Customer Service",
            &["Customer Success Manager", "Support Specialist", "Customer Service Representative"],
        ),
    ];

    table
        .iter()
        .flat_map(|(industry, titles)| {
            titles.iter().map(|title| ProfessionEntry {
                title: title.to_string(),
                industry: industry.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_rules_are_usable() {
        let rules = RuleSet::builtin();
        assert!(rules.is_usable());
        // Rejection must be the highest-priority group.
        assert_eq!(rules.indicators[0].status, ApplicationStatus::Rejected);
        // Priority order is rejected > offer > interview > applied.
        let order: Vec<ApplicationStatus> =
            rules.indicators.iter().map(|g| g.status).collect();
        assert_eq!(
            order,
            vec![
                ApplicationStatus::Rejected,
                ApplicationStatus::OfferReceived,
                ApplicationStatus::InterviewScheduled,
                ApplicationStatus::Applied,
            ]
        );
    }

    #[test]
    fn test_positions_ordered_specific_first() {
        let rules = RuleSet::builtin();
        let long = rules
            .known_positions
            .iter()
            .position(|p| p == "Summer 2026 Information Technology Intern - Remote")
            .unwrap();
        let short = rules
            .known_positions
            .iter()
            .position(|p| p == "Intern")
            .unwrap();
        assert!(long < short);
    }

    #[test]
    fn test_load_missing_dir_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RuleSet::load(dir.path()).unwrap();
        assert_eq!(
            rules.known_companies,
            RuleSet::builtin().known_companies
        );
    }

    #[test]
    fn test_load_overrides_single_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("companies.json")).unwrap();
        write!(f, "[\"Initech\", \"Hooli\"]").unwrap();

        let rules = RuleSet::load(dir.path()).unwrap();
        assert_eq!(rules.known_companies, vec!["Initech", "Hooli"]);
        // Untouched tables still come from the builtin set.
        assert!(!rules.indicators.is_empty());
    }

    #[test]
    fn test_load_malformed_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("companies.json")).unwrap();
        write!(f, "not json").unwrap();
        assert!(RuleSet::load(dir.path()).is_err());
    }

    #[test]
    fn test_rule_store_reload_swaps_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::from_dir(dir.path().to_path_buf()).unwrap();
        let before = store.current();

        let mut f = fs::File::create(dir.path().join("companies.json")).unwrap();
        write!(f, "[\"Initech\"]").unwrap();
        store.reload().unwrap();

        let after = store.current();
        assert_eq!(after.known_companies, vec!["Initech"]);
        // The snapshot taken before reload is unaffected.
        assert_ne!(before.known_companies, after.known_companies);
    }
}

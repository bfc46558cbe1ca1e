use crate::rules::RuleSet;

/// Map a job title (or any text mentioning one) to an industry bucket.
///
/// Two passes over the table, first satisfying entry wins in table order:
/// exact case-insensitive substring first, then a partial pass requiring at
/// least two tokens of a table title to appear in the input. No scoring.
/// `None` is a normal answer, not an error.
pub fn classify(rules: &RuleSet, title_or_text: &str) -> Option<String> {
    let haystack = title_or_text.to_lowercase();
    if haystack.trim().is_empty() {
        return None;
    }

    for entry in &rules.professions {
        if haystack.contains(&entry.title.to_lowercase()) {
            return Some(entry.industry.clone());
        }
    }

    for entry in &rules.professions {
        let tokens: Vec<String> = entry
            .title
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.len() < 2 {
            continue;
        }
        let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
        if hits >= 2 {
            return Some(entry.industry.clone());
        }
    }

    None
}

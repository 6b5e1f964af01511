use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::header::RewriteRule;

static NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z]+").expect("non-letter pattern is valid"));

/// Address derived from a display name: each run of non-ASCII-letters becomes
/// one dot, case is kept, `domain` is appended.
///
/// `synthetic_address("Joe Shmo (JIRA)", "fake.example")` is
/// `Joe.Shmo.JIRA.@fake.example`.
pub fn synthetic_address(display_name: &str, domain: &str) -> String {
    let local = NON_LETTERS.replace_all(display_name, ".");
    format!("{local}@{domain}")
}

/// Replacement for a From pattern whose first group captures the display
/// name; the match becomes `"<name>" <synthetic address>`.
pub fn synthetic_sender(
    domain: String,
) -> impl Fn(&Captures<'_>, &str) -> String + Send + Sync + 'static {
    move |caps, _fragment| {
        let name = caps.get(1).map_or("", |m| m.as_str());
        format!("\"{name}\" <{}>", synthetic_address(name, &domain))
    }
}

/// From rule built from a pattern and the synthetic domain.
pub fn sender_rule(pattern: &str, domain: &str) -> Result<RewriteRule, regex::Error> {
    RewriteRule::with_fn(pattern, synthetic_sender(domain.to_string()))
}

use crate::domain::header::{EncodedHeaderFragment, RewriteRule};
use crate::mail::codec::{self, DecodeError};

/// Applies `rule` to every fragment, at most one substitution per fragment.
///
/// The flag is true when at least one substitution happened, even if it
/// produced identical text; false means the pattern matched nowhere.
pub fn rewrite(
    fragments: &[EncodedHeaderFragment],
    rule: &RewriteRule,
) -> (Vec<EncodedHeaderFragment>, bool) {
    let mut changed = false;
    let rewritten = fragments
        .iter()
        .map(|fragment| match rule.replace_first(&fragment.text) {
            Some(text) => {
                changed = true;
                EncodedHeaderFragment {
                    text,
                    charset: fragment.charset.clone(),
                }
            }
            None => fragment.clone(),
        })
        .collect();
    (rewritten, changed)
}

/// Decode, rewrite and re-encode the raw value of header `name`.
/// `Ok(None)` means nothing matched and the header should stay as it is.
pub fn rewrite_header(
    name: &str,
    raw: &str,
    rule: &RewriteRule,
) -> Result<Option<String>, DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let fragments = codec::decode(raw)?;
    let (fragments, changed) = rewrite(&fragments, rule);
    Ok(changed.then(|| codec::encode_at(&fragments, name.len() + 2)))
}

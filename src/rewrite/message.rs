//! Rewrites the Subject and From headers of one message and pins Reply-To.
//!
//! The message moves through
//! `Fetched -> SubjectChecked -> (SubjectRewritten | SubjectSkipped) -> FromChecked
//! -> (FromRewritten | FromSkipped) -> ReplyToSet -> Serialized`.
//! A header that is absent, does not match, or cannot be decoded is left
//! byte for byte as it was; that never stops the rest of the message.

use log::{debug, warn};

use crate::domain::header::RewriteRule;
use crate::domain::message::{Message, MessageError};
use crate::mail::codec::DecodeError;
use crate::rewrite::header::rewrite_header;

/// What happened to one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOutcome {
    Absent,
    NoMatch { original: String },
    Rewritten { original: String, rewritten: String },
    Undecodable { original: String, error: DecodeError },
}

impl HeaderOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, HeaderOutcome::Rewritten { .. })
    }

    /// The header value before any rewrite, when there was one.
    pub fn original(&self) -> Option<&str> {
        match self {
            HeaderOutcome::Absent => None,
            HeaderOutcome::NoMatch { original }
            | HeaderOutcome::Rewritten { original, .. }
            | HeaderOutcome::Undecodable { original, .. } => Some(original),
        }
    }
}

/// The serialised result plus what happened to each rewritten header.
#[derive(Debug, Clone)]
pub struct RewrittenMessage {
    pub bytes: Vec<u8>,
    pub subject: HeaderOutcome,
    pub from: HeaderOutcome,
}

impl RewrittenMessage {
    /// True when Subject or From changed. Setting Reply-To alone does not count.
    pub fn changed(&self) -> bool {
        self.subject.is_rewritten() || self.from.is_rewritten()
    }

    /// The rewritten bytes, or `None` when nothing needs storing.
    pub fn into_changed(self) -> Option<Vec<u8>> {
        if self.changed() {
            Some(self.bytes)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRewriter {
    subject_rule: RewriteRule,
    from_rule: RewriteRule,
    reply_to: String,
}

impl MessageRewriter {
    pub fn new(subject_rule: RewriteRule, from_rule: RewriteRule, reply_to: impl Into<String>) -> Self {
        Self {
            subject_rule,
            from_rule,
            reply_to: reply_to.into(),
        }
    }

    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    pub fn rewrite(&self, raw: &[u8]) -> Result<RewrittenMessage, MessageError> {
        let mut message = Message::parse(raw)?;

        let subject = apply(&mut message, "Subject", &self.subject_rule);
        let from = apply(&mut message, "From", &self.from_rule);
        message.set_header("Reply-To", &self.reply_to);

        Ok(RewrittenMessage {
            bytes: message.to_bytes(),
            subject,
            from,
        })
    }

    /// Rewritten bytes, or `None` when neither Subject nor From changed.
    pub fn rewrite_bytes(&self, raw: &[u8]) -> Result<Option<Vec<u8>>, MessageError> {
        Ok(self.rewrite(raw)?.into_changed())
    }
}

fn apply(message: &mut Message, name: &str, rule: &RewriteRule) -> HeaderOutcome {
    let Some(raw) = message.header(name) else {
        debug!("{name}: absent");
        return HeaderOutcome::Absent;
    };
    let original = match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let original = String::from_utf8_lossy(raw).into_owned();
            warn!("{name}: {original:?} left as is: {}", DecodeError::NotUtf8);
            return HeaderOutcome::Undecodable {
                original,
                error: DecodeError::NotUtf8,
            };
        }
    };

    match rewrite_header(name, &original, rule) {
        Ok(Some(rewritten)) => {
            message.replace_header(name, &rewritten);
            HeaderOutcome::Rewritten {
                original,
                rewritten,
            }
        }
        Ok(None) => {
            debug!("{name}: {original:?} does not match");
            HeaderOutcome::NoMatch { original }
        }
        Err(error) => {
            warn!("{name}: {original:?} left as is: {error}");
            HeaderOutcome::Undecodable { original, error }
        }
    }
}

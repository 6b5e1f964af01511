use std::fmt;
use std::sync::Arc;

use regex::{Captures, Regex, RegexBuilder};

/// One run of header text together with the charset it travelled in.
/// `charset == None` means the run was plain (unencoded) header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHeaderFragment {
    pub text: String,
    pub charset: Option<String>,
}

impl EncodedHeaderFragment {
    pub fn native(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            charset: None,
        }
    }

    pub fn encoded(text: impl Into<String>, charset: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            charset: Some(charset.into()),
        }
    }
}

pub type ReplaceFn = dyn Fn(&Captures<'_>, &str) -> String + Send + Sync;

/// What a match is replaced with.
#[derive(Clone)]
pub enum Replacement {
    /// `regex` template syntax: `$1`, `${name}`, `$$`.
    Template(String),
    /// Called with the captures and the whole fragment the match came from.
    Function(Arc<ReplaceFn>),
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replacement::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A pattern and its replacement, applied to one header.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: Replacement,
}

impl RewriteRule {
    pub fn new(pattern: Regex, replacement: Replacement) -> Self {
        Self {
            pattern,
            replacement,
        }
    }

    /// Compiles `pattern` in multi-line mode (`^`/`$` match at folded line breaks).
    pub fn template(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).multi_line(true).build()?;
        Ok(Self::new(pattern, Replacement::Template(replacement.into())))
    }

    pub fn with_fn<F>(pattern: &str, f: F) -> Result<Self, regex::Error>
    where
        F: Fn(&Captures<'_>, &str) -> String + Send + Sync + 'static,
    {
        let pattern = RegexBuilder::new(pattern).multi_line(true).build()?;
        Ok(Self::new(pattern, Replacement::Function(Arc::new(f))))
    }

    /// Replaces the first match in `text`. `None` when the pattern does not match.
    pub fn replace_first(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        let whole = caps.get(0)?;

        let mut out = String::with_capacity(text.len());
        out.push_str(&text[..whole.start()]);
        match &self.replacement {
            Replacement::Template(template) => caps.expand(template, &mut out),
            Replacement::Function(f) => out.push_str(&f(&caps, text)),
        }
        out.push_str(&text[whole.end()..]);
        Some(out)
    }
}

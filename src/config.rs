use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::header::RewriteRule;
use crate::rewrite::message::MessageRewriter;
use crate::rewrite::sender::sender_rule;

pub const DEFAULT_IMAP_SERVER: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_SEARCH: &str = "SUBJECT \"[jira]\"";

// Subject: Re: [jira] Updated: (HADOOP-4675) Current Ganglia metrics skipped.
// keeps the ticket number, drops the action words in between
pub const DEFAULT_SUBJECT_REGEX: &str = r"\[jira\](?: (?:[A-Za-z]+))+: (\([A-Z]+-[0-9]+\))";
pub const DEFAULT_SUBJECT_REPLACE: &str = "$1";
pub const DEFAULT_FROM_REGEX: &str = r#"^"(.+)" <jira@apache\.org>$"#;
pub const DEFAULT_SYNTHETIC_DOMAIN: &str = "fake.jira.apache.org";
pub const DEFAULT_REPLY_TO: &str = "jira@apache.org";
pub const DEFAULT_SLEEP_SECS: u64 = 5 * 60;

/// Every key is optional; command-line flags win over the file, the file wins
/// over the built-in defaults above.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub imap_server: Option<String>,
    pub imap_port: Option<u16>,
    pub username: Option<String>,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub backup: Option<String>,
    pub search: Option<String>,
    pub subject_regex: Option<String>,
    pub subject_replace: Option<String>,
    pub from_regex: Option<String>,
    pub synthetic_domain: Option<String>,
    pub reply_to: Option<String>,
    pub sleep_secs: Option<u64>,
}

impl Config {
    pub fn imap_server(&self) -> &str {
        self.imap_server.as_deref().unwrap_or(DEFAULT_IMAP_SERVER)
    }

    pub fn imap_port(&self) -> u16 {
        self.imap_port.unwrap_or(DEFAULT_IMAP_PORT)
    }

    pub fn search(&self) -> &str {
        self.search.as_deref().unwrap_or(DEFAULT_SEARCH)
    }

    pub fn sleep_secs(&self) -> u64 {
        self.sleep_secs.unwrap_or(DEFAULT_SLEEP_SECS)
    }

    /// Compiles the Subject and From rules.
    pub fn build_rewriter(&self) -> Result<MessageRewriter> {
        let subject_regex = self.subject_regex.as_deref().unwrap_or(DEFAULT_SUBJECT_REGEX);
        let subject = RewriteRule::template(
            subject_regex,
            self.subject_replace
                .as_deref()
                .unwrap_or(DEFAULT_SUBJECT_REPLACE),
        )
        .with_context(|| format!("invalid subject regex {subject_regex:?}"))?;

        let from_regex = self.from_regex.as_deref().unwrap_or(DEFAULT_FROM_REGEX);
        let from = sender_rule(
            from_regex,
            self.synthetic_domain
                .as_deref()
                .unwrap_or(DEFAULT_SYNTHETIC_DOMAIN),
        )
        .with_context(|| format!("invalid from regex {from_regex:?}"))?;

        Ok(MessageRewriter::new(
            subject,
            from,
            self.reply_to.as_deref().unwrap_or(DEFAULT_REPLY_TO),
        ))
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("jira_rewrite"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `path`, or the default location when `None`. Only an explicitly
/// named file has to exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path()?, false),
    };
    if !path.exists() {
        if required {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&path)?;
    let cfg: Config =
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

/// Writes a template config for users to edit. Never overwrites.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let sample = Config {
        imap_server: Some(DEFAULT_IMAP_SERVER.to_string()),
        imap_port: Some(DEFAULT_IMAP_PORT),
        username: Some("you@example.com".to_string()),
        source: Some("hadoop-jira".to_string()),
        dest: Some("hadoop-jira-rewritten".to_string()),
        backup: Some("hadoop-jira-orig".to_string()),
        search: Some(DEFAULT_SEARCH.to_string()),
        subject_regex: Some(DEFAULT_SUBJECT_REGEX.to_string()),
        subject_replace: Some(DEFAULT_SUBJECT_REPLACE.to_string()),
        from_regex: Some(DEFAULT_FROM_REGEX.to_string()),
        synthetic_domain: Some(DEFAULT_SYNTHETIC_DOMAIN.to_string()),
        reply_to: Some(DEFAULT_REPLY_TO.to_string()),
        sleep_secs: Some(DEFAULT_SLEEP_SECS),
    };
    let tom = toml::to_string_pretty(&sample)?;
    fs::write(path, tom)?;
    Ok(())
}

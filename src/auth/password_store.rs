use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use keyring::{Entry, Error as KeyringError};
use log::warn;

const SERVICE: &str = "jira_rewrite";
pub const PASSWORD_ENV: &str = "JIRA_REWRITE_PASSWORD";

/// Save the IMAP password for `username` into the OS keyring
pub fn save_password(username: &str, password: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, username);
    entry?
        .set_password(password)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load the IMAP password for `username` from the keyring
pub fn load_password(username: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, username);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

pub fn read_password_file(path: &Path) -> Result<String> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading password file {}", path.display()))?;
    Ok(s.trim_end().to_string())
}

/// Password file, then keyring, then `JIRA_REWRITE_PASSWORD`.
pub fn resolve_password(username: &str, pwfile: Option<&Path>) -> Result<String> {
    resolve_with(
        username,
        pwfile,
        || load_password(username),
        || std::env::var(PASSWORD_ENV).ok(),
    )
}

/// A keyring that cannot be reached (no Secret Service on a headless host)
/// is logged and skipped so the environment variable still applies.
fn resolve_with(
    username: &str,
    pwfile: Option<&Path>,
    keyring: impl FnOnce() -> Result<Option<String>>,
    env: impl FnOnce() -> Option<String>,
) -> Result<String> {
    if let Some(path) = pwfile {
        return read_password_file(path);
    }
    match keyring() {
        Ok(Some(p)) => return Ok(p),
        Ok(None) => {}
        Err(e) => warn!("Keyring unavailable for {username}: {e:#}"),
    }
    env().ok_or_else(|| {
        anyhow!(
            "no password for {username}: pass --pwfile, run `jira_rewrite set-password --username {username}`, or set {PASSWORD_ENV}"
        )
    })
}

use std::net::TcpStream;

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset};
use imap::types::Flag;
use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};

use crate::domain::email::{FetchedMessage, MessageId};
use crate::store::repo::{MailStore, StoreError};

pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub user: String,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            user: user.into(),
        }
    }

    /// TLS connect and LOGIN.
    pub fn connect(&self, password: &str) -> Result<ImapMailbox> {
        debug!("Connecting to {}:{}", self.server, self.port);
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)?;

        let session = client
            .login(&self.user, password)
            .map_err(|(e, _)| anyhow!("IMAP login as {} failed: {e}", self.user))?;
        Ok(ImapMailbox { session })
    }
}

/// An authenticated session. All ids are UIDs.
pub struct ImapMailbox {
    session: imap::Session<TlsStream<TcpStream>>,
}

impl MailStore for ImapMailbox {
    fn select(&mut self, folder: &str) -> Result<()> {
        let mailbox = self.session.select(folder)?;
        debug!("{folder} has {} messages", mailbox.exists);
        Ok(())
    }

    fn search(&mut self, query: &str) -> Result<Vec<MessageId>> {
        let mut uids: Vec<MessageId> = self.session.uid_search(query)?.into_iter().collect();
        // UIDs grow with arrival, so ascending is oldest first
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, id: MessageId) -> Result<FetchedMessage> {
        let fetches = self
            .session
            .uid_fetch(id.to_string(), "(UID FLAGS INTERNALDATE BODY.PEEK[])")?;
        let f = fetches.iter().next().ok_or(StoreError::NotFound(id))?;

        let flags: Vec<String> = f
            .flags()
            .iter()
            .filter(|flag| !matches!(flag, Flag::Recent))
            .map(|flag| flag.to_string())
            .collect();
        let arrival = f.internal_date();

        if let Some(raw) = f.body() {
            return Ok(FetchedMessage {
                id,
                raw: raw.to_vec(),
                flags,
                arrival,
            });
        }

        // Retry once
        warn!("UID {id} missing body on first fetch; retrying once");
        let retry = self.session.uid_fetch(id.to_string(), "(UID BODY.PEEK[])")?;
        let f2 = retry.iter().next().ok_or(StoreError::NotFound(id))?;
        let raw = f2
            .body()
            .ok_or_else(|| anyhow!("UID {id}: missing body even after retry"))?;

        Ok(FetchedMessage {
            id,
            raw: raw.to_vec(),
            flags,
            arrival,
        })
    }

    fn append(
        &mut self,
        folder: &str,
        raw: &[u8],
        flags: &[String],
        arrival: Option<DateTime<FixedOffset>>,
    ) -> Result<()> {
        let flags: Vec<Flag<'_>> = flags.iter().map(|f| Flag::from(f.clone())).collect();
        self.session
            .append_with_flags_and_date(folder, raw, &flags, arrival)?;
        Ok(())
    }

    fn copy(&mut self, id: MessageId, folder: &str) -> Result<()> {
        self.session.uid_copy(id.to_string(), folder)?;
        Ok(())
    }

    fn delete(&mut self, id: MessageId) -> Result<()> {
        self.session.uid_store(id.to_string(), "+FLAGS (\\Deleted)")?;
        self.session.expunge()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.session.close()?;
        self.session.logout()?;
        Ok(())
    }
}

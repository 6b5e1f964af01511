use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::domain::email::{FetchedMessage, MessageId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(MessageId),
}

/// A remote mailbox, seen through the handful of operations the rewriter needs.
pub trait MailStore {
    fn select(&mut self, folder: &str) -> Result<()>;

    /// Ids in the selected folder matching `query`, oldest first.
    fn search(&mut self, query: &str) -> Result<Vec<MessageId>>;

    /// Fails with [`StoreError::NotFound`] when the id no longer exists.
    fn fetch(&mut self, id: MessageId) -> Result<FetchedMessage>;

    fn append(
        &mut self,
        folder: &str,
        raw: &[u8],
        flags: &[String],
        arrival: Option<DateTime<FixedOffset>>,
    ) -> Result<()>;

    fn copy(&mut self, id: MessageId, folder: &str) -> Result<()>;

    /// Marks the message deleted and expunges it.
    fn delete(&mut self, id: MessageId) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

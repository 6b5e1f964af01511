use chrono::{DateTime, FixedOffset};

/// IMAP UID of a message in the selected folder.
pub type MessageId = u32;

/// A message as handed over by the mail store.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub id: MessageId,
    pub raw: Vec<u8>,
    /// Flags in their IMAP spelling, e.g. `\Seen`.
    pub flags: Vec<String>,
    /// Server-side arrival time (IMAP INTERNALDATE), kept when re-appending.
    pub arrival: Option<DateTime<FixedOffset>>,
}

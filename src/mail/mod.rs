pub mod codec;
pub mod imap_client;

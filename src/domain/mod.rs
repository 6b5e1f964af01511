pub mod email;
pub mod header;
pub mod message;

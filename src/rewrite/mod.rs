//! Header rewriting: per-header pattern substitution and the whole-message pass.

pub mod header;
pub mod message;
pub mod sender;

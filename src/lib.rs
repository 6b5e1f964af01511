pub mod auth;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod mail;
pub mod rewrite;
pub mod store;

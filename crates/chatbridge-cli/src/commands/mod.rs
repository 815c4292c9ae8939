//! CLI command implementations.

pub mod chat;
pub mod config;
pub mod doctor;

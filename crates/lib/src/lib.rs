//! Pac-lead agent core library: WhatsApp webhook gateway, assistant/leads/messaging clients and
//! the per-message dispatch flow used by the CLI.

pub mod buffer;
pub mod clients;
pub mod config;
pub mod flow;
pub mod gateway;
pub mod init;
pub mod webhook;

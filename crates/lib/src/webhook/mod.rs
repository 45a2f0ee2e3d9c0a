//! Inbound provider webhooks.
//!
//! Payloads are decoded tolerantly: each field is looked up through an ordered list of historical
//! key spellings so older provider versions keep working.

mod incoming;

pub use incoming::{sender_number, IncomingMessage, IncomingWebhook, WebhookError};

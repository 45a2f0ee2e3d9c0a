//! Gateway: HTTP server for provider webhooks and health checks.
//!
//! Every webhook is decoded, appended to the sender's buffer and dispatched on its own request
//! task. The caller always gets `200 {"ok": bool}` unless the body is not a JSON object.

mod server;

pub use server::{router, run_gateway, GatewayState};

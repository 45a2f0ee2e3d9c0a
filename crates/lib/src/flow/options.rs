//! Per-request tenant and instance context.

use axum::http::HeaderMap;

/// Context a dispatch runs under. Built by the webhook receiver from request headers and route;
/// blank values mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    pub instance_id: String,
    /// Overrides the configured messaging token when non-blank.
    pub instance_token: String,
    pub org_id: String,
    pub flow_id: String,
    /// Route slug for `/webhooks/{slug}`; None on fixed routes.
    pub slug: Option<String>,
}

impl DispatchOptions {
    /// Read `X-Instance-ID`, `X-Instance-Token`, `X-Org-ID` and `X-Flow-ID` (trimmed).
    pub fn from_headers(headers: &HeaderMap, slug: Option<String>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            instance_id: header("x-instance-id"),
            instance_token: header("x-instance-token"),
            org_id: header("x-org-id"),
            flow_id: header("x-flow-id"),
            slug: slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        }
    }
}

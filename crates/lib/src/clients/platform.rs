//! Platform backend client: per-tenant agent settings (`GET /api/agent/settings`).
//!
//! Tenants are identified by the `X-Org-ID` / `X-Flow-ID` headers. A missing base URL or a 404
//! means "not configured" and is reported as `Ok(None)`, never as an error.

use serde_json::{Map, Value};
use std::time::Duration;

/// Free-form agent settings of one tenant. Field lookups walk an ordered list of key spellings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSettings {
    fields: Map<String, Value>,
}

const NAME_KEYS: &[&str] = &["name", "agent_name", "display_name"];
const SECTOR_KEYS: &[&str] = &["sector", "industry"];
const STYLE_KEYS: &[&str] = &["communication_style", "tone"];
const PROFILE_KEYS: &[&str] = &["profile_type", "profile"];
const CUSTOM_KEYS: &[&str] = &["custom_instructions", "customization"];
const PROMPT_KEYS: &[&str] = &["prompt", "system_prompt", "full_prompt"];
const TAX_ID_KEYS: &[&str] = &["tax_id", "cnpj"];

impl AgentSettings {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// First non-blank string among `keys`, trimmed.
    pub fn text(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.text(NAME_KEYS)
    }

    pub fn sector(&self) -> Option<&str> {
        self.text(SECTOR_KEYS)
    }

    pub fn communication_style(&self) -> Option<&str> {
        self.text(STYLE_KEYS)
    }

    pub fn profile_type(&self) -> Option<&str> {
        self.text(PROFILE_KEYS)
    }

    pub fn custom_instructions(&self) -> Option<&str> {
        self.text(CUSTOM_KEYS)
    }

    /// Full prompt that replaces the base prompt entirely.
    pub fn prompt_override(&self) -> Option<&str> {
        self.text(PROMPT_KEYS)
    }

    /// Tenant tax id reduced to its digits; None when absent or digit-free.
    pub fn tax_id_digits(&self) -> Option<String> {
        let digits = only_digits(self.text(TAX_ID_KEYS)?);
        if digits.is_empty() {
            None
        } else {
            Some(digits)
        }
    }
}

/// Strip every non-digit character (CPF/CNPJ punctuation).
pub fn only_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("platform settings http {0}")]
    Status(u16),
}

/// Client for the platform backend. Carries its own request timeout.
#[derive(Clone)]
pub struct PlatformClient {
    /// None when the platform is not configured.
    base_url: Option<String>,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, PlatformError> {
        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// GET {base}/api/agent/settings for the tenant. `Ok(None)` when unconfigured, on 404, or
    /// when the backend returns an empty object. `{ "data": {...} }` envelopes are unwrapped.
    pub async fn agent_settings(
        &self,
        org_id: &str,
        flow_id: &str,
    ) -> Result<Option<AgentSettings>, PlatformError> {
        let Some(ref base) = self.base_url else {
            return Ok(None);
        };
        let org_id = org_id.trim();
        let flow_id = flow_id.trim();
        let mut req = self
            .client
            .get(format!("{}/api/agent/settings", base))
            .header(reqwest::header::ACCEPT, "application/json");
        let mut query: Vec<(&str, &str)> = Vec::new();
        if !org_id.is_empty() {
            req = req.header("X-Org-ID", org_id);
            query.push(("org_id", org_id));
        }
        if !flow_id.is_empty() {
            req = req.header("X-Flow-ID", flow_id);
            query.push(("flow_id", flow_id));
        }
        if !query.is_empty() {
            req = req.query(&query);
        }

        let res = req.send().await?;
        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.as_u16() >= 400 {
            return Err(PlatformError::Status(status.as_u16()));
        }
        let body: Value = res.json().await?;
        Ok(settings_from_body(body))
    }
}

fn settings_from_body(body: Value) -> Option<AgentSettings> {
    let Value::Object(mut map) = body else {
        return None;
    };
    if let Some(Value::Object(data)) = map.remove("data") {
        map = data;
    }
    if map.is_empty() {
        None
    } else {
        Some(AgentSettings::new(map))
    }
}

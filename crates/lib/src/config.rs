//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pac-lead/config.json`) and then overridden by
//! environment variables, so a deployment can run from the environment alone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Hosted assistant (threads, runs, speech).
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Outbound WhatsApp gateway.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Leads/products backend and CRM.
    #[serde(default)]
    pub leads: LeadsConfig,

    /// Multi-tenant platform backend (agent settings).
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Prompt defaults.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Optional per-sender message buffer.
    #[serde(default)]
    pub buffer: BufferConfig,
}

/// Listener bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the webhook must be reachable by the provider).
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8080
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Assistant API credentials and run/speech tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// Bearer key. Overridden by OPENAI_API_KEY.
    pub api_key: Option<String>,
    /// Assistant used for every run. Overridden by OPENAI_ASSISTANT_ID.
    #[serde(default = "default_assistant_id")]
    pub assistant_id: String,
    /// API root. Overridden by OPENAI_BASE_URL.
    #[serde(default = "default_assistant_base_url")]
    pub base_url: String,
    /// Delay between run status checks.
    #[serde(default = "default_run_poll_interval_ms")]
    pub run_poll_interval_ms: u64,
    /// Give up waiting for a run after this long; the reply is then dropped.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default)]
    pub speech: SpeechConfig,
}

fn default_assistant_id() -> String {
    "asst_xxx".to_string()
}

fn default_assistant_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_run_poll_interval_ms() -> u64 {
    500
}

fn default_run_timeout_secs() -> u64 {
    60
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: default_assistant_id(),
            base_url: default_assistant_base_url(),
            run_poll_interval_ms: default_run_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            speech: SpeechConfig::default(),
        }
    }
}

/// Text-to-speech request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_speech_voice")]
    pub voice: String,
    #[serde(default = "default_speech_instructions")]
    pub instructions: String,
}

fn default_speech_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_speech_voice() -> String {
    "ballad".to_string()
}

fn default_speech_instructions() -> String {
    "always speak in an animated and inspiring way, ALWAYS in Brazilian Portuguese".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: default_speech_model(),
            voice: default_speech_voice(),
            instructions: default_speech_instructions(),
        }
    }
}

/// WhatsApp gateway (uazapi-compatible) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingConfig {
    /// Overridden by UAZAPI_BASE_URL.
    #[serde(default = "default_messaging_base_url")]
    pub base_url: String,
    /// Default instance token; a non-blank X-Instance-Token header wins. Overridden by UAZAPI_TOKEN.
    pub token: Option<String>,
}

fn default_messaging_base_url() -> String {
    "https://hia-clientes.uazapi.com".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_messaging_base_url(),
            token: None,
        }
    }
}

/// Leads/products backend and CRM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadsConfig {
    /// Overridden by PACLEAD_BASE_URL.
    #[serde(default = "default_leads_base_url")]
    pub base_url: String,
    /// Empty disables CRM mirroring. Overridden by PACLEAD_CRM_BASE_URL.
    #[serde(default = "default_crm_base_url")]
    pub crm_base_url: String,
    /// Tax id (CNPJ) used when the tenant settings do not provide one.
    #[serde(default = "default_tax_id")]
    pub default_tax_id: String,
    /// Product image endpoint; cards link to `<url>?id=<id>&id_empresa=1`.
    #[serde(default = "default_product_image_url")]
    pub product_image_url: String,
}

fn default_leads_base_url() -> String {
    "http://paclead.com.br:8889".to_string()
}

fn default_crm_base_url() -> String {
    "https://paclead.com.br:8082".to_string()
}

fn default_tax_id() -> String {
    "23820015000100".to_string()
}

fn default_product_image_url() -> String {
    "http://paclead.com.br:8889/produtos/imagem".to_string()
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            base_url: default_leads_base_url(),
            crm_base_url: default_crm_base_url(),
            default_tax_id: default_tax_id(),
            product_image_url: default_product_image_url(),
        }
    }
}

/// Platform backend for per-tenant agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    /// When unset, tenant settings are never fetched. Overridden by PLATFORM_BASE_URL.
    pub base_url: Option<String>,
    #[serde(default = "default_platform_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_platform_timeout_secs() -> u64 {
    15
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_platform_timeout_secs(),
        }
    }
}

/// Prompt defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Replaces the embedded sales-agent template. Overridden by DEFAULT_PROMPT.
    pub default_prompt: Option<String>,
}

/// Redis-backed buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfig {
    /// `redis://` connection string. Unset means the no-op buffer. Overridden by REDIS_URL.
    pub redis_url: Option<String>,
    /// Expiry applied to a sender's buffer on every push. 0 disables expiry.
    #[serde(default = "default_buffer_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_buffer_ttl_secs() -> u64 {
    60
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_buffer_ttl_secs(),
        }
    }
}

/// Trimmed, non-empty value or None.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split `host:port` (host may be empty, as in ":8080"). Returns None when the port is invalid.
pub fn parse_listen_addr(addr: &str) -> Option<(Option<String>, u16)> {
    let addr = addr.trim();
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host.trim();
    let host = if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    };
    Some((host, port))
}

/// Apply environment overrides using `lookup` (process env in production, a map in tests).
/// Blank values are ignored so an empty variable never clears a configured value.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| non_blank(lookup(key));

    if let Some(addr) = get("APP_ADDR") {
        match parse_listen_addr(&addr) {
            Some((host, port)) => {
                if let Some(h) = host {
                    config.server.bind = h;
                }
                config.server.port = port;
            }
            None => log::warn!("ignoring invalid APP_ADDR: {}", addr),
        }
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.assistant.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_ASSISTANT_ID") {
        config.assistant.assistant_id = v;
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        config.assistant.base_url = v;
    }
    if let Some(v) = get("UAZAPI_TOKEN") {
        config.messaging.token = Some(v);
    }
    if let Some(v) = get("UAZAPI_BASE_URL") {
        config.messaging.base_url = v;
    }
    if let Some(v) = get("PACLEAD_BASE_URL") {
        config.leads.base_url = v;
    }
    if let Some(v) = get("PACLEAD_CRM_BASE_URL") {
        config.leads.crm_base_url = v;
    }
    if let Some(v) = get("PLATFORM_BASE_URL") {
        config.platform.base_url = Some(v);
    }
    if let Some(v) = get("DEFAULT_PROMPT") {
        config.agent.default_prompt = Some(v);
    }
    if let Some(v) = get("REDIS_URL") {
        config.buffer.redis_url = Some(v);
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PAC_LEAD_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pac-lead").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default path), then apply environment overrides.
/// Missing file => defaults. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}

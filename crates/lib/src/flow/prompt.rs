//! Run instructions: base prompt plus the tenant's customer-context section.

use crate::clients::AgentSettings;

/// Embedded sales-agent template, used when no default prompt is configured.
pub static DEFAULT_PROMPT: &str = include_str!("../../config/default_prompt.md");

const CONTEXT_HEADING: &str = "## Contexto do cliente";

/// Configured default prompt when non-blank, else the embedded template.
pub fn base_prompt(configured: Option<&str>) -> &str {
    configured
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_PROMPT)
}

/// Final instructions for a run.
///
/// A prompt override in the settings replaces `base`. When any of the descriptive fields is
/// present a "Contexto do cliente" section listing only those fields is appended after a blank
/// line. Without settings the result is exactly `base`.
pub fn compose_prompt(base: &str, settings: Option<&AgentSettings>) -> String {
    let Some(settings) = settings else {
        return base.to_string();
    };
    let base = settings.prompt_override().unwrap_or(base);

    let lines: Vec<String> = [
        ("Nome do agente", settings.name()),
        ("Setor/Indústria", settings.sector()),
        ("Estilo de comunicação", settings.communication_style()),
        ("Tipo de perfil", settings.profile_type()),
        ("Instruções personalizadas", settings.custom_instructions()),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| format!("- {}: {}", label, v)))
    .collect();

    if lines.is_empty() {
        return base.to_string();
    }
    format!("{}\n\n{}\n{}", base.trim_end(), CONTEXT_HEADING, lines.join("\n"))
}

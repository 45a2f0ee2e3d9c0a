//! Per-message decision flow: tenant settings, thread, then reply by message kind.

use super::options::DispatchOptions;
use super::products::{find_product_marker, send_products_carousel};
use super::prompt::{base_prompt, compose_prompt};
use super::thread::ensure_thread;
use crate::clients::{
    AgentSettings, AssistantClient, AssistantError, LeadsClient, MessagingClient, PlatformClient,
    PlatformError,
};
use crate::config::Config;
use crate::webhook::IncomingWebhook;
use serde::Serialize;
use std::time::Duration;

pub const SEARCHING_PRODUCTS_TEXT: &str = "Procurando produtos…";
pub const IMAGE_RECEIVED_TEXT: &str = "📸 Recebi a imagem! Vou analisar e já retorno.";

/// Reply shown for message kinds the bridge does not handle.
pub fn unsupported_text(message_type: &str) -> String {
    format!("Tipo de mensagem não suportado ainda: {}", message_type)
}

/// Body echoed to the webhook caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchAck {
    pub ok: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("thread resolution failed: {0}")]
    Thread(#[from] AssistantError),
}

/// Provider type tag, grouped into the branches the dispatcher handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    /// Lower-cased unknown tag.
    Other(String),
}

impl MessageKind {
    pub fn classify(tag: &str) -> Self {
        let tag = tag.trim().to_lowercase();
        match tag.as_str() {
            "text" | "conversation" | "extendedtextmessage" | "templatebuttonreplymessage" => {
                Self::Text
            }
            "image" | "imagemessage" => Self::Image,
            "audio" | "audiomessage" | "ptt" => Self::Audio,
            _ => Self::Other(tag),
        }
    }
}

/// Shared clients and defaults; one per process, cloned into every request task.
#[derive(Clone)]
pub struct Dispatcher {
    assistant: AssistantClient,
    leads: LeadsClient,
    platform: PlatformClient,
    /// Bound to the configured token; per-request tokens derive from it.
    messaging: MessagingClient,
    default_prompt: Option<String>,
    default_tax_id: String,
    product_image_url: String,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self, PlatformError> {
        let http = reqwest::Client::new();
        let platform = PlatformClient::new(
            config.platform.base_url.as_deref(),
            Duration::from_secs(config.platform.timeout_secs),
        )?;
        Ok(Self {
            assistant: AssistantClient::with_client(&config.assistant, http.clone()),
            leads: LeadsClient::with_client(
                &config.leads.base_url,
                &config.leads.crm_base_url,
                http.clone(),
            ),
            platform,
            messaging: MessagingClient::with_client(
                &config.messaging.base_url,
                config.messaging.token.as_deref().unwrap_or_default(),
                http,
            ),
            default_prompt: config.agent.default_prompt.clone(),
            default_tax_id: config.leads.default_tax_id.clone(),
            product_image_url: config.leads.product_image_url.clone(),
        })
    }

    /// Messaging client for this request: a non-blank instance token wins over the configured one.
    fn messaging_for(&self, opts: &DispatchOptions) -> MessagingClient {
        let token = opts.instance_token.trim();
        if token.is_empty() {
            self.messaging.clone()
        } else {
            self.messaging.with_token(token)
        }
    }

    /// Tenant settings, or None when unconfigured, absent or unreachable.
    async fn tenant_settings(&self, opts: &DispatchOptions) -> Option<AgentSettings> {
        if !self.platform.is_configured() {
            return None;
        }
        match self.platform.agent_settings(&opts.org_id, &opts.flow_id).await {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "dispatch: agent settings for org={} flow={} unavailable: {}",
                    opts.org_id,
                    opts.flow_id,
                    e
                );
                None
            }
        }
    }

    /// Handle one inbound message. Only thread resolution failures are returned; every other
    /// downstream failure is logged and the ack is still `ok`.
    pub async fn dispatch(
        &self,
        incoming: &IncomingWebhook,
        opts: &DispatchOptions,
    ) -> Result<DispatchAck, DispatchError> {
        let number = incoming.sender_number();
        if number.is_empty() {
            log::debug!(
                "dispatch: event {} without sender, ignored",
                incoming.event.as_deref().unwrap_or("-")
            );
            return Ok(DispatchAck { ok: true });
        }
        let messaging = self.messaging_for(opts);
        let text = incoming.message.content.trim();
        let kind = MessageKind::classify(&incoming.message.message_type);

        let settings = self.tenant_settings(opts).await;
        let tax_id = settings
            .as_ref()
            .and_then(AgentSettings::tax_id_digits)
            .unwrap_or_else(|| self.default_tax_id.clone());
        let prompt = compose_prompt(
            base_prompt(self.default_prompt.as_deref()),
            settings.as_ref(),
        );

        log::info!(
            "dispatch: {} message from {} (slug={}, instance={})",
            incoming.message.message_type,
            number,
            opts.slug.as_deref().unwrap_or("-"),
            if opts.instance_id.is_empty() { "-" } else { opts.instance_id.as_str() }
        );

        let thread_id = ensure_thread(&self.assistant, &self.leads, number, &tax_id).await?;

        match kind {
            MessageKind::Text => {
                if !text.is_empty() {
                    self.reply_to_text(&messaging, number, text, &tax_id, &thread_id, &prompt)
                        .await;
                }
            }
            MessageKind::Image => {
                if let Err(e) = messaging.send_text(number, IMAGE_RECEIVED_TEXT).await {
                    log::warn!("dispatch: image ack to {} failed: {}", number, e);
                }
            }
            MessageKind::Audio => self.reply_with_audio(&messaging, number, &thread_id).await,
            MessageKind::Other(tag) => {
                if let Err(e) = messaging.send_text(number, &unsupported_text(&tag)).await {
                    log::warn!("dispatch: unsupported-type reply to {} failed: {}", number, e);
                }
            }
        }
        Ok(DispatchAck { ok: true })
    }

    async fn reply_to_text(
        &self,
        messaging: &MessagingClient,
        number: &str,
        text: &str,
        tax_id: &str,
        thread_id: &str,
        prompt: &str,
    ) {
        // The user asked for specific products: answer from the catalog without the assistant.
        if let Some(ids) = find_product_marker(text) {
            if let Err(e) = messaging.send_text(number, SEARCHING_PRODUCTS_TEXT).await {
                log::warn!("dispatch: preamble to {} failed: {}", number, e);
            }
            self.send_carousel(messaging, number, tax_id, &ids).await;
            return;
        }

        if let Err(e) = self.assistant.send_and_run(thread_id, text, prompt).await {
            log::warn!("dispatch: assistant run on {} failed: {}", thread_id, e);
            return;
        }
        let reply = match self.assistant.last_reply_text(thread_id).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("dispatch: reading reply on {} failed: {}", thread_id, e);
                return;
            }
        };
        if reply.trim().is_empty() {
            log::debug!("dispatch: empty assistant reply on {}", thread_id);
            return;
        }

        match find_product_marker(&reply) {
            Some(ids) => self.send_carousel(messaging, number, tax_id, &ids).await,
            None => {
                if let Err(e) = messaging.send_text(number, &reply).await {
                    log::warn!("dispatch: reply to {} failed: {}", number, e);
                }
            }
        }
    }

    async fn send_carousel(
        &self,
        messaging: &MessagingClient,
        number: &str,
        tax_id: &str,
        ids: &[String],
    ) {
        match send_products_carousel(
            &self.leads,
            messaging,
            &self.product_image_url,
            tax_id,
            number,
            ids,
        )
        .await
        {
            Ok(cards) => log::debug!("dispatch: carousel with {} cards to {}", cards, number),
            Err(e) => log::warn!("dispatch: carousel to {} failed: {}", number, e),
        }
    }

    /// Speak the newest assistant reply back to the sender.
    async fn reply_with_audio(&self, messaging: &MessagingClient, number: &str, thread_id: &str) {
        let reply = match self.assistant.last_reply_text(thread_id).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                log::debug!("dispatch: no assistant reply to speak on {}", thread_id);
                return;
            }
            Err(e) => {
                log::warn!("dispatch: reading reply on {} failed: {}", thread_id, e);
                return;
            }
        };
        let audio = match self.assistant.text_to_speech(&reply).await {
            Ok(audio) => audio,
            Err(e) => {
                log::warn!("dispatch: speech synthesis failed: {}", e);
                return;
            }
        };
        if let Err(e) = messaging.send_audio(number, &audio).await {
            log::warn!("dispatch: audio to {} failed: {}", number, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(MessageKind::classify("Conversation"), MessageKind::Text);
        assert_eq!(MessageKind::classify("extendedTextMessage"), MessageKind::Text);
        assert_eq!(MessageKind::classify("TemplateButtonReplyMessage"), MessageKind::Text);
        assert_eq!(MessageKind::classify("imageMessage"), MessageKind::Image);
        assert_eq!(MessageKind::classify("PTT"), MessageKind::Audio);
        assert_eq!(MessageKind::classify("audioMessage"), MessageKind::Audio);
        assert_eq!(
            MessageKind::classify("StickerMessage"),
            MessageKind::Other("stickermessage".to_string())
        );
    }

    #[tokio::test]
    async fn payload_without_sender_is_acked_before_any_lookup() {
        let mut config = Config::default();
        config.leads.base_url = "http://127.0.0.1:9".to_string();
        config.assistant.base_url = "http://127.0.0.1:9".to_string();
        let dispatcher = Dispatcher::new(&config).unwrap();
        let incoming = IncomingWebhook::from_value(&serde_json::json!({ "event": "presence" })).unwrap();
        let ack = dispatcher
            .dispatch(&incoming, &DispatchOptions::default())
            .await
            .unwrap();
        assert_eq!(ack, DispatchAck { ok: true });
    }

    #[test]
    fn unsupported_text_names_type() {
        assert_eq!(
            unsupported_text("video"),
            "Tipo de mensagem não suportado ainda: video"
        );
    }
}

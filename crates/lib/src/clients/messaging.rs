//! WhatsApp gateway client (uazapi-style `/send/*` endpoints, `token` header auth).

use serde::Serialize;
use serde_json::json;

/// One carousel card: text, image and reply buttons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselCard {
    pub text: String,
    pub image: String,
    pub buttons: Vec<CarouselButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselButton {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub typ: String,
}

impl CarouselButton {
    /// Quick-reply button whose id echoes its label back as the user's answer.
    pub fn reply(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: label.clone(),
            text: label,
            typ: "REPLY".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("messaging request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messaging api {path}: status {status}")]
    Status { path: String, status: u16 },
}

/// Client for the outbound messaging gateway of one instance.
#[derive(Clone)]
pub struct MessagingClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl MessagingClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self::with_client(base_url, token, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, token: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    /// Same gateway and connection pool, different instance token.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: token.to_string(),
            client: self.client.clone(),
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<(), MessagingError> {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("token", &self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        let status = res.status().as_u16();
        if status >= 300 {
            return Err(MessagingError::Status {
                path: path.to_string(),
                status,
            });
        }
        Ok(())
    }

    /// POST /send/text
    pub async fn send_text(&self, number: &str, text: &str) -> Result<(), MessagingError> {
        self.post("/send/text", &json!({ "number": number, "text": text }))
            .await
    }

    /// POST /send/carousel: caption `text` above the cards.
    pub async fn send_carousel(
        &self,
        number: &str,
        text: &str,
        cards: &[CarouselCard],
    ) -> Result<(), MessagingError> {
        let body = json!({
            "number": number,
            "text": text,
            "carousel": cards,
            "delay": 0,
            "readchat": true,
        });
        self.post("/send/carousel", &body).await
    }

    /// POST /send/audio: `audio_b64` is the base64-encoded file.
    pub async fn send_audio(&self, number: &str, audio_b64: &str) -> Result<(), MessagingError> {
        let body = json!({
            "number": number,
            "file": audio_b64,
            "type": "audio",
        });
        self.post("/send/audio", &body).await
    }
}

//! Assistants API client (threads, messages, runs) plus text-to-speech.
//! Every request carries the bearer key and the `OpenAI-Beta: assistants=v2` header.

use crate::config::{AssistantConfig, SpeechConfig};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// How many recent messages are scanned for the newest assistant reply.
const RECENT_MESSAGES_LIMIT: u32 = 10;

/// Client for the hosted assistant.
#[derive(Clone)]
pub struct AssistantClient {
    base_url: String,
    api_key: String,
    assistant_id: String,
    poll_interval: Duration,
    run_timeout: Duration,
    speech: SpeechConfig,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("assistant api error: {0}")]
    Api(String),
    #[error("assistant run {run_id} ended with status {status}")]
    RunFailed { run_id: String, status: String },
    #[error("assistant run {0} did not finish in time")]
    RunTimeout(String),
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(rename = "type", default)]
    typ: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct SpeechEnvelope {
    #[serde(default)]
    data: String,
}

impl AssistantClient {
    pub fn new(config: &AssistantConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Build on a shared connection pool.
    pub fn with_client(config: &AssistantConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            assistant_id: config.assistant_id.clone(),
            poll_interval: Duration::from_millis(config.run_poll_interval_ms),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            speech: config.speech.clone(),
            client,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AssistantError::Api(format!("{} {}", status, body)));
        }
        Ok(res)
    }

    /// POST /threads: create an empty thread; returns its id.
    pub async fn create_thread(&self) -> Result<String, AssistantError> {
        let res = self.post("/threads").json(&json!({})).send().await?;
        let data: IdResponse = Self::check(res).await?.json().await?;
        if data.id.is_empty() {
            return Err(AssistantError::Api("thread response without id".to_string()));
        }
        Ok(data.id)
    }

    /// POST /threads/{id}/messages: append a text message with the given role.
    pub async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        text: &str,
    ) -> Result<(), AssistantError> {
        let body = json!({
            "role": role,
            "content": [{ "type": "text", "text": text }],
        });
        let res = self
            .post(&format!("/threads/{}/messages", thread_id))
            .json(&body)
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    /// POST /threads/{id}/runs: start a run; non-blank `instructions` override the assistant's own.
    /// Returns the run id.
    pub async fn create_run(
        &self,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<String, AssistantError> {
        let mut body = json!({ "assistant_id": self.assistant_id });
        if let Some(text) = instructions.filter(|s| !s.trim().is_empty()) {
            body["instructions"] = serde_json::Value::String(text.to_string());
        }
        let res = self
            .post(&format!("/threads/{}/runs", thread_id))
            .json(&body)
            .send()
            .await?;
        let data: RunResponse = Self::check(res).await?.json().await?;
        if data.id.is_empty() {
            return Err(AssistantError::Api("run response without id".to_string()));
        }
        Ok(data.id)
    }

    /// GET /threads/{id}/runs/{run} until the run leaves the queued/in-progress states.
    pub async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let deadline = Instant::now() + self.run_timeout;
        loop {
            let res = self
                .get(&format!("/threads/{}/runs/{}", thread_id, run_id))
                .send()
                .await?;
            let run: RunResponse = Self::check(res).await?.json().await?;
            match run.status.as_str() {
                "completed" => return Ok(()),
                "queued" | "in_progress" => {}
                other => {
                    return Err(AssistantError::RunFailed {
                        run_id: run_id.to_string(),
                        status: other.to_string(),
                    })
                }
            }
            if Instant::now() >= deadline {
                return Err(AssistantError::RunTimeout(run_id.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Post the user's text, start a run with the given instructions and wait for it to finish.
    pub async fn send_and_run(
        &self,
        thread_id: &str,
        text: &str,
        instructions: &str,
    ) -> Result<(), AssistantError> {
        self.create_message(thread_id, "user", text).await?;
        let run_id = self.create_run(thread_id, Some(instructions)).await?;
        self.wait_for_run(thread_id, &run_id).await
    }

    /// Text of the newest assistant message in the thread; empty when there is none.
    pub async fn last_reply_text(&self, thread_id: &str) -> Result<String, AssistantError> {
        let res = self
            .get(&format!("/threads/{}/messages", thread_id))
            .query(&[
                ("order", "desc".to_string()),
                ("limit", RECENT_MESSAGES_LIMIT.to_string()),
            ])
            .send()
            .await?;
        let list: MessageList = Self::check(res).await?.json().await?;
        Ok(newest_assistant_text(&list))
    }

    /// POST /audio/speech: synthesize `text`; returns base64-encoded mp3.
    /// Some gateways answer with JSON `{ "data": "<base64>" }`; raw audio is encoded here.
    pub async fn text_to_speech(&self, text: &str) -> Result<String, AssistantError> {
        let body = json!({
            "model": self.speech.model,
            "input": text,
            "voice": self.speech.voice,
            "response_format": "mp3",
            "instructions": self.speech.instructions,
        });
        let res = self.post("/audio/speech").json(&body).send().await?;
        let bytes = Self::check(res).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(AssistantError::Api("empty speech response".to_string()));
        }
        Ok(speech_payload_to_base64(&bytes))
    }
}

fn newest_assistant_text(list: &MessageList) -> String {
    list.data
        .iter()
        .find(|m| m.role == "assistant")
        .and_then(|m| {
            m.content
                .iter()
                .find(|c| c.typ == "text")
                .and_then(|c| c.text.as_ref())
        })
        .map(|t| t.value.clone())
        .unwrap_or_default()
}

fn speech_payload_to_base64(bytes: &[u8]) -> String {
    if bytes.first() == Some(&b'{') {
        if let Ok(env) = serde_json::from_slice::<SpeechEnvelope>(bytes) {
            if !env.data.is_empty() {
                return env.data;
            }
        }
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> AssistantClient {
        let config = AssistantConfig {
            api_key: Some("sk-test".to_string()),
            assistant_id: "asst_1".to_string(),
            base_url: server.url(),
            run_poll_interval_ms: 1,
            run_timeout_secs: 5,
            ..AssistantConfig::default()
        };
        AssistantClient::new(&config)
    }

    #[test]
    fn newest_assistant_text_skips_user_messages() {
        let list: MessageList = serde_json::from_value(json!({
            "data": [
                { "role": "user", "content": [{ "type": "text", "text": { "value": "oi" } }] },
                { "role": "assistant", "content": [{ "type": "text", "text": { "value": "Olá!" } }] }
            ]
        }))
        .unwrap();
        assert_eq!(newest_assistant_text(&list), "Olá!");
    }

    #[test]
    fn speech_json_envelope_is_passed_through() {
        assert_eq!(speech_payload_to_base64(br#"{"data":"QUJD"}"#), "QUJD");
        assert_eq!(speech_payload_to_base64(b"ID3abc"), "SUQzYWJj");
    }

    #[tokio::test]
    async fn create_thread_sends_auth_and_beta_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/threads")
            .match_header("authorization", "Bearer sk-test")
            .match_header("openai-beta", "assistants=v2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"thread_abc"}"#)
            .create_async()
            .await;

        let id = client_for(&server).create_thread().await.unwrap();
        assert_eq!(id, "thread_abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_thread_error_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/threads")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let err = client_for(&server).create_thread().await.unwrap_err();
        assert!(matches!(err, AssistantError::Api(_)));
    }

    #[tokio::test]
    async fn run_without_instructions_omits_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/threads/t1/runs")
            .match_body(Matcher::Json(json!({ "assistant_id": "asst_1" })))
            .with_status(200)
            .with_body(r#"{"id":"run_1","status":"queued"}"#)
            .create_async()
            .await;

        let run = client_for(&server).create_run("t1", Some("  ")).await.unwrap();
        assert_eq!(run, "run_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_run_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/threads/t1/runs/run_1")
            .with_status(200)
            .with_body(r#"{"id":"run_1","status":"failed"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .wait_for_run("t1", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::RunFailed { ref status, .. } if status == "failed"));
    }
}

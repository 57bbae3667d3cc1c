//! Vision-language inference client.
//!
//! Provides an `Annotator` trait with one HTTP implementation, [`VlmClient`],
//! which speaks the chat-completions request shape:
//! - **grid mode**: one contact-sheet image per request (preferred)
//! - **sequence mode**: up to [`MAX_SEQUENCE_IMAGES`] individual frames
//!
//! Transport failures are retried with a fixed delay. Once retries are spent,
//! or when the reply cannot be parsed, the call degrades to an empty result
//! instead of failing.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use uuid::Uuid;

use crate::config::InferenceConfig;
use crate::frames::{EncodedFrame, FrameGrid};
use crate::models::{AnnotationOutcome, DegradeReason};
use crate::prompt::{build_user_prompt, FrameLayout, PromptContext, SYSTEM_PROMPT};
use crate::response::parse_or_degrade;

/// Upper bound on images sent in sequence mode.
pub const MAX_SEQUENCE_IMAGES: usize = 12;

// ============================================================================
// Annotator trait
// ============================================================================

/// Abstraction over annotation providers.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Annotate one episode. Never fails: problems come back as
    /// [`AnnotationOutcome::Degraded`].
    async fn annotate(&self, input: &VisualInput, context: &EpisodeContext) -> AnnotationOutcome;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Frames in the form they are sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualInput {
    Grid(FrameGrid),
    Sequence(Vec<EncodedFrame>),
}

impl VisualInput {
    pub fn is_empty(&self) -> bool {
        match self {
            VisualInput::Grid(grid) => grid.is_empty(),
            VisualInput::Sequence(frames) => frames.is_empty(),
        }
    }

    /// Timestamps of the images actually sent, in order.
    pub fn timestamps(&self) -> Vec<f64> {
        match self {
            VisualInput::Grid(grid) => grid.timestamps.clone(),
            VisualInput::Sequence(frames) => frames
                .iter()
                .take(MAX_SEQUENCE_IMAGES)
                .map(|f| f.timestamp)
                .collect(),
        }
    }

    pub fn layout(&self) -> FrameLayout {
        match self {
            VisualInput::Grid(_) => FrameLayout::Grid,
            VisualInput::Sequence(_) => FrameLayout::Sequence,
        }
    }
}

/// Per-episode facts the prompt is built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpisodeContext {
    pub duration_secs: f64,
    pub task: Option<String>,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing inference endpoint URL")]
    MissingEndpoint,
}

// ============================================================================
// Chat API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    enable_thinking: bool,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    System { content: &'a str },
    User { content: Vec<ContentPart> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg))
}

// ============================================================================
// VlmClient
// ============================================================================

/// HTTP client for a chat-completions style multimodal endpoint.
#[derive(Debug, Clone)]
pub struct VlmClient {
    client: Client,
    config: InferenceConfig,
}

impl VlmClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        if config.api_url.is_empty() {
            return Err(InferenceError::MissingEndpoint);
        }

        // Timeouts are set per request, they differ between modes.
        let client = Client::builder().build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Send one prompt with images, retrying transport failures.
    /// Returns the raw message text of the first successful reply.
    pub async fn complete(
        &self,
        user_prompt: &str,
        images: Vec<String>,
        timeout: Duration,
    ) -> Result<String, InferenceError> {
        let mut content = Vec::with_capacity(images.len() + 1);
        content.push(ContentPart::Text {
            text: user_prompt.to_string(),
        });
        content.extend(images.into_iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        }));

        let request = ChatRequest {
            model: self.config.model.as_deref(),
            messages: vec![
                ChatMessage::System {
                    content: SYSTEM_PROMPT,
                },
                ChatMessage::User { content },
            ],
            enable_thinking: self.config.enable_thinking,
            temperature: self.config.temperature,
        };

        let max_attempts = self.config.max_retries.max(1);
        let retry_strategy =
            FixedInterval::from_millis(self.config.retry_delay_ms).take(max_attempts - 1);
        let attempt = AtomicUsize::new(0);

        Retry::spawn(retry_strategy, || {
            self.attempt_once(&request, timeout, &attempt, max_attempts)
        })
        .await
    }

    async fn attempt_once(
        &self,
        request: &ChatRequest<'_>,
        timeout: Duration,
        attempt: &AtomicUsize,
        max_attempts: usize,
    ) -> Result<String, InferenceError> {
        let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.send_once(request, timeout).await;
        if let Err(e) = &result {
            tracing::warn!(attempt = n, max_attempts, error = %e, "VLM request failed");
        }
        result
    }

    async fn send_once(
        &self,
        request: &ChatRequest<'_>,
        timeout: Duration,
    ) -> Result<String, InferenceError> {
        let request_id = Uuid::new_v4().to_string();

        let mut builder = self
            .client
            .post(&self.config.api_url)
            .timeout(timeout)
            .header(self.config.request_id_header.as_str(), request_id.as_str())
            .json(request);

        if !self.config.api_token.is_empty() {
            builder = builder.header(
                self.config.token_header.as_str(),
                format!("{}{}", self.config.token_prefix, self.config.api_token),
            );
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(
                code = status.as_u16(),
                request_id = %request_id,
                message = %message,
                "VLM API error"
            );
            return Err(InferenceError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;

        // A reply without content is handed to the parser as empty text.
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Annotator for VlmClient {
    async fn annotate(&self, input: &VisualInput, context: &EpisodeContext) -> AnnotationOutcome {
        if input.is_empty() {
            return AnnotationOutcome::degraded(DegradeReason::NoFrames, None);
        }

        let timestamps = input.timestamps();
        let prompt = build_user_prompt(&PromptContext {
            duration_secs: context.duration_secs,
            timestamps: &timestamps,
            task: context.task.as_deref(),
            layout: input.layout(),
        });

        let (images, timeout) = match input {
            VisualInput::Grid(grid) => (
                vec![jpeg_data_url(&grid.image)],
                Duration::from_secs(self.config.single_image_timeout_secs),
            ),
            VisualInput::Sequence(frames) => (
                frames
                    .iter()
                    .take(MAX_SEQUENCE_IMAGES)
                    .map(|f| jpeg_data_url(&f.jpeg))
                    .collect(),
                Duration::from_secs(self.config.multi_image_timeout_secs),
            ),
        };

        match self.complete(&prompt, images, timeout).await {
            Ok(text) => parse_or_degrade(&text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All VLM retry attempts failed"
                );
                AnnotationOutcome::degraded(
                    DegradeReason::Transport {
                        attempts: self.config.max_retries.max(1),
                        last_error: e.to_string(),
                    },
                    None,
                )
            }
        }
    }

    fn name(&self) -> &str {
        "vlm-http"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::annotation::PARSE_FAILURE_MESSAGE;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> InferenceConfig {
        InferenceConfig {
            api_url: format!("{}/v1/chat/completions", server.uri()),
            api_token: "test-token".to_string(),
            max_retries: 3,
            retry_delay_ms: 10,
            ..InferenceConfig::default()
        }
    }

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    fn grid_input() -> VisualInput {
        VisualInput::Grid(FrameGrid {
            timestamps: vec![0.0, 2.0, 4.0],
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    fn context() -> EpisodeContext {
        EpisodeContext {
            duration_secs: 12.0,
            task: Some("straighten paper cups".to_string()),
        }
    }

    const ANNOTATION: &str = r#"{"actions":[{"start_time":0,"end_time":5.5,"description":"右臂扶正纸杯","description_en":"Right arm straightens the cup"}],"task_summary":"扶正纸杯","task_summary_en":"Straighten cups"}"#;

    #[tokio::test]
    async fn test_annotate_sends_chat_request_and_parses_reply() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-token"))
            .and(header_exists("x-request-id"))
            .and(body_partial_json(serde_json::json!({
                "temperature": 0.3,
                "enable_thinking": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = client.annotate(&grid_input(), &context()).await;

        match outcome {
            AnnotationOutcome::Annotated(result) => {
                assert_eq!(result.actions.len(), 1);
                assert_eq!(result.actions[0].end_time, 5.5);
                assert_eq!(result.task_summary_en, "Straighten cups");
            }
            other => panic!("Expected Annotated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grid_request_carries_prompt_and_single_image() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .mount(&mock_server)
            .await;

        client.annotate(&grid_input(), &context()).await;

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["messages"][1]["content"].as_array().unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.contains("0.0s, 2.0s, 4.0s"));
        assert!(text.contains("straighten paper cups"));
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn test_sequence_mode_caps_images() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .mount(&mock_server)
            .await;

        let frames: Vec<EncodedFrame> = (0..20)
            .map(|i| EncodedFrame {
                timestamp: i as f64,
                jpeg: vec![0xFF, 0xD8, i as u8],
            })
            .collect();
        let outcome = client
            .annotate(&VisualInput::Sequence(frames), &context())
            .await;
        assert!(!outcome.is_degraded());

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1 + MAX_SEQUENCE_IMAGES);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_recovered() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();
        let fenced = format!("Sure!\n```json\n{}\n```", ANNOTATION);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&fenced)))
            .mount(&mock_server)
            .await;

        let outcome = client.annotate(&grid_input(), &context()).await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.result().actions.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_with_last_error() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let outcome = client.annotate(&grid_input(), &context()).await;

        match outcome {
            AnnotationOutcome::Degraded {
                reason: DegradeReason::Transport { attempts, last_error },
                partial,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("500"));
                assert!(last_error.contains("upstream exploded"));
                assert!(partial.actions.is_empty());
                assert_eq!(partial.task_summary, "");
                assert_eq!(partial.error.as_deref(), Some(last_error.as_str()));
            }
            other => panic!("Expected transport degradation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .mount(&mock_server)
            .await;

        let outcome = client.annotate(&grid_input(), &context()).await;
        assert!(!outcome.is_degraded(), "Expected success after retry");
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_attempt_gets_a_fresh_request_id() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        client.annotate(&grid_input(), &context()).await;

        let requests = mock_server.received_requests().await.unwrap();
        let ids: Vec<String> = requests
            .iter()
            .map(|r| r.headers.get("x-request-id").unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_not_retried() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_reply("I see two robot arms.")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = client.annotate(&grid_input(), &context()).await;

        match outcome {
            AnnotationOutcome::Degraded {
                reason: DegradeReason::Unparseable,
                partial,
            } => {
                assert_eq!(partial.error.as_deref(), Some(PARSE_FAILURE_MESSAGE));
                assert_eq!(partial.raw_response.as_deref(), Some("I see two robot arms."));
            }
            other => panic!("Expected parse degradation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_skips_the_network() {
        let mock_server = MockServer::start().await;
        let client = VlmClient::new(test_config(&mock_server)).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let outcome = client
            .annotate(&VisualInput::Grid(FrameGrid::default()), &context())
            .await;
        assert!(matches!(
            outcome,
            AnnotationOutcome::Degraded {
                reason: DegradeReason::NoFrames,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_rejected() {
        let result = VlmClient::new(InferenceConfig::default());
        assert!(matches!(result, Err(InferenceError::MissingEndpoint)));
    }

    #[tokio::test]
    async fn test_model_name_is_forwarded_when_configured() {
        let mock_server = MockServer::start().await;
        let config = InferenceConfig {
            model: Some("qwen-vl-max".to_string()),
            ..test_config(&mock_server)
        };
        let client = VlmClient::new(config).unwrap();

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "model": "qwen-vl-max" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(ANNOTATION)))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(!client.annotate(&grid_input(), &context()).await.is_degraded());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Streams `/chat/completions` responses and maps both the legacy
//! `function_call` deltas and `tool_calls` deltas onto [`StreamDelta`].

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result, SlaickError};
use crate::llm::message::{ContentPart, Message, Role};
use crate::llm::provider::{
    CompletionProvider, CompletionRequest, DeltaStream, FunctionDefinition, ModelInfo,
    StreamDelta, DEFAULT_CONTEXT_WINDOW,
};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Text sent in place of an image for models without vision
const IMAGE_OMITTED_NOTE: &str = "(an image was attached but this model cannot view images)";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    organization: Option<String>,
    context_window: Option<u32>,
}

impl OpenAiProvider {
    /// Create a new provider against the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_BASE)
    }

    /// Create with a custom base URL (proxies, Azure-style gateways, tests)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            organization: None,
            context_window: None,
        }
    }

    /// Send an `OpenAI-Organization` header
    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    /// Override the context window for every model
    pub fn with_context_window(mut self, context_window: Option<u32>) -> Self {
        self.context_window = context_window;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert internal messages to the wire format
    fn convert_messages(&self, messages: &[Message], vision: bool) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|msg| {
                let has_images = msg.image_count() > 0;
                let content = if msg.function_call.is_some() && msg.content.is_empty() {
                    None
                } else if has_images && msg.role == Role::User {
                    Some(WireContent::Parts(convert_parts(&msg.content, vision)))
                } else {
                    Some(WireContent::Text(msg.text()))
                };

                WireMessage {
                    role: msg.role.to_string(),
                    content,
                    name: msg.name.clone(),
                    function_call: msg.function_call.as_ref().map(|call| WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    }),
                }
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest) -> WireRequest {
        let vision = self.supports_vision(&request.model);
        WireRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages, vision),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            user: request.user.clone(),
            functions: if request.functions.is_empty() {
                None
            } else {
                Some(request.functions.clone())
            },
            stream: true,
        }
    }

    /// Parse an error response
    fn parse_error(status: u16, retry_after: Option<u32>, body: &str) -> SlaickError {
        if status == 401 {
            return ApiError::AuthenticationFailed.into();
        }
        if status == 429 {
            return ApiError::RateLimited(retry_after.unwrap_or(60)).into();
        }

        let Ok(error_response) = serde_json::from_str::<WireError>(body) else {
            return ApiError::ServerError {
                status,
                message: body.to_string(),
            }
            .into();
        };

        let message = error_response.error.message;
        match error_response.error.code.as_deref().unwrap_or("") {
            "invalid_api_key" => ApiError::AuthenticationFailed.into(),
            "rate_limit_exceeded" => ApiError::RateLimited(retry_after.unwrap_or(60)).into(),
            "context_length_exceeded" => {
                let (current, limit) = parse_token_counts(&message);
                ApiError::ContextTooLong { current, limit }.into()
            }
            "model_not_found" => ApiError::ModelNotFound(message).into(),
            _ => ApiError::ServerError { status, message }.into(),
        }
    }
}

fn convert_parts(parts: &[ContentPart], vision: bool) -> Vec<WirePart> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => WirePart::Text { text: text.clone() },
            ContentPart::Image { data, mime_type } if vision => WirePart::ImageUrl {
                image_url: WireImageUrl {
                    url: format!(
                        "data:{};base64,{}",
                        mime_type,
                        base64::engine::general_purpose::STANDARD.encode(data)
                    ),
                },
            },
            ContentPart::Image { .. } => WirePart::Text {
                text: IMAGE_OMITTED_NOTE.to_string(),
            },
        })
        .collect()
}

/// Parse token counts from an error message
fn parse_token_counts(message: &str) -> (u32, u32) {
    let numbers: Vec<u32> = message
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();

    // "maximum context length is 8192 tokens. However, your messages resulted in 9000 tokens"
    match numbers.as_slice() {
        [limit, current, ..] => (*current, *limit),
        [single] => (0, *single),
        _ => (0, 0),
    }
}

/// Incremental decoder for the `data:` lines of a completion stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Undecoded bytes; a line is only decoded once its `\n` has arrived
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return every complete delta they finish
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<Result<StreamDelta>> {
        self.buffer.extend_from_slice(chunk.as_ref());
        let mut deltas = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim();

            if self.done || line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };

            if data == "[DONE]" {
                self.done = true;
                continue;
            }

            match serde_json::from_str::<WireStreamChunk>(data) {
                Ok(chunk) => deltas.extend(chunk_deltas(chunk).into_iter().map(Ok)),
                Err(e) => deltas.push(Err(ApiError::StreamError(format!(
                    "malformed stream chunk: {}",
                    e
                ))
                .into())),
            }
        }

        deltas
    }
}

fn chunk_deltas(chunk: WireStreamChunk) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };
    let delta = choice.delta;

    if let Some(call) = delta.function_call {
        deltas.push(StreamDelta::FunctionCall {
            name: call.name,
            arguments: call.arguments,
        });
    }

    // Only the first tool call is followed; the bot runs one function per turn.
    for tool_call in delta.tool_calls.unwrap_or_default() {
        if tool_call.index.unwrap_or(0) != 0 {
            continue;
        }
        if let Some(function) = tool_call.function {
            deltas.push(StreamDelta::FunctionCall {
                name: function.name,
                arguments: function.arguments,
            });
        }
    }

    if let Some(text) = delta.content {
        if !text.is_empty() {
            deltas.push(StreamDelta::Content(text));
        }
    }

    deltas
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            model("gpt-4o", "GPT-4o", 128_000, 16_384, true),
            model("gpt-4o-mini", "GPT-4o mini", 128_000, 16_384, true),
            model("gpt-4-turbo", "GPT-4 Turbo", 128_000, 4_096, true),
            model("gpt-4", "GPT-4", 8_192, 8_192, false),
            model("gpt-4-32k", "GPT-4 32K", 32_768, 8_192, false),
            model("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, 4_096, false),
        ]
    }

    fn max_input_tokens(&self, model: &str) -> u32 {
        if let Some(window) = self.context_window {
            return window;
        }
        self.get_model_info(model)
            .map(|m| m.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    fn count_tokens(&self, text: &str, _model: &str) -> Result<u32> {
        // Simple approximation: ~4 characters per token for English
        Ok((text.len() as f64 / 4.0).ceil() as u32)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let body = self.build_request(&request);

        let mut req = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("Content-Type", "application/json")
            .timeout(request.timeout);

        if let Some(ref organization) = self.organization {
            req = req.header("OpenAI-Organization", organization);
        }

        tracing::debug!(
            target: "slaick.llm.openai",
            model = %body.model,
            messages = body.messages.len(),
            functions = request.functions.len(),
            "opening completion stream"
        );

        let response = req.json(&body).send().await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, retry_after, &body));
        }

        let delta_stream = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, result| {
                let deltas = match result {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => vec![Err(ApiError::StreamError(e.to_string()).into())],
                };
                futures::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(delta_stream))
    }
}

fn model(
    id: &str,
    display_name: &str,
    context_window: u32,
    max_output_tokens: u32,
    supports_vision: bool,
) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        display_name: display_name.to_string(),
        context_window,
        max_output_tokens,
        supports_functions: true,
        supports_vision,
    }
}

// Wire types (OpenAI chat completions format)

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<FunctionDefinition>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireStreamDelta {
    content: Option<String>,
    function_call: Option<WireStreamFunction>,
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: Option<usize>,
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::FunctionCall;

    #[test]
    fn test_provider_name_and_models() {
        let provider = OpenAiProvider::new("sk-test");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.max_input_tokens("gpt-4"), 8_192);
        assert_eq!(provider.max_input_tokens("some-new-model"), DEFAULT_CONTEXT_WINDOW);
        assert!(provider.supports_vision("gpt-4o"));
        assert!(!provider.supports_vision("gpt-3.5-turbo"));
    }

    #[test]
    fn test_context_window_override() {
        let provider = OpenAiProvider::new("sk-test").with_context_window(Some(4_000));
        assert_eq!(provider.max_input_tokens("gpt-4o"), 4_000);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAiProvider::with_base_url("k", "http://localhost:1234/v1/");
        assert_eq!(
            provider.completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_basic() {
        let provider = OpenAiProvider::new("k");
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![Message::system("sys"), Message::user("hello")],
        )
        .with_user(Some("U1".to_string()));

        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["user"], "U1");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json.get("functions").is_none());
    }

    #[test]
    fn test_build_request_function_messages() {
        let provider = OpenAiProvider::new("k");
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::assistant_function_call(FunctionCall::new("lookup", "{\"q\":1}")),
                Message::function_result("lookup", "42"),
            ],
        )
        .with_functions(vec![FunctionDefinition {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }]);

        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert!(json["messages"][0]["content"].is_null());
        assert_eq!(json["messages"][0]["function_call"]["name"], "lookup");
        assert_eq!(json["messages"][1]["role"], "function");
        assert_eq!(json["messages"][1]["name"], "lookup");
        assert_eq!(json["functions"][0]["name"], "lookup");
    }

    #[test]
    fn test_images_become_data_urls_with_vision() {
        let provider = OpenAiProvider::new("k");
        let message = Message::user_parts(vec![
            ContentPart::text("look"),
            ContentPart::image(vec![1, 2, 3], "image/png"),
        ]);
        let request = CompletionRequest::new("gpt-4o", vec![message]);
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_images_replaced_without_vision() {
        let provider = OpenAiProvider::new("k");
        let message = Message::user_parts(vec![ContentPart::image(vec![1], "image/png")]);
        let request = CompletionRequest::new("gpt-4", vec![message]);
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], IMAGE_OMITTED_NOTE);
    }

    #[test]
    fn test_parse_error_authentication() {
        let err = OpenAiProvider::parse_error(401, None, "{}");
        assert!(matches!(err, SlaickError::Api(ApiError::AuthenticationFailed)));
    }

    #[test]
    fn test_parse_error_rate_limit_uses_retry_after() {
        let err = OpenAiProvider::parse_error(429, Some(7), "{}");
        assert!(matches!(err, SlaickError::Api(ApiError::RateLimited(7))));
    }

    #[test]
    fn test_parse_error_context_too_long() {
        let body = r#"{"error":{"message":"This model's maximum context length is 8192 tokens. However, your messages resulted in 9000 tokens.","code":"context_length_exceeded"}}"#;
        let err = OpenAiProvider::parse_error(400, None, body);
        match err {
            SlaickError::Api(ApiError::ContextTooLong { current, limit }) => {
                assert_eq!(current, 9000);
                assert_eq!(limit, 8192);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_unstructured_body() {
        let err = OpenAiProvider::parse_error(502, None, "bad gateway");
        assert!(matches!(
            err,
            SlaickError::Api(ApiError::ServerError { status: 502, .. })
        ));
    }

    #[test]
    fn test_sse_decoder_content_across_chunks() {
        let mut decoder = SseDecoder::new();
        let first = decoder.push("data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());

        let second = decoder.push("lo\"}}]}\n\ndata: [DONE]\n\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].as_ref().unwrap(), &StreamDelta::content("Hello"));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_sse_decoder_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"日本\"}}]}\n\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xE6).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&line[..cut]).is_empty());
        let deltas = decoder.push(&line[cut..]);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap(), &StreamDelta::content("日本"));
    }

    #[test]
    fn test_sse_decoder_function_call_deltas() {
        let mut decoder = SseDecoder::new();
        let deltas = decoder.push(concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":null,\"function_call\":{\"name\":\"lookup\",\"arguments\":\"\"}}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"{}\"}}}]}\n",
        ));
        assert_eq!(deltas.len(), 2);
        assert_eq!(
            deltas[0].as_ref().unwrap(),
            &StreamDelta::FunctionCall {
                name: Some("lookup".to_string()),
                arguments: Some(String::new()),
            }
        );
    }

    #[test]
    fn test_sse_decoder_tool_calls_first_index_only() {
        let mut decoder = SseDecoder::new();
        let deltas = decoder.push(concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"a\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"name\":\"b\"}}]}}]}\n",
        ));
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_sse_decoder_skips_comments_and_role_only_chunks() {
        let mut decoder = SseDecoder::new();
        let deltas = decoder.push(concat!(
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
        ));
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_sse_decoder_malformed_chunk() {
        let mut decoder = SseDecoder::new();
        let deltas = decoder.push("data: {not json}\n");
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].is_err());
    }
}

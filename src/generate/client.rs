//! Language-model client.
//!
//! Two endpoint conventions are supported: chat completions (a `messages`
//! array in, `choices[].message.content` out) and the responses API (an
//! `input` array in, `output_text` or `output[].content[]` out). The
//! convention is picked from the endpoint URL; callers only ever see the
//! normalised text.

use std::sync::{Arc, LazyLock};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::ModelConfig;
use crate::errors::{JobError, JobResult};
use crate::store::TokenUsage;
use crate::util::{clip_chars, strip_code_fence};

static RESPONSES_ENDPOINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/v1/responses/?$").unwrap());

static MAX_COMPLETION_MODEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^gpt-5").unwrap());

const BODY_PREVIEW_CHARS: usize = 500;

/// Request/response convention of the configured endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    Chat,
    Responses,
}

impl ApiStyle {
    pub fn detect(api_url: &str) -> Self {
        if RESPONSES_ENDPOINT.is_match(api_url) {
            Self::Responses
        } else {
            Self::Chat
        }
    }
}

/// Per-call overrides. The repair call uses both.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model_override: Option<String>,
    pub response_format_override: Option<String>,
}

/// Normalised output of one successful model call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub content: String,
    pub usage: TokenUsage,
    pub model_used: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerateOptions,
    ) -> JobResult<Generation>;
}

/// Raw HTTP exchange with the model endpoint.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> anyhow::Result<TransportResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> anyhow::Result<TransportResponse> {
        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await
            .context("Failed to reach model endpoint")?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .context("Failed to read model response body")?;
        Ok(TransportResponse { status, body })
    }
}

// ── Response shapes ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ModelResponse {
    model: Option<String>,
    output_text: Option<Value>,
    output: Option<Vec<OutputItem>>,
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    content: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<MessageContent>,
}

/// Chat content is either a plain string or a list of typed parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<Value>,
}

impl ContentPart {
    fn text(&self) -> Option<&str> {
        self.text.as_ref().and_then(Value::as_str)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl Usage {
    fn normalize(&self) -> TokenUsage {
        let prompt = self.prompt_tokens.or(self.input_tokens).unwrap_or(0);
        let completion = self.completion_tokens.or(self.output_tokens).unwrap_or(0);
        TokenUsage {
            prompt,
            completion,
            total: self.total_tokens.unwrap_or(prompt + completion),
        }
    }
}

/// Text of a decoded response body, or `None` when the model produced
/// nothing usable.
fn extract_content(style: ApiStyle, data: &ModelResponse) -> Option<String> {
    if style == ApiStyle::Responses
        && let Some(text) = responses_text(data)
    {
        return Some(text);
    }
    let content = data
        .choices
        .as_ref()?
        .first()?
        .message
        .as_ref()?
        .content
        .as_ref()?;
    let text = match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter(|p| p.kind.as_deref() == Some("text") || p.text().is_some())
            .map(|p| p.text().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        MessageContent::Other(_) => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

fn responses_text(data: &ModelResponse) -> Option<String> {
    if let Some(text) = data.output_text.as_ref().and_then(Value::as_str)
        && !text.trim().is_empty()
    {
        return Some(text.trim().to_string());
    }
    let joined = data
        .output
        .iter()
        .flatten()
        .flat_map(|item| item.content.iter().flatten())
        .filter_map(ContentPart::text)
        .collect::<Vec<_>>()
        .join("\n");
    let joined = joined.trim();
    (!joined.is_empty()).then(|| joined.to_string())
}

/// Build the request body for `style`.
pub fn build_payload(
    style: ApiStyle,
    config: &ModelConfig,
    model: &str,
    response_format: Option<&str>,
    system_prompt: &str,
    user_prompt: &str,
) -> Value {
    let messages = json!([
        { "role": "system", "content": system_prompt },
        { "role": "user", "content": user_prompt },
    ]);
    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    match style {
        ApiStyle::Responses => body.insert("input".into(), messages),
        ApiStyle::Chat => body.insert("messages".into(), messages),
    };

    if let Some(temperature) = config.temperature.filter(|t| t.is_finite()) {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(effort) = config.reasoning_effort.as_deref().filter(|e| !e.is_empty()) {
        body.insert("reasoning".into(), json!({ "effort": effort }));
    }
    if let Some(format) = response_format.map(str::trim).filter(|f| !f.is_empty()) {
        match style {
            ApiStyle::Responses => {
                body.insert("text".into(), json!({ "format": responses_format(format) }));
            }
            ApiStyle::Chat => {
                body.insert("response_format".into(), json!({ "type": format }));
            }
        }
    }
    if let Some(max) = config.max_tokens.filter(|m| *m > 0) {
        let key = match style {
            ApiStyle::Responses => "max_output_tokens",
            ApiStyle::Chat
                if config.use_max_completion_tokens || MAX_COMPLETION_MODEL.is_match(model) =>
            {
                "max_completion_tokens"
            }
            ApiStyle::Chat => "max_tokens",
        };
        body.insert(key.into(), json!(max));
    }
    Value::Object(body)
}

/// `text.format` accepts a JSON object verbatim or a bare type name.
fn responses_format(raw: &str) -> Value {
    if raw.starts_with('{')
        && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw)
    {
        return value;
    }
    json!({ "type": raw })
}

/// Generation client for one configured endpoint.
pub struct GenerationClient<T: ModelTransport = HttpTransport> {
    config: ModelConfig,
    style: ApiStyle,
    transport: Arc<T>,
}

impl GenerationClient<HttpTransport> {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }
}

impl<T: ModelTransport> GenerationClient<T> {
    pub fn with_transport(config: &ModelConfig, transport: Arc<T>) -> Self {
        Self {
            style: ApiStyle::detect(&config.api_url),
            config: config.clone(),
            transport,
        }
    }

    pub fn style(&self) -> ApiStyle {
        self.style
    }

    /// One request/response exchange. `Ok(None)` means the call succeeded
    /// but carried no text.
    async fn call_once(
        &self,
        model: &str,
        response_format: Option<&str>,
        system_prompt: &str,
        user_prompt: &str,
    ) -> JobResult<(Option<String>, TokenUsage, String)> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| JobError::Validation("Missing OPENAI_API_KEY".to_string()))?;
        let payload = build_payload(
            self.style,
            &self.config,
            model,
            response_format,
            system_prompt,
            user_prompt,
        );

        let request = self.transport.post_json(&self.config.api_url, api_key, &payload);
        let response = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| JobError::Timeout(limit))?,
            None => request.await,
        }
        .map_err(|e| JobError::Generation(format!("model request failed: {:#}", e)))?;

        if !(200..300).contains(&response.status) {
            return Err(JobError::Generation(format!(
                "model endpoint error: {} {}",
                response.status,
                clip_chars(&response.body, BODY_PREVIEW_CHARS)
            )));
        }

        let data: ModelResponse = serde_json::from_str(&response.body).map_err(|e| {
            JobError::Generation(format!(
                "model endpoint returned invalid JSON: {}. Preview: {}",
                e,
                clip_chars(&response.body, BODY_PREVIEW_CHARS)
            ))
        })?;
        let usage = data.usage.as_ref().map(Usage::normalize).unwrap_or_default();
        let model_used = data.model.clone().unwrap_or_else(|| model.to_string());

        let content = extract_content(self.style, &data);
        if content.is_none() {
            let finish_reason = data
                .choices
                .as_ref()
                .and_then(|c| c.first())
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("unknown");
            tracing::warn!(finish_reason, model, "model returned empty content");
            if self.config.log_response {
                tracing::warn!(body = %response.body, "full model response");
            }
        }
        Ok((content, usage, model_used))
    }

    fn fallback_for(&self, model: &str, options: &GenerateOptions) -> Option<&str> {
        if options.model_override.is_some() || !self.config.allow_fallback {
            return None;
        }
        self.config
            .fallback_model
            .as_deref()
            .filter(|fallback| !fallback.is_empty() && *fallback != model)
    }
}

#[async_trait]
impl<T: ModelTransport + 'static> Generator for GenerationClient<T> {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerateOptions,
    ) -> JobResult<Generation> {
        let model = options
            .model_override
            .as_deref()
            .unwrap_or(&self.config.model);
        let response_format = options
            .response_format_override
            .as_deref()
            .or(self.config.response_format.as_deref());

        let (content, mut usage, mut model_used) = self
            .call_once(model, response_format, system_prompt, user_prompt)
            .await?;

        let content = match content {
            Some(content) => content,
            None => {
                let Some(fallback) = self.fallback_for(model, options) else {
                    return Err(JobError::Generation(
                        "model returned empty content".to_string(),
                    ));
                };
                tracing::warn!(model = fallback, "retrying with fallback model");
                // The retry carries only the model change; the format comes from config.
                let (retry, retry_usage, retry_model) = self
                    .call_once(
                        fallback,
                        self.config.response_format.as_deref(),
                        system_prompt,
                        user_prompt,
                    )
                    .await?;
                usage.add(&retry_usage);
                model_used = retry_model;
                retry.ok_or_else(|| {
                    JobError::Generation("model returned empty content".to_string())
                })?
            }
        };

        Ok(Generation {
            content: strip_code_fence(&content),
            usage,
            model_used,
        })
    }
}

/// Wall-clock limit applied to one model call, for logging.
pub fn describe_timeout(config: &ModelConfig) -> String {
    match config.timeout() {
        Some(limit) => format!("{}ms", limit.as_millis()),
        None => "none".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Transport replaying scripted responses and recording request bodies.
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub responses: Mutex<VecDeque<TransportResponse>>,
        pub requests: Mutex<Vec<Value>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedTransport {
        pub fn new(bodies: &[Value]) -> Self {
            Self {
                responses: Mutex::new(
                    bodies
                        .iter()
                        .map(|b| TransportResponse {
                            status: 200,
                            body: b.to_string(),
                        })
                        .collect(),
                ),
                ..Self::default()
            }
        }

        pub fn push_raw(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push_back(TransportResponse {
                status,
                body: body.to_string(),
            });
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn post_json(
            &self,
            _url: &str,
            _api_key: &str,
            body: &Value,
        ) -> anyhow::Result<TransportResponse> {
            self.requests.lock().unwrap().push(body.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted response left"))
        }
    }

    pub fn chat_body(content: &str) -> Value {
        json!({
            "model": "gpt-4o-mini",
            "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::*;
    use super::*;

    fn config(url: &str) -> ModelConfig {
        ModelConfig {
            api_url: url.to_string(),
            api_key: Some("sk-test".to_string()),
            ..ModelConfig::default()
        }
    }

    fn scripted_client(
        config: &ModelConfig,
        transport: ScriptedTransport,
    ) -> (GenerationClient<ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        (GenerationClient::with_transport(config, transport.clone()), transport)
    }

    #[test]
    fn test_detect_style() {
        assert_eq!(ApiStyle::detect("https://api.openai.com/v1/responses"), ApiStyle::Responses);
        assert_eq!(ApiStyle::detect("https://api.openai.com/v1/responses/"), ApiStyle::Responses);
        assert_eq!(ApiStyle::detect("https://api.openai.com/v1/chat/completions"), ApiStyle::Chat);
    }

    #[test]
    fn test_payload_omits_unset_options() {
        let cfg = config("https://x/v1/chat/completions");
        let body = build_payload(ApiStyle::Chat, &cfg, "gpt-4o-mini", None, "sys", "user");
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[test]
    fn test_payload_chat_options() {
        let cfg = ModelConfig {
            temperature: Some(0.4),
            reasoning_effort: Some("low".into()),
            max_tokens: Some(4000),
            ..config("https://x/v1/chat/completions")
        };
        let body = build_payload(ApiStyle::Chat, &cfg, "gpt-4o", Some("json_object"), "s", "u");
        assert_eq!(body["temperature"], 0.4);
        assert_eq!(body["reasoning"]["effort"], "low");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 4000);

        let body = build_payload(ApiStyle::Chat, &cfg, "gpt-5-mini", None, "s", "u");
        assert_eq!(body["max_completion_tokens"], 4000);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_payload_responses_options() {
        let cfg = ModelConfig {
            max_tokens: Some(100),
            ..config("https://x/v1/responses")
        };
        let body = build_payload(ApiStyle::Responses, &cfg, "m", Some("json_object"), "s", "u");
        assert_eq!(body["input"][0]["content"], "s");
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["max_output_tokens"], 100);

        let schema = r#"{"type":"json_schema","name":"site"}"#;
        let body = build_payload(ApiStyle::Responses, &cfg, "m", Some(schema), "s", "u");
        assert_eq!(body["text"]["format"]["name"], "site");
    }

    #[test]
    fn test_equivalent_shapes_yield_identical_text() {
        let chat: ModelResponse = serde_json::from_value(chat_body("{\"files\":[]}")).unwrap();
        let parts: ModelResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": [
                { "type": "text", "text": "{\"files\":[]}" },
                { "type": "image_url", "image_url": {} }
            ] } }]
        }))
        .unwrap();
        let responses: ModelResponse = serde_json::from_value(json!({
            "output": [{ "content": [{ "type": "output_text", "text": "{\"files\":[]}" }] }]
        }))
        .unwrap();
        let output_text: ModelResponse =
            serde_json::from_value(json!({ "output_text": "{\"files\":[]}" })).unwrap();

        let expected = Some("{\"files\":[]}".to_string());
        assert_eq!(extract_content(ApiStyle::Chat, &chat), expected);
        assert_eq!(extract_content(ApiStyle::Chat, &parts), expected);
        assert_eq!(extract_content(ApiStyle::Responses, &responses), expected);
        assert_eq!(extract_content(ApiStyle::Responses, &output_text), expected);
    }

    #[test]
    fn test_unexpected_content_shape_is_empty() {
        for content in [json!(42), json!({ "refusal": "no" }), json!(null)] {
            let body: ModelResponse = serde_json::from_value(json!({
                "choices": [{ "message": { "content": content } }]
            }))
            .unwrap();
            assert_eq!(extract_content(ApiStyle::Chat, &body), None);
        }
    }

    #[test]
    fn test_usage_normalizes_both_conventions() {
        let chat = Usage { prompt_tokens: Some(3), completion_tokens: Some(4), total_tokens: Some(7), ..Usage::default() };
        let responses = Usage { input_tokens: Some(3), output_tokens: Some(4), ..Usage::default() };
        assert_eq!(chat.normalize(), responses.normalize());
    }

    #[tokio::test]
    async fn test_generate_strips_fence_and_reports_usage() {
        let cfg = config("https://x/v1/chat/completions");
        let (client, _) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body("```json\n{\"files\":[]}\n```")]));
        let out = client.generate("s", "u", &GenerateOptions::default()).await.unwrap();
        assert_eq!(out.content, "{\"files\":[]}");
        assert_eq!(out.usage.total, 30);
        assert_eq!(out.model_used, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_empty_content_retries_fallback_once() {
        let cfg = ModelConfig {
            fallback_model: Some("gpt-4o".into()),
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body(""), chat_body("ok")]));
        let out = client.generate("s", "u", &GenerateOptions::default()).await.unwrap();
        assert_eq!(out.content, "ok");
        assert_eq!(out.usage.total, 60);
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_fallback_uses_configured_response_format() {
        let cfg = ModelConfig {
            fallback_model: Some("gpt-4o".into()),
            response_format: Some("json_schema".into()),
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body(""), chat_body("ok")]));
        let options = GenerateOptions {
            response_format_override: Some("json_object".into()),
            ..GenerateOptions::default()
        };
        client.generate("s", "u", &options).await.unwrap();
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0]["response_format"]["type"], "json_object");
        assert_eq!(requests[1]["response_format"]["type"], "json_schema");
    }

    #[tokio::test]
    async fn test_second_empty_result_is_fatal() {
        let cfg = ModelConfig {
            fallback_model: Some("gpt-4o".into()),
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(
            &cfg,
            ScriptedTransport::new(&[chat_body(""), chat_body(""), chat_body("never")]),
        );
        let err = client.generate("s", "u", &GenerateOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("empty content"));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_no_fallback_when_disabled_or_overridden() {
        let cfg = ModelConfig {
            fallback_model: Some("gpt-4o".into()),
            allow_fallback: false,
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body("")]));
        assert!(client.generate("s", "u", &GenerateOptions::default()).await.is_err());
        assert_eq!(transport.request_count(), 1);

        let cfg = ModelConfig {
            fallback_model: Some("gpt-4o".into()),
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body("")]));
        let options = GenerateOptions {
            model_override: Some("repair-model".into()),
            ..GenerateOptions::default()
        };
        assert!(client.generate("s", "u", &options).await.is_err());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_typed_and_skips_fallback() {
        let cfg = ModelConfig {
            timeout_ms: 20,
            fallback_model: Some("gpt-4o".into()),
            ..config("https://x/v1/chat/completions")
        };
        let mut transport = ScriptedTransport::new(&[chat_body("late"), chat_body("later")]);
        transport.delay = Some(Duration::from_millis(500));
        let (client, transport) = scripted_client(&cfg, transport);
        let err = client.generate("s", "u", &GenerateOptions::default()).await.unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_http_error_and_invalid_body() {
        let cfg = config("https://x/v1/chat/completions");
        let transport = ScriptedTransport::default();
        transport.push_raw(429, "rate limited");
        transport.push_raw(200, "<html>gateway</html>");
        let (client, _) = scripted_client(&cfg, transport);

        let err = client.generate("s", "u", &GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "model endpoint error: 429 rate limited");

        let err = client.generate("s", "u", &GenerateOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
        assert!(err.to_string().contains("<html>gateway</html>"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_validation_error() {
        let cfg = ModelConfig {
            api_key: None,
            ..config("https://x/v1/chat/completions")
        };
        let (client, transport) = scripted_client(&cfg, ScriptedTransport::new(&[chat_body("x")]));
        let err = client.generate("s", "u", &GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(transport.request_count(), 0);
    }
}

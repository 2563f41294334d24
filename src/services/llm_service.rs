// src/services/llm_service.rs
use crate::config::{Config, Provider};
use crate::errors::AnalysisError;
use crate::models::EncodedImage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Everything one model invocation needs.
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub system_instruction: String,
    pub prompt: String,
    pub image: EncodedImage,
    pub response_schema: Value,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{0} is not set")]
    MissingCredential(String),

    #[error("credential rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("no content in response: {0}")]
    EmptyResponse(String),
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::MissingCredential(_) | ModelError::Unauthorized { .. } => {
                AnalysisError::Configuration(err.to_string())
            }
            ModelError::RateLimited {
                message,
                retry_after,
            } => AnalysisError::Throttled {
                message,
                retry_after,
            },
            ModelError::Transport(_) | ModelError::Status { .. } => {
                AnalysisError::UpstreamUnavailable(err.to_string())
            }
            ModelError::EmptyResponse(_) => AnalysisError::MalformedResponse(err.to_string()),
        }
    }
}

/// An image-understanding model that answers with text constrained by a
/// JSON schema.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
    async fn generate(&self, call: ModelCall) -> Result<String, ModelError>;
}

pub fn vision_model_from_config(config: &Config) -> Arc<dyn VisionModel> {
    match config.provider {
        Provider::Gemini => Arc::new(GeminiVision::new(
            config.api_key.clone(),
            config.model.clone(),
            config.api_base.clone(),
        )),
        Provider::OpenAi => Arc::new(OpenAiVision::new(
            config.api_key.clone(),
            config.model.clone(),
            config.api_base.clone(),
        )),
    }
}

pub struct GeminiVision {
    api_key: Option<String>,
    model: String,
    api_base: String,
    client: Client,
}

impl GeminiVision {
    pub fn new(api_key: Option<String>, model: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            model,
            api_base: api_base.unwrap_or_else(|| GEMINI_API_BASE.to_string()),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn request_body(call: &ModelCall) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": call.system_instruction }]
            },
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": call.prompt },
                    {
                        "inlineData": {
                            "mimeType": call.image.mime_type(),
                            "data": call.image.to_base64()
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": gemini_schema(&call.response_schema)
            }
        })
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, call: ModelCall) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::MissingCredential("GEMINI_API_KEY".to_string()))?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(&call))
            .send()
            .await
            .map_err(transport_error)?;

        let result = read_json(response).await?;

        let text = result["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = result["promptFeedback"]["blockReason"]
                .as_str()
                .or_else(|| result["candidates"][0]["finishReason"].as_str())
                .unwrap_or("no candidates");
            return Err(ModelError::EmptyResponse(format!("Gemini: {reason}")));
        }
        Ok(text)
    }
}

pub struct OpenAiVision {
    api_key: Option<String>,
    model: String,
    api_base: String,
    client: Client,
}

impl OpenAiVision {
    pub fn new(api_key: Option<String>, model: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            model,
            api_base: api_base.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            client: Client::new(),
        }
    }

    fn request_body(&self, call: &ModelCall) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": call.system_instruction },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": call.prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": call.image.to_data_uri() }
                        }
                    ]
                }
            ],
            "max_tokens": 4096,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "production_order",
                    "strict": true,
                    "schema": strict_schema(&call.response_schema)
                }
            }
        })
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, call: ModelCall) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::MissingCredential("OPENAI_API_KEY".to_string()))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&self.request_body(&call))
            .send()
            .await
            .map_err(transport_error)?;

        let result = read_json(response).await?;

        match result["choices"][0]["message"]["content"].as_str() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => {
                let reason = result["choices"][0]["message"]["refusal"]
                    .as_str()
                    .or_else(|| result["choices"][0]["finish_reason"].as_str())
                    .unwrap_or("no choices");
                Err(ModelError::EmptyResponse(format!("OpenAI: {reason}")))
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Transport(format!("timed out: {err}"))
    } else {
        ModelError::Transport(err.to_string())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ModelError> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(classify_failure(status, retry_after, &body));
    }
    serde_json::from_str(&body)
        .map_err(|e| ModelError::Transport(format!("unreadable response envelope: {e}")))
}

/// Maps a non-success HTTP answer to the failure it represents.
pub fn classify_failure(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ModelError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| truncate(body, 300));

    let key_rejected = body.contains("API_KEY_INVALID")
        || body.contains("API key not valid")
        || body.contains("invalid_api_key");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::BAD_REQUEST if key_rejected => ModelError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited {
            message,
            retry_after: retry_after.or_else(|| parsed.as_ref().and_then(retry_delay_in_body)),
        },
        _ => ModelError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Gemini reports `RetryInfo.retryDelay` like `"31s"` in the error details.
fn retry_delay_in_body(body: &Value) -> Option<Duration> {
    body["error"]["details"]
        .as_array()?
        .iter()
        .filter_map(|d| d["retryDelay"].as_str())
        .find_map(|delay| delay.strip_suffix('s')?.parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Gemini expects upper-case OpenAPI type names.
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| match (k.as_str(), v) {
                    ("type", Value::String(t)) => (k.clone(), Value::String(t.to_uppercase())),
                    ("properties", Value::Object(props)) => (
                        k.clone(),
                        Value::Object(
                            props
                                .iter()
                                .map(|(name, s)| (name.clone(), gemini_schema(s)))
                                .collect(),
                        ),
                    ),
                    _ => (k.clone(), gemini_schema(v)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

/// OpenAI strict mode wants every object closed.
fn strict_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| match (k.as_str(), v) {
                    ("properties", Value::Object(props)) => (
                        k.clone(),
                        Value::Object(
                            props
                                .iter()
                                .map(|(name, s)| (name.clone(), strict_schema(s)))
                                .collect(),
                        ),
                    ),
                    _ => (k.clone(), strict_schema(v)),
                })
                .collect();
            if out.get("type").and_then(Value::as_str) == Some("object") {
                out.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strict_schema).collect()),
        other => other.clone(),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::response_schema;

    fn call() -> ModelCall {
        ModelCall {
            system_instruction: "persona".to_string(),
            prompt: "vải Cotton".to_string(),
            image: EncodedImage::new("image/png", vec![1, 2, 3]),
            response_schema: response_schema(),
        }
    }

    #[test]
    fn gemini_body_carries_inline_image_and_upper_case_schema() {
        let body = GeminiVision::request_body(&call());
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "vải Cotton");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "persona");

        let schema = &body["generationConfig"]["responseSchema"];
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["details"]["items"]["properties"]["timeMinutes"]["type"], "NUMBER");
        assert_eq!(schema["required"][0], "orderCode");
    }

    #[test]
    fn gemini_endpoint_accepts_prefixed_model_names() {
        let a = GeminiVision::new(None, "gemini-3-flash-preview".to_string(), None);
        let b = GeminiVision::new(None, "models/gemini-3-flash-preview".to_string(), None);
        assert_eq!(a.endpoint(), b.endpoint());
        assert!(a.endpoint().ends_with("/models/gemini-3-flash-preview:generateContent"));
    }

    #[test]
    fn openai_body_uses_data_uri_and_strict_schema() {
        let model = OpenAiVision::new(None, "gpt-4o".to_string(), None);
        let body = model.request_body(&call());
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
        let schema = &body["response_format"]["json_schema"]["schema"];
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["palette"]["items"]["additionalProperties"], false);
        assert_eq!(schema["properties"]["fabric"]["type"], "string");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let model = GeminiVision::new(None, "gemini-3-flash-preview".to_string(), None);
        let err = model.generate(call()).await.unwrap_err();
        assert_eq!(err, ModelError::MissingCredential("GEMINI_API_KEY".to_string()));
        assert_eq!(AnalysisError::from(err).kind(), "ConfigurationError");
    }

    #[test]
    fn classifies_credential_quota_and_server_failures() {
        let bad_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, None, bad_key),
            ModelError::Unauthorized { status: 400, .. }
        ));

        let quota = r#"{"error":{"code":429,"message":"Resource exhausted","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"31s"}]}}"#;
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, None, quota);
        assert_eq!(
            err,
            ModelError::RateLimited {
                message: "Resource exhausted".to_string(),
                retry_after: Some(Duration::from_secs(31)),
            }
        );
        assert_eq!(AnalysisError::from(err).kind(), "ThrottledError");

        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, None, "overloaded");
        assert_eq!(AnalysisError::from(err).kind(), "UpstreamUnavailable");

        let err = classify_failure(StatusCode::FORBIDDEN, None, "{}");
        assert_eq!(AnalysisError::from(err).kind(), "ConfigurationError");
    }

    #[test]
    fn header_retry_after_wins_over_body() {
        let err = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(5)),
            r#"{"error":{"message":"slow","details":[{"retryDelay":"60s"}]}}"#,
        );
        assert!(matches!(err, ModelError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(5)));
    }

    #[test]
    fn unrepresentable_retry_delay_is_ignored() {
        for delay in ["1e300s", "-3s", "NaNs", "soon"] {
            let body = format!(r#"{{"error":{{"message":"quota","details":[{{"retryDelay":"{delay}"}}]}}}}"#);
            let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, None, &body);
            assert_eq!(
                err,
                ModelError::RateLimited {
                    message: "quota".to_string(),
                    retry_after: None,
                }
            );
            assert_eq!(AnalysisError::from(err).kind(), "ThrottledError");
        }
    }

    #[test]
    fn empty_response_is_malformed() {
        let err: AnalysisError = ModelError::EmptyResponse("Gemini: SAFETY".to_string()).into();
        assert_eq!(err.kind(), "MalformedResponse");
    }
}

use std::time::Instant;

use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionFunctionCall, ChatCompletionFunctionsArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AnalysisResult, Dataset};
use crate::services::prompt::{build_prompt, PROMPT_SAMPLE_ROWS, SYSTEM_PROMPT};
use crate::services::schema::{response_schema, FUNCTION_DESCRIPTION, FUNCTION_NAME};

pub const TEMPERATURE: f32 = 0.2;
pub const MAX_OUTPUT_TOKENS: u16 = 2000;

/// Sends one schema-constrained completion per analysis. No retries.
#[derive(Clone)]
pub struct LlmAgent {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
}

impl LlmAgent {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.openai_key.clone(),
            api_base: config.openai_api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    pub async fn analyze(
        &self,
        dataset: &Dataset,
        user_query: Option<&str>,
    ) -> Result<AnalysisResult, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::Configuration(
                    "OpenAI API key is missing. Please set OPENAI_API_KEY in your environment or .env file."
                        .to_string(),
                )
            })?;

        let columns = dataset.columns();
        let prompt = build_prompt(dataset.sample(PROMPT_SAMPLE_ROWS), &columns, user_query);
        let request = self.build_request(prompt)?;

        let url = format!("{}/chat/completions", self.api_base);
        tracing::info!(
            "Requesting analysis from {} ({} rows, {} columns, query: {})",
            self.model,
            dataset.len(),
            columns.len(),
            user_query.is_some()
        );
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("No response from LLM endpoint: {}", e);
                AppError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to read response body: {}", e)))?;
        tracing::info!("LLM responded with {} in {:?}", status, start.elapsed());

        if !status.is_success() {
            return Err(AppError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let payload = extract_payload(&body)?;
        tracing::debug!("Structured payload: {} bytes", payload.len());
        parse_analysis(&payload)
    }

    #[allow(deprecated)]
    fn build_request(&self, prompt: String) -> Result<CreateChatCompletionRequest, AppError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(request_error)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(request_error)?,
            ),
        ];

        let function = ChatCompletionFunctionsArgs::default()
            .name(FUNCTION_NAME)
            .description(FUNCTION_DESCRIPTION)
            .parameters(response_schema().clone())
            .build()
            .map_err(request_error)?;

        CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .functions(vec![function])
            .function_call(ChatCompletionFunctionCall::Function {
                name: FUNCTION_NAME.to_string(),
            })
            .temperature(TEMPERATURE)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .build()
            .map_err(request_error)
    }
}

fn request_error(err: OpenAIError) -> AppError {
    AppError::InvalidInput(format!("Failed to build completion request: {}", err))
}

/// Pulls the function-call arguments out of a completion body, falling back
/// to the first JSON object in the message text.
#[allow(deprecated)]
fn extract_payload(body: &str) -> Result<String, AppError> {
    let envelope: CreateChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| AppError::parse(format!("Unexpected completion envelope: {}", e), body))?;

    let message = envelope
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| AppError::parse("Completion contained no choices", body))?;

    if let Some(call) = message.function_call {
        return Ok(call.arguments);
    }

    if let Some(content) = message.content {
        let re = Regex::new(r"\{[\s\S]*\}")
            .map_err(|e| AppError::parse(format!("Failed to create regex: {}", e), body))?;
        if let Some(found) = re.find(&content) {
            tracing::warn!("Model answered with text instead of a function call; using embedded JSON");
            return Ok(found.as_str().to_string());
        }
    }

    Err(AppError::parse("No structured payload in completion", body))
}

/// Validates a payload against the analysis schema.
pub fn parse_analysis(payload: &str) -> Result<AnalysisResult, AppError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| AppError::parse(format!("Payload is not valid JSON: {}", e), payload))?;

    if !value.is_object() {
        return Err(AppError::parse("Payload is not a JSON object", payload));
    }

    serde_json::from_value(value).map_err(|e| {
        AppError::parse(
            format!("Payload does not match the analysis schema: {}", e),
            payload,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, Row};
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_test::assert_err;

    #[derive(Clone)]
    struct MockLlm {
        status: StatusCode,
        body: String,
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn completions(
        State(mock): State<MockLlm>,
        headers: HeaderMap,
        Json(request): Json<Value>,
    ) -> (StatusCode, String) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        mock.seen.lock().unwrap().push((auth, request));
        (mock.status, mock.body.clone())
    }

    async fn spawn_mock(status: StatusCode, body: String) -> (SocketAddr, MockLlm) {
        let mock = MockLlm {
            status,
            body,
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(mock.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
        let addr = listener.local_addr().expect("local_addr should succeed");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, mock)
    }

    fn agent_for(addr: SocketAddr, key: Option<&str>) -> LlmAgent {
        let config = Config {
            openai_key: key.map(String::from),
            openai_api_base: format!("http://{}/v1", addr),
            ..Config::default()
        };
        LlmAgent::new(&config)
    }

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Row::new().with("Name", CellValue::text("Alice")).with("Sales", CellValue::text("100")),
            Row::new().with("Name", CellValue::text("Bob")).with("Sales", CellValue::text("200")),
        ])
    }

    fn analysis_payload() -> Value {
        json!({
            "columnTypes": {"Name": "string", "Sales": "number"},
            "relationships": ["Sales per person"],
            "timeSeries": [],
            "keyMetrics": [{"title": "Total Sales", "value": 300.456, "change": 1.5, "changeLabel": "vs avg"}],
            "visualizationRecommendations": [
                {"chartType": "bar", "columns": ["Name", "Sales"],
                 "config": {"data": {"labels": ["Alice", "Bob"], "datasets": [{"data": [100, 200]}]}, "options": {}}},
                {"chartType": "pie", "columns": ["Sales"], "config": {"data": {}}}
            ],
            "insights": ["Bob outsells Alice"],
            "queryResponse": {"answer": "300", "explanation": "100 + 200"}
        })
    }

    fn envelope(message: Value) -> String {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1_700_000_000u32,
            "model": "gpt-4-turbo",
            "choices": [{"index": 0, "message": message, "finish_reason": "function_call"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
        })
        .to_string()
    }

    fn function_call_envelope(arguments: &str) -> String {
        envelope(json!({
            "role": "assistant",
            "content": null,
            "function_call": {"name": FUNCTION_NAME, "arguments": arguments}
        }))
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let (addr, mock) = spawn_mock(StatusCode::OK, String::new()).await;
        let agent = agent_for(addr, None);

        let err = assert_err!(agent.analyze(&dataset(), None).await);

        assert!(matches!(err, AppError::Configuration(_)));
        assert!(mock.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sends_schema_constrained_request_and_parses_result() {
        let body = function_call_envelope(&analysis_payload().to_string());
        let (addr, mock) = spawn_mock(StatusCode::OK, body).await;
        let agent = agent_for(addr, Some("test-key"));

        let result = agent
            .analyze(&dataset(), Some("what is total?"))
            .await
            .expect("analysis should succeed");

        assert_eq!(result.column_types["Sales"], "number");
        assert_eq!(result.visualization_recommendations.len(), 1);
        assert_eq!(result.query_response.as_ref().unwrap().answer, "300");

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (auth, request) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer test-key"));
        assert_eq!(request["model"], json!("gpt-4-turbo"));
        assert_eq!(request["max_tokens"], json!(2000));
        assert!((request["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(request["functions"][0]["name"], json!(FUNCTION_NAME));
        let user_prompt = request["messages"][1]["content"].as_str().unwrap();
        assert!(user_prompt.contains("User query: \"what is total?\""));
    }

    #[tokio::test]
    async fn falls_back_to_json_in_message_content() {
        let content = format!("Here you go:\n{}\nThanks", analysis_payload());
        let body = envelope(json!({"role": "assistant", "content": content}));
        let (addr, _mock) = spawn_mock(StatusCode::OK, body).await;

        let result = agent_for(addr, Some("k")).analyze(&dataset(), None).await.unwrap();
        assert_eq!(result.insights, vec!["Bob outsells Alice"]);
    }

    #[tokio::test]
    async fn error_status_becomes_provider_error_with_body() {
        let body = r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string();
        let (addr, _mock) = spawn_mock(StatusCode::UNAUTHORIZED, body.clone()).await;

        let err = assert_err!(agent_for(addr, Some("bad")).analyze(&dataset(), None).await);

        match err {
            AppError::Provider { status, body: raw } => {
                assert_eq!(status, 401);
                assert_eq!(raw, body);
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = assert_err!(agent_for(addr, Some("k")).analyze(&dataset(), None).await);
        assert!(matches!(err, AppError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_arguments_are_a_parse_error_with_raw_payload() {
        let body = function_call_envelope("{\"columnTypes\": {");
        let (addr, _mock) = spawn_mock(StatusCode::OK, body).await;

        let err = assert_err!(agent_for(addr, Some("k")).analyze(&dataset(), None).await);
        match err {
            AppError::Parse { raw, .. } => assert_eq!(raw, "{\"columnTypes\": {"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn parse_analysis_rejects_missing_mandatory_fields() {
        let mut payload = analysis_payload();
        payload.as_object_mut().unwrap().remove("keyMetrics");
        assert!(matches!(
            parse_analysis(&payload.to_string()),
            Err(AppError::Parse { .. })
        ));
        assert!(matches!(parse_analysis("[1, 2]"), Err(AppError::Parse { .. })));
    }

    #[test]
    fn extract_payload_rejects_foreign_envelopes() {
        assert!(matches!(
            extract_payload("{\"unexpected\": true}"),
            Err(AppError::Parse { .. })
        ));
        let no_payload = envelope(json!({"role": "assistant", "content": "no json here"}));
        assert!(matches!(extract_payload(&no_payload), Err(AppError::Parse { .. })));
    }
}

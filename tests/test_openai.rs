//! Integration tests for the OpenAI / Azure OpenAI provider
//!
//! Tests behavioral contracts against a mock server:
//! - request/response handling and structured output
//! - error mapping (auth failures, rate limits, malformed bodies)
//! - retry on server errors only
//! - Azure deployment URLs and `api-key` authentication
//! - correlation headers forwarded from request metadata

use semker::agent::domain::{CONVERSATION_ID_HEADER, MESSAGE_ID_HEADER};
use semker::llm::provider::{
    CompletionRequest, FinishReason, LlmError, LlmProvider, Message, ResponseFormat,
};
use semker::llm::providers::openai::{ApiFlavor, OpenAiConfig, OpenAiProvider};
use semker::routing::PlannerDecisionOutput;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        flavor: ApiFlavor::OpenAi,
    }
}

fn azure_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        flavor: ApiFlavor::Azure {
            api_version: "2024-06-01".to_string(),
        },
        ..test_config(base_url)
    }
}

fn test_request(model: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            Message::system("You are the Billing agent."),
            Message::user("What is my current bill?"),
        ],
        model: model.to_string(),
        max_tokens: Some(100),
        temperature: Some(0.0),
        ..Default::default()
    }
}

fn completion_body(content: &str, finish_reason: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": finish_reason
            }
        ],
        "usage": { "prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25 }
    })
}

#[tokio::test]
async fn test_successful_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "You are the Billing agent." },
                { "role": "user", "content": "What is my current bill?" }
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("Your bill is 42 EUR.", "stop")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("Your bill is 42 EUR."));
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.usage.total_tokens, 25);
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn test_structured_output_format_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "planner_decision", "strict": true }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"reply": "", "agent_name": "Billing"}"#,
            "stop",
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let request = CompletionRequest {
        response_format: Some(PlannerDecisionOutput::response_format()),
        ..test_request("gpt-4o-mini")
    };

    let response = provider.complete(request).await.unwrap();
    let decision = PlannerDecisionOutput::parse(response.content.as_deref().unwrap()).unwrap();
    assert_eq!(decision.agent_name, "Billing");
}

#[tokio::test]
async fn test_correlation_metadata_becomes_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header(MESSAGE_ID_HEADER, "req-123"))
        .and(header(CONVERSATION_ID_HEADER, "conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok", "stop")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let mut metadata = HashMap::new();
    metadata.insert(MESSAGE_ID_HEADER.to_string(), "req-123".to_string());
    metadata.insert(CONVERSATION_ID_HEADER.to_string(), "conv-1".to_string());
    metadata.insert("tool_endpoint".to_string(), "http://localhost:8101/mcp".to_string());
    let request = CompletionRequest {
        metadata: metadata.clone(),
        ..test_request("gpt-4o-mini")
    };

    let response = provider.complete(request).await.unwrap();
    assert_eq!(response.metadata, metadata);
}

#[tokio::test]
async fn test_azure_uses_deployment_url_and_api_key_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok", "stop")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    assert_eq!(provider.name(), "azure");

    let response = provider.complete(test_request("gpt-4o")).await.unwrap();
    assert_eq!(response.content.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_401_is_authentication_failure_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    assert!(matches!(result, Err(LlmError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_429_is_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    match result {
        Err(LlmError::RateLimitExceeded(body)) => assert_eq!(body, "slow down"),
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_deployment_is_model_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/missing/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("DeploymentNotFound"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(azure_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("missing")).await;

    assert!(matches!(result, Err(LlmError::ModelNotFound(_))));
}

#[tokio::test]
async fn test_400_is_invalid_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad schema"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    assert!(matches!(result, Err(LlmError::InvalidRequest(body)) if body == "bad schema"));
}

#[tokio::test]
async fn test_retries_on_server_errors_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok", "stop")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_fails_after_all_retries_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    assert!(matches!(result, Err(LlmError::ApiError(_))));
}

#[tokio::test]
async fn test_length_finish_reason() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("partial", "length")))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request("gpt-4o-mini")).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::Length);
}

#[tokio::test]
async fn test_empty_choices_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": []
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request("gpt-4o-mini")).await;

    assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_health_check_uses_models_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    assert!(provider.health_check().await.is_ok());
}

#[tokio::test]
async fn test_health_check_fails_when_auth_invalid() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    assert!(matches!(
        provider.health_check().await,
        Err(LlmError::AuthenticationFailed(_))
    ));
}

#[test]
fn test_text_format_default_is_not_sent() {
    assert!(test_request("gpt-4o-mini").response_format.is_none());
    assert!(matches!(ResponseFormat::default(), ResponseFormat::Text));
}
